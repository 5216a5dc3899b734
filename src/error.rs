use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::any::Any;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::users::{repo::RepoError, repo_types::UniqueField};

pub const MSG_DUPLICATE_USERNAME: &str = "El nombre de usuario ya existe.";
pub const MSG_DUPLICATE_EMAIL: &str = "La dirección de correo electrónico ya existe.";
pub const MSG_NOT_FOUND: &str = "Usuario no encontrado";
pub const MSG_INTERNAL: &str = "Error interno del servidor";

/// One rejected input field, reported in the 422 body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl FieldError {
    pub fn body(field: &str, kind: &str, msg: impl Into<String>) -> Self {
        Self {
            loc: vec!["body".into(), field.into()],
            msg: msg.into(),
            kind: kind.into(),
        }
    }

    pub fn query(field: &str, kind: &str, msg: impl Into<String>) -> Self {
        Self {
            loc: vec!["query".into(), field.into()],
            msg: msg.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),
    #[error("duplicate username")]
    DuplicateUsername,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("user not found")]
    NotFound,
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict(UniqueField::Username) => AppError::DuplicateUsername,
            RepoError::Conflict(UniqueField::Email) => AppError::DuplicateEmail,
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "detail": errors })),
            )
                .into_response(),
            AppError::DuplicateUsername => detail(StatusCode::CONFLICT, MSG_DUPLICATE_USERNAME),
            AppError::DuplicateEmail => detail(StatusCode::CONFLICT, MSG_DUPLICATE_EMAIL),
            AppError::NotFound => detail(StatusCode::NOT_FOUND, MSG_NOT_FOUND),
            AppError::Unauthorized(msg) => detail(StatusCode::FORBIDDEN, msg),
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                detail(StatusCode::INTERNAL_SERVER_ERROR, MSG_INTERNAL)
            }
        }
    }
}

/// Response for a handler that panicked; the payload is logged, not returned.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let cause = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".into());
    AppError::Internal(anyhow::anyhow!("handler panicked: {cause}")).into_response()
}

fn detail(status: StatusCode, msg: &str) -> Response {
    (status, Json(json!({ "detail": msg }))).into_response()
}
