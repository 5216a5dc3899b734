//! Extractors that report malformed input as 422 `{"detail": [...]}`
//! instead of axum's plain-text rejections.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{AppError, FieldError};

pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| rejected(&["body"], "json_invalid", e.body_text()))?;
        Ok(Self(value))
    }
}

pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| rejected(&["query"], "int_parsing", e.body_text()))?;
        Ok(Self(value))
    }
}

/// Numeric path id, e.g. `/users/{user_id}`.
pub struct UserId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|e| rejected(&["path", "user_id"], "int_parsing", e.body_text()))?;
        Ok(Self(id))
    }
}

fn rejected(loc: &[&str], kind: &str, msg: String) -> AppError {
    AppError::Validation(vec![FieldError {
        loc: loc.iter().map(|s| s.to_string()).collect(),
        msg,
        kind: kind.into(),
    }])
}
