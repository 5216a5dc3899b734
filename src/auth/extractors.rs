use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::{
    auth::{claims::Claims, jwt::JwtKeys},
    error::AppError,
};

/// Verified `Authorization: Bearer <jwt>` claims.
pub struct BearerAuth(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized("Invalid authorization code."))?;

        let (scheme, token) = header.split_once(' ').unwrap_or((header, ""));
        if scheme != "Bearer" || token.is_empty() {
            warn!(scheme, "rejected authorization scheme");
            return Err(AppError::Unauthorized("Invalid authentication scheme."));
        }

        let keys = JwtKeys::from_ref(state);
        match keys.verify(token.trim()) {
            Ok(claims) => Ok(BearerAuth(claims)),
            Err(e) => {
                warn!(error = %e, "invalid or expired token");
                Err(AppError::Unauthorized("Invalid token or expired token."))
            }
        }
    }
}

/// Route layer that admits only requests carrying a valid bearer token.
pub async fn require_bearer(BearerAuth(claims): BearerAuth, req: Request, next: Next) -> Response {
    debug!(user_id = ?claims.user_id(), "bearer accepted");
    next.run(req).await
}
