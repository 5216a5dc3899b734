mod dto;
pub mod handlers;
pub mod memory_repo;
pub mod pg_repo;
pub mod repo;
pub mod repo_types;
pub mod services;
mod validation;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
