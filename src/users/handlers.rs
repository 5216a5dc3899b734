use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::AppError,
    extract::{UserId, ValidJson, ValidQuery},
    state::AppState,
    users::{
        dto::{CreateUserRequest, Pagination, UpdateUserRequest},
        repo_types::User,
        services,
        validation::{validate_create, validate_page, validate_update},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/", get(list_users).post(create_user))
        .route(
            "/users/:user_id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

/// POST /users/
#[instrument(skip(state, body))]
pub async fn create_user(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let input = validate_create(body)?;
    let user = services::create_user(state.users.as_ref(), input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /users/?skip=&limit=
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    ValidQuery(page): ValidQuery<Pagination>,
) -> Result<Json<Vec<User>>, AppError> {
    validate_page(&page)?;
    let users = services::list_users(state.users.as_ref(), page.skip, page.limit).await?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    UserId(id): UserId,
) -> Result<Json<User>, AppError> {
    let user = services::get_user(state.users.as_ref(), id).await?;
    Ok(Json(user))
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    UserId(id): UserId,
    ValidJson(body): ValidJson<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let changes = validate_update(body)?;
    let user = services::update_user(state.users.as_ref(), id, changes).await?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    UserId(id): UserId,
) -> Result<StatusCode, AppError> {
    services::delete_user(state.users.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
