use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::AdminUser,
    error::AppResult,
    extract::{ValidJson, ValidPath, ValidQuery},
    state::AppState,
    users::{
        dto::{ListUsersQuery, MessageResponse, StatusChangeResponse, UserListResponse},
        repo_types::{User, UserPatch},
        services,
    },
};

pub fn admin_user_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", get(get_user).put(update_user))
        .route("/admin/users/:id/suspend", post(suspend_user))
        .route("/admin/users/:id/activate", post(activate_user))
        .route("/admin/users/:id/reset-password", post(reset_password))
}

#[instrument(skip(state, admin), fields(admin_id = admin.0.id))]
pub async fn list_users(
    State(state): State<AppState>,
    admin: AdminUser,
    ValidQuery(q): ValidQuery<ListUsersQuery>,
) -> AppResult<Json<UserListResponse>> {
    Ok(Json(services::list_users(&state, q).await?))
}

#[instrument(skip(state, admin), fields(admin_id = admin.0.id))]
pub async fn get_user(
    State(state): State<AppState>,
    admin: AdminUser,
    ValidPath(id): ValidPath<i64>,
) -> AppResult<Json<User>> {
    Ok(Json(services::get_user(&state, id).await?))
}

#[instrument(skip(state, admin, patch), fields(admin_id = admin.0.id))]
pub async fn update_user(
    State(state): State<AppState>,
    admin: AdminUser,
    ValidPath(id): ValidPath<i64>,
    ValidJson(patch): ValidJson<UserPatch>,
) -> AppResult<Json<User>> {
    Ok(Json(services::update_user(&state, id, patch).await?))
}

#[instrument(skip(state, admin), fields(admin_id = admin.0.id))]
pub async fn suspend_user(
    State(state): State<AppState>,
    admin: AdminUser,
    ValidPath(id): ValidPath<i64>,
) -> AppResult<Json<StatusChangeResponse>> {
    Ok(Json(services::suspend_user(&state, id).await?))
}

#[instrument(skip(state, admin), fields(admin_id = admin.0.id))]
pub async fn activate_user(
    State(state): State<AppState>,
    admin: AdminUser,
    ValidPath(id): ValidPath<i64>,
) -> AppResult<Json<StatusChangeResponse>> {
    Ok(Json(services::activate_user(&state, id).await?))
}

#[instrument(skip(state, admin), fields(admin_id = admin.0.id))]
pub async fn reset_password(
    State(state): State<AppState>,
    admin: AdminUser,
    ValidPath(id): ValidPath<i64>,
) -> AppResult<Json<MessageResponse>> {
    Ok(Json(services::reset_password(&state, id).await?))
}
