use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::pagination::{default_limit, PaginatedResponse};
use crate::core::events::ChangeScope;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Profile;
use crate::db::types::Role;
use crate::repositories;
use crate::schemas::profile::ProfileResponse;

#[derive(Debug, Deserialize)]
pub(crate) struct UserListQuery {
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    role: Option<Role>,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:user_id", get(get_user))
        .route("/:user_id/block", post(block_user))
        .route("/:user_id/unblock", post(unblock_user))
}

async fn list_users(
    Query(params): Query<UserListQuery>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<ProfileResponse>>, ApiError> {
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);

    let profiles = repositories::profiles::list_paginated(state.db(), params.role, skip, limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list profiles"))?;
    let total_count = repositories::profiles::count(state.db(), params.role)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count profiles"))?;

    let items = profiles.into_iter().map(ProfileResponse::from_db).collect();

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}

async fn get_user(
    Path(user_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = repositories::profiles::find_by_id(state.db(), &user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch profile"))?;

    let Some(profile) = profile else {
        return Err(ApiError::NotFound("User not found".to_string()));
    };

    Ok(Json(ProfileResponse::from_db(profile)))
}

async fn block_user(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ProfileResponse>, ApiError> {
    set_blocked(&state, &admin, &user_id, true).await
}

async fn unblock_user(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ProfileResponse>, ApiError> {
    set_blocked(&state, &admin, &user_id, false).await
}

async fn set_blocked(
    state: &AppState,
    admin: &Profile,
    user_id: &str,
    blocked: bool,
) -> Result<Json<ProfileResponse>, ApiError> {
    let changed =
        repositories::profiles::set_blocked(state.db(), user_id, blocked, primitive_now_utc())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to update block flag"))?;

    if !changed {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    // The session watcher picks this up and aborts any in-progress attempt.
    state.feed().publish(ChangeScope::Profiles);

    let updated = repositories::profiles::fetch_one_by_id(state.db(), user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch updated profile"))?;

    let action = if blocked { "user_block" } else { "user_unblock" };
    tracing::info!(
        admin_id = %admin.id,
        user_id,
        action,
        "Admin changed block flag"
    );

    Ok(Json(ProfileResponse::from_db(updated)))
}
