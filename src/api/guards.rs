use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::Profile;
use crate::db::types::Role;
use crate::repositories;

pub(crate) struct CurrentUser(pub(crate) Profile);
/// Professor or admin.
pub(crate) struct CurrentStaff(pub(crate) Profile);
pub(crate) struct CurrentAdmin(pub(crate) Profile);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        let profile = repositories::profiles::find_by_id(app_state.db(), &claims.sub)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load profile"))?;

        let Some(profile) = profile else {
            return Err(ApiError::Unauthorized("User not found"));
        };

        // Blocked accounts keep read access; exam access is cut downstream.
        Ok(CurrentUser(profile))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentStaff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(profile) = CurrentUser::from_request_parts(parts, state).await?;

        if !profile.role.is_staff() {
            return Err(ApiError::Forbidden("Staff access required"));
        }

        if profile.is_blocked && profile.role != Role::Admin {
            return Err(ApiError::Forbidden("Account is blocked"));
        }

        Ok(CurrentStaff(profile))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(profile) = CurrentUser::from_request_parts(parts, state).await?;

        if profile.role != Role::Admin {
            return Err(ApiError::Forbidden("Admin access required"));
        }

        Ok(CurrentAdmin(profile))
    }
}
