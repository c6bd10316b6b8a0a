use axum::{extract::State, routing::get, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::events::ChangeScope;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::profile::{ProfileResponse, RegistrationUpdate};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(get_profile).put(update_profile))
}

async fn get_profile(CurrentUser(profile): CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse::from_db(profile))
}

/// Completion flow: students fill in full_name, enrollment_id and class_tag
/// here before any exam route opens up for them.
async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
    Json(payload): Json<RegistrationUpdate>,
) -> Result<Json<ProfileResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let trimmed = |field: Option<String>| field.map(|value| value.trim().to_string());

    let updated = repositories::profiles::update_registration(
        state.db(),
        &profile.id,
        repositories::profiles::UpdateRegistration {
            full_name: trimmed(payload.full_name),
            enrollment_id: trimmed(payload.enrollment_id),
            class_tag: trimmed(payload.class_tag),
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update profile"))?;

    // A class_tag change moves the student to another cohort's exam list.
    state.feed().publish(ChangeScope::Profiles);

    Ok(Json(ProfileResponse::from_db(updated)))
}
