use axum::{
    extract::{Form, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Profile;
use crate::db::types::Role;
use crate::repositories;
use crate::schemas::auth::TokenResponse;
use crate::schemas::profile::{LoginRequest, ProfileResponse, SignUpRequest};

/// Max attempts per window for auth endpoints (login/signup/token).
const AUTH_RATE_LIMIT: u64 = 10;
/// Rate limit window in seconds.
const AUTH_RATE_WINDOW_SECONDS: u64 = 60;

#[derive(Debug, Deserialize)]
struct OAuth2PasswordForm {
    username: String,
    password: String,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/token", post(token))
        .route("/me", get(me))
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    enforce_rate_limit(
        &state,
        "signup",
        &payload.email,
        "Too many signup attempts, try again later",
    )
    .await?;

    let existing = repositories::profiles::exists_by_email(state.db(), &payload.email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing profile"))?;

    if existing.is_some() {
        return Err(ApiError::Conflict("An account with this email already exists".to_string()));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let now = primitive_now_utc();
    let profile = repositories::profiles::create(
        state.db(),
        repositories::profiles::CreateProfile {
            id: &Uuid::new_v4().to_string(),
            email: &payload.email,
            hashed_password,
            role: Role::Student,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create profile"))?;

    let token = security::create_access_token(&profile.id, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    let response = TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: ProfileResponse::from_db(profile),
    };

    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    enforce_rate_limit(&state, "login", &payload.email, "Too many login attempts, try again later")
        .await?;

    let profile = fetch_profile_by_email(&state, &payload.email).await?;
    verify_credentials(&payload.password, &profile)?;

    // Blocked accounts still log in; only exam access is cut.
    let token = security::create_access_token(&profile.id, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: ProfileResponse::from_db(profile),
    }))
}

/// OAuth2 password form, kept for interactive API-docs tooling. `username`
/// carries the email.
async fn token(
    State(state): State<AppState>,
    Form(payload): Form<OAuth2PasswordForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    enforce_rate_limit(
        &state,
        "token",
        &payload.username,
        "Too many token attempts, try again later",
    )
    .await?;

    let profile = fetch_profile_by_email(&state, &payload.username).await?;
    verify_credentials(&payload.password, &profile)?;

    let token = security::create_access_token(&profile.id, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: ProfileResponse::from_db(profile),
    }))
}

async fn me(CurrentUser(profile): CurrentUser) -> Json<ProfileResponse> {
    Json(ProfileResponse::from_db(profile))
}

/// Fixed-window limit keyed per endpoint and email, degrading open when Redis
/// is unavailable.
async fn enforce_rate_limit(
    state: &AppState,
    kind: &str,
    email: &str,
    message: &'static str,
) -> Result<(), ApiError> {
    let rate_key = format!("rl:{kind}:{}", email.to_lowercase());
    let allowed = state
        .redis()
        .rate_limit(&rate_key, AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS)
        .await
        .unwrap_or(true);

    if allowed {
        Ok(())
    } else {
        Err(ApiError::TooManyRequests(message))
    }
}

async fn fetch_profile_by_email(state: &AppState, email: &str) -> Result<Profile, ApiError> {
    repositories::profiles::find_by_email(state.db(), email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load profile"))?
        .ok_or(ApiError::Unauthorized("Incorrect email or password"))
}

fn verify_credentials(password: &str, profile: &Profile) -> Result<(), ApiError> {
    let verified = security::verify_password(password, &profile.hashed_password)
        .map_err(|_| ApiError::Unauthorized("Incorrect email or password"))?;

    if verified {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Incorrect email or password"))
    }
}
