use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::events::ChangeScope;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::schemas::session::{
    AnswersUpdate, FinalizeResponse, SessionResponse, StartExamResponse, StartRefusal,
};
use crate::services::session::{self, ControllerError, SessionError, StartOutcome};
use crate::services::store::StoreError;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/:session_id", get(get_session).delete(abandon_session))
        .route("/:session_id/answers", put(put_answers))
        .route("/:session_id/finalize", post(finalize_session))
}

/// Mounted under `/exams/:exam_id/start`. Always 200: a refusal comes back
/// as `proceed: false` with a machine-readable reason.
pub(crate) async fn start_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
) -> Result<Json<StartExamResponse>, ApiError> {
    if !profile.is_complete() {
        return Ok(Json(StartExamResponse::refused(StartRefusal::ProfileIncomplete)));
    }

    let outcome =
        session::start(state.store(), state.sessions(), &exam_id, &profile.id, primitive_now_utc())
            .await
            .map_err(|err| controller_error(err, "Failed to start exam session"))?;

    let response = match outcome {
        StartOutcome::Started(active) => StartExamResponse::started(&active),
        StartOutcome::Refused(reason) => StartExamResponse::refused(reason.into()),
    };
    Ok(Json(response))
}

async fn get_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .sessions()
        .find(&profile.id, &session_id)
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    Ok(Json(SessionResponse::from_session(&session)))
}

async fn put_answers(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
    Json(payload): Json<AnswersUpdate>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session =
        session::record_answers(state.sessions(), &profile.id, &session_id, &payload.answers)
            .map_err(session_error)?;
    Ok(Json(SessionResponse::from_session(&session)))
}

async fn finalize_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
) -> Result<Json<FinalizeResponse>, ApiError> {
    let storage = state.storage().cloned();
    let result =
        session::finalize(state.store(), state.sessions(), storage, &profile.id, &session_id)
            .await
            .map_err(|err| controller_error(err, "Failed to persist submission"))?;

    state.feed().publish(ChangeScope::Submissions);
    Ok(Json(FinalizeResponse {
        session: SessionResponse::from_session(&result.session),
        score: result.summary,
    }))
}

async fn abandon_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
) -> Result<StatusCode, ApiError> {
    session::abandon(state.sessions(), &profile.id, &session_id).map_err(session_error)?;
    Ok(StatusCode::NO_CONTENT)
}

fn session_error(err: SessionError) -> ApiError {
    match &err {
        SessionError::NotFound => ApiError::NotFound(err.to_string()),
        SessionError::InvalidState(_) => ApiError::Conflict(err.to_string()),
        SessionError::UnknownQuestion(_) | SessionError::UnknownAlternative { .. } => {
            ApiError::BadRequest(err.to_string())
        }
    }
}

fn controller_error(err: ControllerError, context: &str) -> ApiError {
    match err {
        ControllerError::Session(inner) => session_error(inner),
        ControllerError::Store(StoreError::NotFound) => {
            ApiError::NotFound("Exam not found".to_string())
        }
        ControllerError::Store(inner) => ApiError::internal(inner, context),
    }
}
