use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{CurrentStaff, CurrentUser};
use crate::api::pagination::{ListParams, PaginatedResponse};
use crate::api::{sessions, validation};
use crate::core::events::ChangeScope;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc, to_primitive_utc};
use crate::db::models::{Alternative, Exam, Profile};
use crate::db::types::Role;
use crate::repositories;
use crate::repositories::exams::{CreateExam, UpdateExam};
use crate::repositories::questions::{CreateAlternative, CreateQuestion};
use crate::schemas::exam::{
    ExamCreate, ExamDetailResponse, ExamResponse, ExamResultResponse, ExamUpdate,
    QuestionResponse, StudentExamResponse, StudentResultResponse,
};
use crate::services::store::{ExamPaper, StoreError, StudentScope};
use crate::services::{access, scoring};

#[derive(Debug, Deserialize)]
pub(crate) struct DeleteExamQuery {
    #[serde(default)]
    #[serde(alias = "forceDelete")]
    force_delete: bool,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_exam).get(list_exams))
        .route("/:exam_id", get(get_exam).patch(update_exam).delete(delete_exam))
        .route("/:exam_id/start", post(sessions::start_exam))
        .route("/:exam_id/result", get(own_result))
        .route("/:exam_id/results", get(exam_results))
        .route("/:exam_id/grants/:student_id", post(create_grant).delete(delete_grant))
}

/// One advisory snapshot per request: each exam carries the status the
/// caller would get if they acted right now. Students see their cohort,
/// staff see everything.
async fn list_exams(
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
) -> Result<Json<Vec<StudentExamResponse>>, ApiError> {
    if !profile.is_complete() {
        return Err(ApiError::Forbidden("profile_incomplete"));
    }

    let scope = StudentScope::for_profile(&profile);
    let exams = state
        .store()
        .fetch_exams(&scope)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load exams"))?;
    let submitted = state
        .store()
        .fetch_submitted_exam_ids(&profile.id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load submission history"))?;

    let now = primitive_now_utc();
    let items = exams
        .iter()
        .map(|exam| {
            let status = access::evaluate(exam, &profile, &submitted, now);
            StudentExamResponse::from_db(&exam.exam, status)
        })
        .collect();
    Ok(Json(items))
}

/// Creates the exam together with its whole question sheet in one
/// transaction; a half-inserted sheet never becomes visible.
async fn create_exam(
    State(state): State<AppState>,
    CurrentStaff(staff): CurrentStaff,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let starts_at = to_primitive_utc(payload.starts_at);
    let ends_at = to_primitive_utc(payload.ends_at);
    validation::validate_exam_window(starts_at, ends_at)?;
    validation::validate_questions(&payload.questions)?;

    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|err| ApiError::internal(err, "Failed to start transaction"))?;

    let exam = repositories::exams::create(
        &mut *tx,
        CreateExam {
            id: &exam_id,
            title: &payload.title,
            class_tag: &payload.class_tag,
            subject: &payload.subject,
            starts_at,
            ends_at,
            access: payload.access,
            created_by: &staff.id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|err| ApiError::internal(err, "Failed to create exam"))?;

    for (index, question) in payload.questions.iter().enumerate() {
        let question_id = Uuid::new_v4().to_string();
        repositories::questions::create(
            &mut *tx,
            CreateQuestion {
                id: &question_id,
                exam_id: &exam_id,
                position: index as i32 + 1,
                discipline: &question.discipline,
                statement: &question.statement,
                created_at: now,
            },
        )
        .await
        .map_err(|err| ApiError::internal(err, "Failed to create question"))?;

        for alternative in &question.alternatives {
            let alternative_id = Uuid::new_v4().to_string();
            repositories::questions::create_alternative(
                &mut *tx,
                CreateAlternative {
                    id: &alternative_id,
                    question_id: &question_id,
                    letter: &alternative.letter,
                    statement: &alternative.statement,
                    is_correct: alternative.is_correct,
                },
            )
            .await
            .map_err(|err| ApiError::internal(err, "Failed to create alternative"))?;
        }
    }

    tx.commit().await.map_err(|err| ApiError::internal(err, "Failed to commit transaction"))?;

    state.feed().publish(ChangeScope::Exams);
    tracing::info!(exam_id = %exam.id, created_by = %staff.id, "Exam created");

    Ok((StatusCode::CREATED, Json(ExamResponse::from_db(exam, payload.questions.len() as i64))))
}

async fn get_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    CurrentStaff(_staff): CurrentStaff,
) -> Result<Json<ExamDetailResponse>, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let questions = repositories::questions::list_by_exam(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load questions"))?;
    let alternatives = repositories::questions::list_alternatives_by_exam(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load alternatives"))?;
    let granted_student_ids = repositories::grants::list_student_ids(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load grants"))?;

    let mut by_question: HashMap<String, Vec<Alternative>> = HashMap::new();
    for alternative in alternatives {
        by_question.entry(alternative.question_id.clone()).or_default().push(alternative);
    }

    let questions = questions
        .into_iter()
        .map(|question| {
            let alternatives = by_question.remove(&question.id).unwrap_or_default();
            QuestionResponse::from_db(question, alternatives)
        })
        .collect();

    Ok(Json(ExamDetailResponse {
        id: exam.id,
        title: exam.title,
        class_tag: exam.class_tag,
        subject: exam.subject,
        starts_at: format_primitive(exam.starts_at),
        ends_at: format_primitive(exam.ends_at),
        access: exam.access,
        created_by: exam.created_by,
        created_at: format_primitive(exam.created_at),
        updated_at: format_primitive(exam.updated_at),
        granted_student_ids,
        questions,
    }))
}

async fn update_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    CurrentStaff(staff): CurrentStaff,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
    if !can_manage_exam(&staff, &exam) {
        return Err(ApiError::Forbidden("You can only update your own exams"));
    }
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    // The resolved window must stay valid even when only one edge moves.
    let starts_at = payload.starts_at.map(to_primitive_utc);
    let ends_at = payload.ends_at.map(to_primitive_utc);
    validation::validate_exam_window(
        starts_at.unwrap_or(exam.starts_at),
        ends_at.unwrap_or(exam.ends_at),
    )?;

    let updated = repositories::exams::update(
        state.db(),
        &exam_id,
        UpdateExam {
            title: payload.title,
            class_tag: payload.class_tag,
            subject: payload.subject,
            starts_at,
            ends_at,
            access: payload.access,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|err| ApiError::internal(err, "Failed to update exam"))?;

    state.feed().publish(ChangeScope::Exams);

    let question_count = repositories::questions::count_by_exam(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to count questions"))?;
    Ok(Json(ExamResponse::from_db(updated, question_count)))
}

async fn delete_exam(
    Path(exam_id): Path<String>,
    Query(query): Query<DeleteExamQuery>,
    State(state): State<AppState>,
    CurrentStaff(staff): CurrentStaff,
) -> Result<StatusCode, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
    if !can_manage_exam(&staff, &exam) {
        return Err(ApiError::Forbidden("You can only delete your own exams"));
    }

    let submission_count = repositories::submissions::count_by_exam(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to count submissions"))?;
    if submission_count > 0 && !query.force_delete {
        return Err(ApiError::Conflict(format!(
            "Exam has {submission_count} submission(s); pass force_delete=true to delete anyway"
        )));
    }

    // Cascades take the questions, grants and submissions with it.
    let deleted = repositories::exams::delete_by_id(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to delete exam"))?;
    if !deleted {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }

    state.feed().publish(ChangeScope::Exams);
    tracing::info!(exam_id = %exam_id, deleted_by = %staff.id, "Exam deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn own_result(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    CurrentUser(profile): CurrentUser,
) -> Result<Json<StudentResultResponse>, ApiError> {
    let submission = repositories::submissions::find(state.db(), &exam_id, &profile.id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load submission"))?
        .ok_or_else(|| ApiError::NotFound("No submission for this exam".to_string()))?;
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let paper = fetch_paper(&state, &exam_id).await?;
    let score = scoring::grade(&paper, &submission.answers.0);

    Ok(Json(StudentResultResponse {
        exam_id: submission.exam_id,
        exam_title: exam.title,
        submitted_at: format_primitive(submission.created_at),
        score,
    }))
}

/// Scores are derived on read; stored submissions hold answers only, so a
/// corrected sheet re-grades every past submission for free.
async fn exam_results(
    Path(exam_id): Path<String>,
    Query(params): Query<ListParams>,
    State(state): State<AppState>,
    CurrentStaff(_staff): CurrentStaff,
) -> Result<Json<PaginatedResponse<ExamResultResponse>>, ApiError> {
    let skip = params.skip.max(0);
    let limit = params.limit.clamp(1, 1000);

    // Doubles as the existence check: an unknown exam surfaces here as 404.
    let paper = fetch_paper(&state, &exam_id).await?;

    let submissions = repositories::submissions::list_by_exam(state.db(), &exam_id, skip, limit)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load submissions"))?;
    let total_count = repositories::submissions::count_by_exam(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to count submissions"))?;

    let student_ids: Vec<String> =
        submissions.iter().map(|submission| submission.student_id.clone()).collect();
    let students = repositories::profiles::list_by_ids(state.db(), &student_ids)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load student profiles"))?;
    let by_id: HashMap<&str, &Profile> =
        students.iter().map(|profile| (profile.id.as_str(), profile)).collect();

    let items = submissions
        .iter()
        .map(|submission| {
            let student = by_id.get(submission.student_id.as_str());
            ExamResultResponse {
                student_id: submission.student_id.clone(),
                full_name: student.and_then(|profile| profile.full_name.clone()),
                enrollment_id: student.and_then(|profile| profile.enrollment_id.clone()),
                submitted_at: format_primitive(submission.created_at),
                score: scoring::grade(&paper, &submission.answers.0),
            }
        })
        .collect();

    Ok(Json(PaginatedResponse { items, total_count, skip, limit }))
}

async fn create_grant(
    Path((exam_id, student_id)): Path<(String, String)>,
    State(state): State<AppState>,
    CurrentStaff(staff): CurrentStaff,
) -> Result<StatusCode, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
    if !can_manage_exam(&staff, &exam) {
        return Err(ApiError::Forbidden("You can only manage grants on your own exams"));
    }

    let target = repositories::profiles::find_by_id(state.db(), &student_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load student profile"))?
        .ok_or_else(|| ApiError::NotFound("Student not found".to_string()))?;
    if target.role != Role::Student {
        return Err(ApiError::BadRequest("Grants can only target student accounts".to_string()));
    }

    // Insert is idempotent; re-granting is not an error.
    repositories::grants::insert(state.db(), &exam_id, &student_id, &staff.id, primitive_now_utc())
        .await
        .map_err(|err| ApiError::internal(err, "Failed to create grant"))?;

    state.feed().publish(ChangeScope::Grants);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_grant(
    Path((exam_id, student_id)): Path<(String, String)>,
    State(state): State<AppState>,
    CurrentStaff(staff): CurrentStaff,
) -> Result<StatusCode, ApiError> {
    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to load exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;
    if !can_manage_exam(&staff, &exam) {
        return Err(ApiError::Forbidden("You can only manage grants on your own exams"));
    }

    let deleted = repositories::grants::delete(state.db(), &exam_id, &student_id)
        .await
        .map_err(|err| ApiError::internal(err, "Failed to delete grant"))?;
    if !deleted {
        return Err(ApiError::NotFound("Grant not found".to_string()));
    }

    // A revoked student loses an in-progress attempt on the next revalidation.
    state.feed().publish(ChangeScope::Grants);
    Ok(StatusCode::NO_CONTENT)
}

/// Professors manage only their own exams; admins manage all of them.
fn can_manage_exam(staff: &Profile, exam: &Exam) -> bool {
    staff.role == Role::Admin || exam.created_by == staff.id
}

async fn fetch_paper(state: &AppState, exam_id: &str) -> Result<ExamPaper, ApiError> {
    match state.store().fetch_paper(exam_id).await {
        Ok(paper) => Ok(paper),
        Err(StoreError::NotFound) => Err(ApiError::NotFound("Exam not found".to_string())),
        Err(err) => Err(ApiError::internal(err, "Failed to load exam paper")),
    }
}
