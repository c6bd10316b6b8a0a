use std::collections::HashMap;

use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Submission;

pub(crate) const COLUMNS: &str = "exam_id, student_id, answers, created_at";

/// First write wins. A second submission for the same exam and student is a
/// no-op, so retries and races both settle on the original row.
pub(crate) async fn create_if_absent(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
    answers: &HashMap<String, String>,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO submissions (exam_id, student_id, answers, created_at)
         VALUES ($1,$2,$3,$4)
         ON CONFLICT (exam_id, student_id) DO NOTHING",
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(Json(answers))
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn find(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE exam_id = $1 AND student_id = $2"
    ))
    .bind(exam_id)
    .bind(student_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_exam_ids_by_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT exam_id FROM submissions WHERE student_id = $1")
        .bind(student_id)
        .fetch_all(pool)
        .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM submissions WHERE exam_id = $1 ORDER BY created_at OFFSET $2 LIMIT $3"
    ))
    .bind(exam_id)
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}
