use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::{Alternative, Question};

const QUESTION_COLUMNS: &str = "id, exam_id, position, discipline, statement, created_at";
const ALTERNATIVE_COLUMNS: &str = "id, question_id, letter, statement, is_correct";

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) position: i32,
    pub(crate) discipline: &'a str,
    pub(crate) statement: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Takes any executor so a whole question sheet can be inserted in one
/// transaction alongside its exam.
pub(crate) async fn create(
    executor: impl PgExecutor<'_>,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (id, exam_id, position, discipline, statement, created_at)
         VALUES ($1,$2,$3,$4,$5,$6)
         RETURNING {QUESTION_COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.position)
    .bind(params.discipline)
    .bind(params.statement)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) struct CreateAlternative<'a> {
    pub(crate) id: &'a str,
    pub(crate) question_id: &'a str,
    pub(crate) letter: &'a str,
    pub(crate) statement: &'a str,
    pub(crate) is_correct: bool,
}

pub(crate) async fn create_alternative(
    executor: impl PgExecutor<'_>,
    params: CreateAlternative<'_>,
) -> Result<Alternative, sqlx::Error> {
    sqlx::query_as::<_, Alternative>(&format!(
        "INSERT INTO alternatives (id, question_id, letter, statement, is_correct)
         VALUES ($1,$2,$3,$4,$5)
         RETURNING {ALTERNATIVE_COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.question_id)
    .bind(params.letter)
    .bind(params.statement)
    .bind(params.is_correct)
    .fetch_one(executor)
    .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY position"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_alternatives_by_exam(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Alternative>, sqlx::Error> {
    sqlx::query_as::<_, Alternative>(
        "SELECT a.id, a.question_id, a.letter, a.statement, a.is_correct
         FROM alternatives a
         JOIN questions q ON q.id = a.question_id
         WHERE q.exam_id = $1
         ORDER BY q.position, a.letter",
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}
