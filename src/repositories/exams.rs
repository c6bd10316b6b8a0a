use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use crate::db::models::Exam;
use crate::db::types::ExamAccess;

pub(crate) const COLUMNS: &str = "\
    id, title, class_tag, subject, starts_at, ends_at, access, \
    created_by, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Exams visible to a student cohort, soonest window first.
pub(crate) async fn list_by_class_tag(
    pool: &PgPool,
    class_tag: &str,
) -> Result<Vec<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "SELECT {COLUMNS} FROM exams WHERE class_tag = $1 ORDER BY starts_at, id"
    ))
    .bind(class_tag)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_all(pool: &PgPool) -> Result<Vec<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams ORDER BY starts_at DESC, id"))
        .fetch_all(pool)
        .await
}

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) class_tag: &'a str,
    pub(crate) subject: &'a str,
    pub(crate) starts_at: PrimitiveDateTime,
    pub(crate) ends_at: PrimitiveDateTime,
    pub(crate) access: ExamAccess,
    pub(crate) created_by: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Takes any executor so exam and question inserts can share a transaction.
pub(crate) async fn create(
    executor: impl PgExecutor<'_>,
    params: CreateExam<'_>,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, title, class_tag, subject, starts_at, ends_at, access,
            created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.class_tag)
    .bind(params.subject)
    .bind(params.starts_at)
    .bind(params.ends_at)
    .bind(params.access)
    .bind(params.created_by)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(executor)
    .await
}

pub(crate) struct UpdateExam {
    pub(crate) title: Option<String>,
    pub(crate) class_tag: Option<String>,
    pub(crate) subject: Option<String>,
    pub(crate) starts_at: Option<PrimitiveDateTime>,
    pub(crate) ends_at: Option<PrimitiveDateTime>,
    pub(crate) access: Option<ExamAccess>,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateExam,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams SET
            title = COALESCE($1, title),
            class_tag = COALESCE($2, class_tag),
            subject = COALESCE($3, subject),
            starts_at = COALESCE($4, starts_at),
            ends_at = COALESCE($5, ends_at),
            access = COALESCE($6, access),
            updated_at = $7
         WHERE id = $8
         RETURNING {COLUMNS}",
    ))
    .bind(params.title)
    .bind(params.class_tag)
    .bind(params.subject)
    .bind(params.starts_at)
    .bind(params.ends_at)
    .bind(params.access)
    .bind(params.updated_at)
    .bind(id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}
