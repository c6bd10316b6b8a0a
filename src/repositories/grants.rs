use sqlx::PgPool;
use time::PrimitiveDateTime;

pub(crate) async fn insert(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
    granted_by: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_access_grants (exam_id, student_id, granted_by, created_at)
         VALUES ($1,$2,$3,$4)
         ON CONFLICT (exam_id, student_id) DO NOTHING",
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(granted_by)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM exam_access_grants WHERE exam_id = $1 AND student_id = $2")
            .bind(exam_id)
            .bind(student_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_student_ids(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT student_id FROM exam_access_grants WHERE exam_id = $1 ORDER BY created_at",
    )
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

/// Grant pairs for a batch of exams, used to assemble per-exam grant sets
/// without a query per exam.
pub(crate) async fn list_for_exams(
    pool: &PgPool,
    exam_ids: &[String],
) -> Result<Vec<(String, String)>, sqlx::Error> {
    if exam_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, (String, String)>(
        "SELECT exam_id, student_id FROM exam_access_grants WHERE exam_id = ANY($1)",
    )
    .bind(exam_ids)
    .fetch_all(pool)
    .await
}
