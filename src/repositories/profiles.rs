use sqlx::PgPool;
use sqlx::{Postgres, QueryBuilder};

use crate::db::models::Profile;
use crate::db::types::Role;

const COLUMNS: &str = "\
    id, email, hashed_password, role, full_name, enrollment_id, class_tag, \
    is_blocked, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!("SELECT {COLUMNS} FROM profiles WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!(
        "SELECT {COLUMNS} FROM profiles WHERE lower(email) = lower($1)"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn exists_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM profiles WHERE lower(email) = lower($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn fetch_one_by_id(pool: &PgPool, id: &str) -> Result<Profile, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!("SELECT {COLUMNS} FROM profiles WHERE id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

pub(crate) struct CreateProfile<'a> {
    pub(crate) id: &'a str,
    pub(crate) email: &'a str,
    pub(crate) hashed_password: String,
    pub(crate) role: Role,
    pub(crate) created_at: time::PrimitiveDateTime,
    pub(crate) updated_at: time::PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateProfile<'_>,
) -> Result<Profile, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!(
        "INSERT INTO profiles (
            id, email, hashed_password, role, is_blocked, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,FALSE,$5,$6)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.email)
    .bind(params.hashed_password)
    .bind(params.role)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(pool)
    .await
}

pub(crate) struct UpdateRegistration {
    pub(crate) full_name: Option<String>,
    pub(crate) enrollment_id: Option<String>,
    pub(crate) class_tag: Option<String>,
    pub(crate) updated_at: time::PrimitiveDateTime,
}

pub(crate) async fn update_registration(
    pool: &PgPool,
    id: &str,
    params: UpdateRegistration,
) -> Result<Profile, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!(
        "UPDATE profiles SET
            full_name = COALESCE($1, full_name),
            enrollment_id = COALESCE($2, enrollment_id),
            class_tag = COALESCE($3, class_tag),
            updated_at = $4
         WHERE id = $5
         RETURNING {COLUMNS}",
    ))
    .bind(params.full_name)
    .bind(params.enrollment_id)
    .bind(params.class_tag)
    .bind(params.updated_at)
    .bind(id)
    .fetch_one(pool)
    .await
}

pub(crate) async fn list_by_ids(
    pool: &PgPool,
    ids: &[String],
) -> Result<Vec<Profile>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, Profile>(&format!("SELECT {COLUMNS} FROM profiles WHERE id = ANY($1)"))
        .bind(ids)
        .fetch_all(pool)
        .await
}

pub(crate) async fn set_blocked(
    pool: &PgPool,
    id: &str,
    blocked: bool,
    now: time::PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE profiles SET is_blocked = $1, updated_at = $2 WHERE id = $3")
        .bind(blocked)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_paginated(
    pool: &PgPool,
    role: Option<Role>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Profile>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM profiles WHERE TRUE"));

    if let Some(role) = role {
        builder.push(" AND role = ");
        builder.push_bind(role);
    }

    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Profile>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, role: Option<Role>) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM profiles WHERE TRUE");

    if let Some(role) = role {
        builder.push(" AND role = ");
        builder.push_bind(role);
    }

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}
