use uuid::Uuid;

use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::Role;
use crate::repositories;

pub(crate) async fn ensure_admin(state: &AppState) -> anyhow::Result<()> {
    let admin = state.settings().admin();
    if admin.first_admin_password.is_empty() {
        tracing::warn!("FIRST_ADMIN_PASSWORD not configured; skipping admin bootstrap");
        return Ok(());
    }

    let email = &admin.first_admin_email;

    let profile = repositories::profiles::find_by_email(state.db(), email).await?;

    let now = primitive_now_utc();

    if let Some(profile) = profile {
        let mut needs_update = false;
        let verified =
            security::verify_password(&admin.first_admin_password, &profile.hashed_password)
                .unwrap_or(false);

        let hashed_password = if verified {
            profile.hashed_password.clone()
        } else {
            needs_update = true;
            security::hash_password(&admin.first_admin_password)?
        };

        let role = if profile.role != Role::Admin {
            needs_update = true;
            Role::Admin
        } else {
            profile.role
        };

        let is_blocked = if profile.is_blocked {
            needs_update = true;
            false
        } else {
            profile.is_blocked
        };

        if needs_update {
            sqlx::query(
                "UPDATE profiles
                 SET hashed_password = $1,
                     role = $2,
                     is_blocked = $3,
                     updated_at = $4
                 WHERE id = $5",
            )
            .bind(hashed_password)
            .bind(role)
            .bind(is_blocked)
            .bind(now)
            .bind(profile.id)
            .execute(state.db())
            .await?;

            tracing::info!("Updated bootstrap admin {email}");
        } else {
            tracing::info!("Bootstrap admin already up to date");
        }

        return Ok(());
    }

    let hashed_password = security::hash_password(&admin.first_admin_password)?;

    sqlx::query(
        "INSERT INTO profiles (
            id, email, hashed_password, role, full_name, is_blocked, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(email)
    .bind(hashed_password)
    .bind(Role::Admin)
    .bind("Portal Admin")
    .bind(false)
    .bind(now)
    .bind(now)
    .execute(state.db())
    .await?;

    tracing::info!("Created bootstrap admin {email}");
    Ok(())
}
