/// User database operations
use super::DbResult;
use crate::models::User;
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, phone, password_hash, two_factor_enabled, \
     two_factor_secret, two_factor_backup_codes, created_at, updated_at";

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> DbResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(user)
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> DbResult<Option<User>> {
    let user =
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(pool)
            .await?;

    Ok(user)
}

pub async fn find_by_phone(pool: &PgPool, phone: &str) -> DbResult<Option<User>> {
    let user =
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1"))
            .bind(phone)
            .fetch_optional(pool)
            .await?;

    Ok(user)
}

/// Insert a phone-only user. A duplicate phone surfaces as `StoreError::Conflict`.
pub async fn create_with_phone(pool: &PgPool, phone: &str) -> DbResult<User> {
    let user = User::with_phone(phone);

    let created = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (id, phone, two_factor_enabled, created_at, updated_at)
        VALUES ($1, $2, FALSE, $3, $4)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user.id)
    .bind(phone)
    .bind(user.created_at)
    .bind(user.updated_at)
    .fetch_one(pool)
    .await?;

    Ok(created)
}

pub async fn set_two_factor_secret(pool: &PgPool, user_id: Uuid, secret: &str) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE users SET two_factor_secret = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(user_id)
    .bind(secret)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound.into());
    }
    Ok(())
}

pub async fn enable_two_factor(
    pool: &PgPool,
    user_id: Uuid,
    backup_code_hashes: &[String],
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET two_factor_enabled = TRUE, two_factor_backup_codes = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(backup_code_hashes)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound.into());
    }
    Ok(())
}

/// Remove one backup code digest in a single statement; `false` if absent
pub async fn consume_backup_code(pool: &PgPool, user_id: Uuid, code_hash: &str) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET two_factor_backup_codes = array_remove(two_factor_backup_codes, $2),
            updated_at = NOW()
        WHERE id = $1 AND $2 = ANY(two_factor_backup_codes)
        "#,
    )
    .bind(user_id)
    .bind(code_hash)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
