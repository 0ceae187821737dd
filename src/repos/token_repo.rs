use crate::error::AppResult;
use crate::models::Token;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// A fresh login replaces any token the user still has on record.
pub async fn replace_for_user(
    pool: &PgPool,
    user_id: i64,
    token: &str,
    expires_at: DateTime<Utc>,
) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("INSERT INTO tokens (user_id, token, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn get_by_token(pool: &PgPool, token: &str) -> AppResult<Option<Token>> {
    let row = sqlx::query_as::<_, Token>(
        "SELECT id, user_id, token, expires_at, created_at FROM tokens WHERE token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn delete_by_token(pool: &PgPool, token: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM tokens WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}
