use crate::error::{AppError, AppResult};
use crate::models::User;
use sqlx::PgPool;

pub async fn create(pool: &PgPool, username: &str, password_hash: &str) -> AppResult<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING id",
    )
    .bind(username)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::AlreadyExists(format!("username '{username}' is already taken"))
        }
        _ => AppError::Database(e),
    })?;

    Ok(id)
}

pub async fn get_by_username(pool: &PgPool, username: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, username, password_hash FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

pub async fn get_username_by_id(pool: &PgPool, user_id: i64) -> AppResult<String> {
    let username = sqlx::query_scalar::<_, String>("SELECT username FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user id {user_id} not found")))?;

    Ok(username)
}
