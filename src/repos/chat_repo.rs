use crate::error::{AppError, AppResult};
use crate::models::chat::canonical_pair;
use crate::models::Chat;
use sqlx::PgPool;

pub async fn create(pool: &PgPool, user_a: i64, user_b: i64) -> AppResult<i64> {
    let (user_1_id, user_2_id) = canonical_pair(user_a, user_b);

    // ON CONFLICT DO NOTHING yields no row when the pair already exists.
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO chats (user_1_id, user_2_id) VALUES ($1, $2)
        ON CONFLICT (user_1_id, user_2_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(user_1_id)
    .bind(user_2_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::AlreadyExists("chat already exists".into()))?;

    Ok(id)
}

pub async fn get_by_user_ids(pool: &PgPool, user_a: i64, user_b: i64) -> AppResult<Option<Chat>> {
    let (user_1_id, user_2_id) = canonical_pair(user_a, user_b);

    let chat = sqlx::query_as::<_, Chat>(
        "SELECT id, user_1_id, user_2_id FROM chats WHERE user_1_id = $1 AND user_2_id = $2",
    )
    .bind(user_1_id)
    .bind(user_2_id)
    .fetch_optional(pool)
    .await?;

    Ok(chat)
}

/// Usernames of everyone the given user shares a chat with.
pub async fn peer_usernames(pool: &PgPool, user_id: i64) -> AppResult<Vec<String>> {
    let usernames = sqlx::query_scalar::<_, String>(
        r#"
        SELECT u.username
        FROM chats c
        JOIN users u ON u.id = CASE WHEN c.user_1_id = $1 THEN c.user_2_id ELSE c.user_1_id END
        WHERE c.user_1_id = $1 OR c.user_2_id = $1
        ORDER BY u.username
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(usernames)
}

/// Deletion cascades to messages and key-exchange rows.
pub async fn delete(pool: &PgPool, chat_id: i64) -> AppResult<()> {
    sqlx::query("DELETE FROM chats WHERE id = $1")
        .bind(chat_id)
        .execute(pool)
        .await?;

    Ok(())
}
