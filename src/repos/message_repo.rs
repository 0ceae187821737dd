use crate::error::AppResult;
use crate::models::{Message, NewMessage};
use sqlx::PgPool;

pub async fn save(pool: &PgPool, message: &NewMessage) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO messages (chat_id, sender_id, receiver_id, content, timestamp)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(message.chat_id)
    .bind(message.sender_id)
    .bind(message.receiver_id)
    .bind(&message.content)
    .bind(message.timestamp)
    .execute(pool)
    .await?;

    Ok(())
}

/// Last `limit` messages of a chat in ascending timestamp order.
pub async fn history(pool: &PgPool, chat_id: i64, limit: i64) -> AppResult<Vec<Message>> {
    let messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT id, chat_id, sender_id, receiver_id, content, timestamp
        FROM (
            SELECT id, chat_id, sender_id, receiver_id, content, timestamp
            FROM messages WHERE chat_id = $1 ORDER BY timestamp DESC LIMIT $2
        ) latest
        ORDER BY timestamp ASC
        "#,
    )
    .bind(chat_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(messages)
}
