use crate::error::AppResult;
use crate::models::KeyExchange;
use sqlx::PgPool;

/// The current handshake for a chat: the most recently updated row that has
/// not been marked FAILED. At most one such row exists per chat.
pub async fn latest_active_by_chat(pool: &PgPool, chat_id: i64) -> AppResult<Option<KeyExchange>> {
    let row = sqlx::query_as::<_, KeyExchange>(
        r#"
        SELECT id, chat_id, initiator_id, recipient_id, dh_g, dh_p, dh_a, dh_b,
               status, created_at, updated_at
        FROM dh_key_exchanges
        WHERE chat_id = $1 AND status <> 'FAILED'
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
    )
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn insert_initiated(
    pool: &PgPool,
    chat_id: i64,
    initiator_id: i64,
    recipient_id: i64,
    g: &str,
    p: &str,
    a: &str,
) -> AppResult<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO dh_key_exchanges (chat_id, initiator_id, recipient_id, dh_g, dh_p, dh_a, status)
        VALUES ($1, $2, $3, $4, $5, $6, 'INITIATED')
        RETURNING id
        "#,
    )
    .bind(chat_id)
    .bind(initiator_id)
    .bind(recipient_id)
    .bind(g)
    .bind(p)
    .bind(a)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Idempotent re-init by the original initiator overwrites the public parameters.
pub async fn update_params(pool: &PgPool, id: i64, g: &str, p: &str, a: &str) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE dh_key_exchanges
        SET dh_g = $1, dh_p = $2, dh_a = $3, updated_at = NOW()
        WHERE id = $4
        "#,
    )
    .bind(g)
    .bind(p)
    .bind(a)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn complete(pool: &PgPool, id: i64, b: &str) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE dh_key_exchanges
        SET dh_b = $1, status = 'COMPLETED', updated_at = NOW()
        WHERE id = $2
        "#,
    )
    .bind(b)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Marks handshakes stuck in INITIATED longer than the TTL as FAILED,
/// unblocking a fresh Init for those chats. Returns the number of rows
/// transitioned.
pub async fn fail_stale_initiated(pool: &PgPool, ttl_secs: i64) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE dh_key_exchanges
        SET status = 'FAILED', updated_at = NOW()
        WHERE status = 'INITIATED' AND updated_at < NOW() - make_interval(secs => $1)
        "#,
    )
    .bind(ttl_secs as f64)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
