use chrono::{DateTime, Utc};

/// Lifecycle of a Diffie-Hellman handshake for one chat.
///
/// `NotStarted` is virtual: it is reported when no row exists and is never
/// stored. Stored rows are `INITIATED`, `COMPLETED` or `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeStatus {
    NotStarted,
    Initiated,
    Completed,
    Failed,
}

impl KeyExchangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyExchangeStatus::NotStarted => "NOT_STARTED",
            KeyExchangeStatus::Initiated => "INITIATED",
            KeyExchangeStatus::Completed => "COMPLETED",
            KeyExchangeStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NOT_STARTED" => Some(KeyExchangeStatus::NotStarted),
            "INITIATED" => Some(KeyExchangeStatus::Initiated),
            "COMPLETED" => Some(KeyExchangeStatus::Completed),
            "FAILED" => Some(KeyExchangeStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct KeyExchange {
    pub id: i64,
    pub chat_id: i64,
    pub initiator_id: i64,
    pub recipient_id: i64,
    pub dh_g: Option<String>,
    pub dh_p: Option<String>,
    pub dh_a: Option<String>,
    pub dh_b: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KeyExchange {
    pub fn status(&self) -> KeyExchangeStatus {
        KeyExchangeStatus::from_str(&self.status).unwrap_or(KeyExchangeStatus::Failed)
    }
}
