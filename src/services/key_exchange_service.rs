use crate::error::{AppError, AppResult};
use crate::models::{KeyExchange, KeyExchangeStatus};
use crate::repos::{chat_repo, key_exchange_repo, user_repo};
use sqlx::PgPool;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What an `Init` request should do given the chat's current handshake row.
#[derive(Debug, PartialEq, Eq)]
pub enum InitAction {
    Insert,
    /// Idempotent re-init by the original initiator overwrites g, p, A.
    Overwrite(i64),
}

/// What a `Complete` request should do given the current handshake row.
#[derive(Debug, PartialEq, Eq)]
pub enum CompleteAction {
    Apply(i64),
    /// Re-applying an identical B to a completed exchange is a no-op.
    AlreadyApplied,
}

/// DH parameters travel as decimal strings of arbitrary precision; the
/// server stores them verbatim and only checks shape.
pub fn validate_dh_param(name: &str, value: &str) -> AppResult<()> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::InvalidArgument(format!(
            "{name} must be a non-empty decimal string"
        )));
    }
    Ok(())
}

/// State-machine decision for `Init`, independent of storage.
pub fn validate_init(existing: Option<&KeyExchange>, caller_id: i64) -> AppResult<InitAction> {
    let Some(row) = existing else {
        return Ok(InitAction::Insert);
    };

    match row.status() {
        KeyExchangeStatus::Initiated if row.initiator_id == caller_id => {
            Ok(InitAction::Overwrite(row.id))
        }
        KeyExchangeStatus::Initiated => Err(AppError::FailedPrecondition(
            "key exchange already initiated by peer".into(),
        )),
        KeyExchangeStatus::Completed => Err(AppError::FailedPrecondition(
            "key exchange already completed".into(),
        )),
        // Stored rows are never NOT_STARTED and FAILED rows are filtered
        // out of the active read; a fresh handshake may begin.
        KeyExchangeStatus::NotStarted | KeyExchangeStatus::Failed => Ok(InitAction::Insert),
    }
}

/// State-machine decision for `Complete`, independent of storage.
pub fn validate_complete(
    existing: Option<&KeyExchange>,
    caller_id: i64,
    b: &str,
) -> AppResult<CompleteAction> {
    let Some(row) = existing else {
        return Err(AppError::FailedPrecondition(
            "key exchange has not been initiated".into(),
        ));
    };

    match row.status() {
        KeyExchangeStatus::Initiated => {
            if row.recipient_id != caller_id {
                return Err(AppError::PermissionDenied(
                    "only the recipient can complete the key exchange".into(),
                ));
            }
            Ok(CompleteAction::Apply(row.id))
        }
        KeyExchangeStatus::Completed => {
            if row.recipient_id != caller_id {
                return Err(AppError::PermissionDenied(
                    "only the recipient can complete the key exchange".into(),
                ));
            }
            if row.dh_b.as_deref() == Some(b) {
                Ok(CompleteAction::AlreadyApplied)
            } else {
                Err(AppError::FailedPrecondition(
                    "key exchange already completed".into(),
                ))
            }
        }
        _ => Err(AppError::FailedPrecondition(
            "key exchange is not in progress".into(),
        )),
    }
}

/// The handshake as reported to either participant; fields are present
/// exactly when the stored row carries them.
#[derive(Debug, Clone)]
pub struct KeyExchangeView {
    pub status: KeyExchangeStatus,
    pub dh_g: Option<String>,
    pub dh_p: Option<String>,
    pub dh_a: Option<String>,
    pub dh_b: Option<String>,
}

impl KeyExchangeView {
    fn not_started() -> Self {
        Self {
            status: KeyExchangeStatus::NotStarted,
            dh_g: None,
            dh_p: None,
            dh_a: None,
            dh_b: None,
        }
    }
}

/// Coordinates the per-chat DH handshake rows. All operations resolve the
/// peer and chat first, then apply the pure state-machine decision to the
/// stored row.
pub struct KeyExchangeCoordinator {
    db: PgPool,
}

impl KeyExchangeCoordinator {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Resolution for `Init`, whose contract distinguishes a missing peer
    /// or chat (NotFound) from a self peer (InvalidArgument).
    async fn resolve_chat_for_init(
        &self,
        caller_id: i64,
        peer_username: &str,
    ) -> AppResult<(i64, i64)> {
        let peer = user_repo::get_by_username(&self.db, peer_username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user '{peer_username}' not found")))?;

        if peer.id == caller_id {
            return Err(AppError::InvalidArgument(
                "cannot exchange keys with yourself".into(),
            ));
        }

        let chat = chat_repo::get_by_user_ids(&self.db, caller_id, peer.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chat with '{peer_username}' not found")))?;

        Ok((peer.id, chat.id))
    }

    /// Peer and chat lookup for `Complete` and `Get`. Misses (unknown
    /// peer, self peer, no chat) collapse to `None`; each caller reports
    /// them in its own error vocabulary.
    async fn find_chat(&self, caller_id: i64, peer_username: &str) -> AppResult<Option<i64>> {
        let Some(peer) = user_repo::get_by_username(&self.db, peer_username).await? else {
            return Ok(None);
        };
        if peer.id == caller_id {
            return Ok(None);
        }

        let chat = chat_repo::get_by_user_ids(&self.db, caller_id, peer.id).await?;
        Ok(chat.map(|c| c.id))
    }

    pub async fn init(
        &self,
        caller_id: i64,
        peer_username: &str,
        g: &str,
        p: &str,
        a: &str,
    ) -> AppResult<()> {
        validate_dh_param("g", g)?;
        validate_dh_param("p", p)?;
        validate_dh_param("A", a)?;

        let (peer_id, chat_id) = self.resolve_chat_for_init(caller_id, peer_username).await?;
        let existing = key_exchange_repo::latest_active_by_chat(&self.db, chat_id).await?;

        match validate_init(existing.as_ref(), caller_id)? {
            InitAction::Insert => {
                key_exchange_repo::insert_initiated(
                    &self.db, chat_id, caller_id, peer_id, g, p, a,
                )
                .await?;
                tracing::info!(chat_id, initiator = caller_id, "key exchange initiated");
            }
            InitAction::Overwrite(id) => {
                key_exchange_repo::update_params(&self.db, id, g, p, a).await?;
                tracing::info!(chat_id, initiator = caller_id, "key exchange re-initiated");
            }
        }

        Ok(())
    }

    pub async fn complete(&self, caller_id: i64, peer_username: &str, b: &str) -> AppResult<()> {
        // Complete's contract has no InvalidArgument; a malformed B is a
        // precondition failure like any other unusable handshake state.
        validate_dh_param("B", b).map_err(|_| {
            AppError::FailedPrecondition("B must be a non-empty decimal string".into())
        })?;

        // No peer or no chat means no handshake can exist to complete.
        let Some(chat_id) = self.find_chat(caller_id, peer_username).await? else {
            return Err(AppError::FailedPrecondition(
                "key exchange has not been initiated".into(),
            ));
        };
        let existing = key_exchange_repo::latest_active_by_chat(&self.db, chat_id).await?;

        match validate_complete(existing.as_ref(), caller_id, b)? {
            CompleteAction::Apply(id) => {
                key_exchange_repo::complete(&self.db, id, b).await?;
                tracing::info!(chat_id, recipient = caller_id, "key exchange completed");
            }
            CompleteAction::AlreadyApplied => {}
        }

        Ok(())
    }

    pub async fn get(&self, caller_id: i64, peer_username: &str) -> AppResult<KeyExchangeView> {
        let Some(chat_id) = self.find_chat(caller_id, peer_username).await? else {
            return Err(AppError::NotFound(format!(
                "chat with '{peer_username}' not found"
            )));
        };

        let view = match key_exchange_repo::latest_active_by_chat(&self.db, chat_id).await? {
            None => KeyExchangeView::not_started(),
            Some(row) => KeyExchangeView {
                status: row.status(),
                dh_g: row.dh_g,
                dh_p: row.dh_p,
                dh_a: row.dh_a,
                dh_b: row.dh_b,
            },
        };

        Ok(view)
    }
}

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Periodically fails handshakes stuck in INITIATED past the TTL so a
/// fresh Init can begin for those chats.
pub fn spawn_expiry_sweeper(db: PgPool, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            match key_exchange_repo::fail_stale_initiated(&db, ttl.as_secs() as i64).await {
                Ok(0) => {}
                Ok(failed) => {
                    tracing::info!(failed, "expired stale key exchanges");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "key exchange expiry sweep failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(status: KeyExchangeStatus, initiator_id: i64, recipient_id: i64) -> KeyExchange {
        let now = Utc::now();
        KeyExchange {
            id: 11,
            chat_id: 1,
            initiator_id,
            recipient_id,
            dh_g: Some("2".into()),
            dh_p: Some("23".into()),
            dh_a: Some("8".into()),
            dh_b: match status {
                KeyExchangeStatus::Completed => Some("19".into()),
                _ => None,
            },
            status: status.as_str().into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn dh_params_must_be_decimal_strings() {
        assert!(validate_dh_param("g", "2").is_ok());
        assert!(validate_dh_param("p", "123456789012345678901234567890").is_ok());
        assert!(validate_dh_param("g", "").is_err());
        assert!(validate_dh_param("A", "0x2f").is_err());
        assert!(validate_dh_param("A", "-5").is_err());
    }

    #[test]
    fn init_with_no_row_inserts() {
        assert_eq!(validate_init(None, 1).unwrap(), InitAction::Insert);
    }

    #[test]
    fn init_by_same_initiator_is_idempotent() {
        let existing = row(KeyExchangeStatus::Initiated, 1, 2);
        assert_eq!(
            validate_init(Some(&existing), 1).unwrap(),
            InitAction::Overwrite(11)
        );
    }

    #[test]
    fn init_by_peer_is_rejected() {
        let existing = row(KeyExchangeStatus::Initiated, 1, 2);
        let err = validate_init(Some(&existing), 2).unwrap_err();
        assert!(matches!(err, AppError::FailedPrecondition(msg) if msg.contains("peer")));
    }

    #[test]
    fn init_after_completed_is_rejected() {
        let existing = row(KeyExchangeStatus::Completed, 1, 2);
        let err = validate_init(Some(&existing), 1).unwrap_err();
        assert!(matches!(err, AppError::FailedPrecondition(msg) if msg.contains("completed")));
    }

    #[test]
    fn complete_without_row_is_rejected() {
        let err = validate_complete(None, 2, "19").unwrap_err();
        assert!(matches!(err, AppError::FailedPrecondition(_)));
    }

    #[test]
    fn complete_by_recipient_applies() {
        let existing = row(KeyExchangeStatus::Initiated, 1, 2);
        assert_eq!(
            validate_complete(Some(&existing), 2, "19").unwrap(),
            CompleteAction::Apply(11)
        );
    }

    #[test]
    fn complete_by_non_recipient_is_permission_denied() {
        let existing = row(KeyExchangeStatus::Initiated, 1, 2);
        let err = validate_complete(Some(&existing), 1, "19").unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));
    }

    #[test]
    fn complete_twice_with_identical_b_is_idempotent() {
        let existing = row(KeyExchangeStatus::Completed, 1, 2);
        assert_eq!(
            validate_complete(Some(&existing), 2, "19").unwrap(),
            CompleteAction::AlreadyApplied
        );
    }

    #[test]
    fn complete_twice_with_different_b_is_rejected() {
        let existing = row(KeyExchangeStatus::Completed, 1, 2);
        let err = validate_complete(Some(&existing), 2, "42").unwrap_err();
        assert!(matches!(err, AppError::FailedPrecondition(_)));
    }

    #[test]
    fn full_handshake_drives_to_completed() {
        // NOT_STARTED --Init--> INITIATED --Complete by recipient--> COMPLETED
        assert_eq!(validate_init(None, 1).unwrap(), InitAction::Insert);

        let initiated = row(KeyExchangeStatus::Initiated, 1, 2);
        assert_eq!(
            validate_complete(Some(&initiated), 2, "19").unwrap(),
            CompleteAction::Apply(11)
        );

        // A concurrent second Init by the peer is rejected.
        assert!(validate_init(Some(&initiated), 2).is_err());
    }
}
