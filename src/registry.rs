use crate::pb::ChatResponse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tonic::Status;

/// Send side of a live chat stream, as held by the registry.
pub type StreamSender = UnboundedSender<Result<ChatResponse, Status>>;

/// Identifies one declare-to-clear session generation. A reconnect bumps
/// the generation, so a preempted session's deferred clear cannot remove
/// the entry that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(u64);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no peer declared: call ConnectToChat first")]
    NoPeer,
    #[error("a stream is already attached for this session")]
    AlreadyAttached,
    #[error("session was preempted by a newer connection")]
    Preempted,
}

impl From<RegistryError> for Status {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NoPeer => Status::failed_precondition(err.to_string()),
            RegistryError::AlreadyAttached => Status::failed_precondition(err.to_string()),
            RegistryError::Preempted => Status::cancelled(err.to_string()),
        }
    }
}

struct SessionEntry {
    peer_id: i64,
    session: SessionId,
    stream: Option<StreamSender>,
}

/// Process-wide index from logged-in user to its declared peer and live
/// stream handle. At most one entry exists per user; all mutation happens
/// under the single write lock, lookups take the read lock.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    inner: Arc<RwLock<HashMap<i64, SessionEntry>>>,
    counter: Arc<AtomicU64>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the peer for the caller's upcoming stream. Any stale entry
    /// from a prior session is preempted: its live stream (if attached)
    /// receives a terminal Cancelled status and the entry is replaced.
    pub async fn declare_peer(&self, user_id: i64, peer_id: i64) -> SessionId {
        let session = SessionId(self.counter.fetch_add(1, Ordering::Relaxed) + 1);
        let mut map = self.inner.write().await;

        if let Some(stale) = map.insert(
            user_id,
            SessionEntry {
                peer_id,
                session,
                stream: None,
            },
        ) {
            if let Some(stream) = stale.stream {
                let _ = stream.send(Err(Status::cancelled(
                    "session preempted by a newer connection",
                )));
            }
            tracing::info!(user_id, "stale session preempted");
        }

        session
    }

    /// Attaches the live stream handle. The whole read-modify-write runs
    /// under the write lock so the peer declared by `declare_peer` is
    /// guaranteed to be observed.
    pub async fn attach_stream(
        &self,
        user_id: i64,
        session: SessionId,
        stream: StreamSender,
    ) -> Result<(), RegistryError> {
        let mut map = self.inner.write().await;

        match map.get_mut(&user_id) {
            None => Err(RegistryError::NoPeer),
            Some(entry) if entry.session != session => Err(RegistryError::Preempted),
            Some(entry) if entry.stream.is_some() => Err(RegistryError::AlreadyAttached),
            Some(entry) => {
                entry.stream = Some(stream);
                Ok(())
            }
        }
    }

    pub async fn lookup_peer(&self, user_id: i64) -> Option<i64> {
        self.inner.read().await.get(&user_id).map(|e| e.peer_id)
    }

    /// Peer and session generation together, as needed by the stream open.
    pub async fn lookup_session(&self, user_id: i64) -> Option<(i64, SessionId)> {
        self.inner
            .read()
            .await
            .get(&user_id)
            .map(|e| (e.peer_id, e.session))
    }

    pub async fn lookup_stream(&self, user_id: i64) -> Option<StreamSender> {
        self.inner
            .read()
            .await
            .get(&user_id)
            .and_then(|e| e.stream.clone())
    }

    /// Removes the entry if it still belongs to the given session.
    /// Idempotent; a no-op when a newer session has taken the slot.
    pub async fn clear(&self, user_id: i64, session: SessionId) {
        let mut map = self.inner.write().await;
        if map.get(&user_id).is_some_and(|e| e.session == session) {
            map.remove(&user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sender() -> (StreamSender, mpsc::UnboundedReceiver<Result<ChatResponse, Status>>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn declare_attach_lookup_clear_lifecycle() {
        let registry = StreamRegistry::new();
        let session = registry.declare_peer(1, 2).await;

        assert_eq!(registry.lookup_peer(1).await, Some(2));
        assert!(registry.lookup_stream(1).await.is_none());

        let (tx, _rx) = sender();
        registry.attach_stream(1, session, tx).await.unwrap();
        assert!(registry.lookup_stream(1).await.is_some());

        registry.clear(1, session).await;
        assert!(registry.lookup_peer(1).await.is_none());
        assert!(registry.lookup_stream(1).await.is_none());
    }

    #[tokio::test]
    async fn attach_without_declare_fails() {
        let registry = StreamRegistry::new();
        let session = registry.declare_peer(1, 2).await;
        registry.clear(1, session).await;

        let (tx, _rx) = sender();
        assert!(matches!(
            registry.attach_stream(1, session, tx).await,
            Err(RegistryError::NoPeer)
        ));
    }

    #[tokio::test]
    async fn double_attach_fails() {
        let registry = StreamRegistry::new();
        let session = registry.declare_peer(1, 2).await;

        let (tx, _rx) = sender();
        registry.attach_stream(1, session, tx).await.unwrap();

        let (tx2, _rx2) = sender();
        assert!(matches!(
            registry.attach_stream(1, session, tx2).await,
            Err(RegistryError::AlreadyAttached)
        ));
    }

    #[tokio::test]
    async fn reconnect_preempts_stale_session() {
        let registry = StreamRegistry::new();
        let first = registry.declare_peer(1, 2).await;
        let (tx, mut rx) = sender();
        registry.attach_stream(1, first, tx).await.unwrap();

        // Second connect for the same user takes over the slot.
        let second = registry.declare_peer(1, 3).await;
        assert_ne!(first, second);
        assert_eq!(registry.lookup_peer(1).await, Some(3));

        // The preempted stream got a terminal status.
        let kicked = rx.recv().await.unwrap();
        assert_eq!(kicked.unwrap_err().code(), tonic::Code::Cancelled);

        // The stale attach and deferred clear are both rejected/no-ops.
        let (tx2, _rx2) = sender();
        assert!(matches!(
            registry.attach_stream(1, first, tx2).await,
            Err(RegistryError::Preempted)
        ));
        registry.clear(1, first).await;
        assert_eq!(registry.lookup_peer(1).await, Some(3));

        registry.clear(1, second).await;
        assert!(registry.lookup_peer(1).await.is_none());
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let registry = StreamRegistry::new();
        let session = registry.declare_peer(1, 2).await;
        registry.clear(1, session).await;
        registry.clear(1, session).await;
        assert!(registry.lookup_peer(1).await.is_none());
    }

    #[tokio::test]
    async fn at_most_one_entry_per_user() {
        let registry = StreamRegistry::new();
        registry.declare_peer(1, 2).await;
        let session = registry.declare_peer(1, 5).await;

        assert_eq!(registry.lookup_session(1).await, Some((5, session)));
    }
}
