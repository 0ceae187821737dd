use crate::broker::MessageBroker;
use crate::models::NewMessage;
use crate::pb::{ChatMessage, ChatResponse};
use crate::registry::{SessionId, StreamSender};
use crate::repos::message_repo;
use crate::state::AppState;
use chrono::Utc;
use tokio::task::JoinSet;
use tonic::{Code, Status, Streaming};

/// One live bidirectional chat session. Owns the receive loop and the
/// outbound half of the caller's stream; the registry holds a clone of the
/// outbound sender so the peer's session can deliver directly.
pub struct ChatSession {
    state: AppState,
    session: SessionId,
    chat_id: i64,
    user_id: i64,
    peer_id: i64,
    username: String,
    peer_username: String,
    tx: StreamSender,
}

impl ChatSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: AppState,
        session: SessionId,
        chat_id: i64,
        user_id: i64,
        peer_id: i64,
        username: String,
        peer_username: String,
        tx: StreamSender,
    ) -> Self {
        Self {
            state,
            session,
            chat_id,
            user_id,
            peer_id,
            username,
            peer_username,
            tx,
        }
    }

    /// Runs the session to completion. The registry entry is cleared on
    /// every exit path; a terminal error is surfaced on the stream if the
    /// client is still listening.
    pub async fn run(self, inbound: Streaming<ChatMessage>) {
        tracing::info!(
            user = %self.username,
            peer = %self.peer_username,
            chat_id = self.chat_id,
            "chat session started"
        );

        if let Err(status) = self.serve(inbound).await {
            let _ = self.tx.send(Err(status));
        }

        self.state.registry.clear(self.user_id, self.session).await;
        tracing::info!(user = %self.username, "chat session ended");
    }

    async fn serve(&self, mut inbound: Streaming<ChatMessage>) -> Result<(), Status> {
        self.push_history().await?;
        self.drain_offline().await;

        let mut tasks = JoinSet::new();
        let result = self.receive_loop(&mut inbound, &mut tasks).await;

        // Join barrier: no persist task outlives the stream.
        while tasks.join_next().await.is_some() {}

        result
    }

    /// Replays the last messages of the chat onto the caller's stream in
    /// ascending timestamp order. A send failure here is fatal to the
    /// session before the receive loop ever starts.
    async fn push_history(&self) -> Result<(), Status> {
        let messages = message_repo::history(
            &self.state.db,
            self.chat_id,
            self.state.config.history_limit,
        )
        .await
        .map_err(Status::from)?;

        for message in messages {
            let sender_username = if message.sender_id == self.user_id {
                &self.username
            } else {
                &self.peer_username
            };

            let frame = ChatResponse {
                sender_username: sender_username.clone(),
                content: message.content,
                timestamp: message.timestamp.timestamp(),
            };

            self.tx
                .send(Ok(frame))
                .map_err(|_| Status::internal("failed to send history message"))?;
        }

        Ok(())
    }

    /// Feeds the caller's offline backlog into the stream. Failures are
    /// logged and the session proceeds into live mode regardless.
    async fn drain_offline(&self) {
        let queue = MessageBroker::queue_for(&self.username);

        let depth = match self.state.broker.depth(&queue).await {
            Ok(depth) => depth,
            Err(e) => {
                tracing::warn!(queue, error = %e, "failed to check offline queue depth");
                return;
            }
        };
        if depth == 0 {
            return;
        }

        let tx = self.tx.clone();
        let result = self
            .state
            .broker
            .drain(&queue, self.state.config.drain_poll_interval, move |msg| {
                let tx = tx.clone();
                async move {
                    let frame = ChatResponse {
                        sender_username: msg.sender,
                        content: msg.content,
                        timestamp: msg.timestamp.timestamp(),
                    };
                    tx.send(Ok(frame))
                        .map_err(|_| crate::error::AppError::Internal)
                }
            })
            .await;

        match result {
            Ok(acked) => {
                tracing::info!(queue, acked, "offline backlog drained");
            }
            Err(e) => {
                tracing::warn!(queue, error = %e, "offline drain failed");
            }
        }
    }

    /// Receives frames until the client closes or an error occurs. Each
    /// frame is timestamped, persisted asynchronously, and delivered
    /// serially so publish/direct-send order matches send order.
    async fn receive_loop(
        &self,
        inbound: &mut Streaming<ChatMessage>,
        tasks: &mut JoinSet<()>,
    ) -> Result<(), Status> {
        loop {
            let frame = match inbound.message().await {
                Ok(Some(frame)) => frame,
                // Client closed the stream; clean exit.
                Ok(None) => return Ok(()),
                Err(status) if status.code() == Code::Cancelled => return Ok(()),
                Err(status) => {
                    return Err(Status::internal(format!(
                        "failed to receive message: {}",
                        status.message()
                    )))
                }
            };

            if frame.content.is_empty() {
                return Err(Status::invalid_argument("message content cannot be empty"));
            }

            let message = NewMessage {
                chat_id: self.chat_id,
                sender_id: self.user_id,
                receiver_id: self.peer_id,
                content: frame.content,
                timestamp: Utc::now(),
            };

            // Persistence backs history queries only; the broker is the
            // durable delivery channel, so a failure here does not fail
            // the send.
            let db = self.state.db.clone();
            let persisted = message.clone();
            tasks.spawn(async move {
                if let Err(e) = message_repo::save(&db, &persisted).await {
                    tracing::error!(
                        chat_id = persisted.chat_id,
                        error = %e,
                        "failed to persist message"
                    );
                }
            });

            self.deliver(message).await;
        }
    }

    /// Live delivery via the peer's registered stream, falling back to the
    /// peer's offline queue when the peer has no stream or its stream has
    /// gone away.
    async fn deliver(&self, message: NewMessage) {
        if let Some(peer_tx) = self.state.registry.lookup_stream(self.peer_id).await {
            let frame = ChatResponse {
                sender_username: self.username.clone(),
                content: message.content.clone(),
                timestamp: message.timestamp.timestamp(),
            };

            if peer_tx.send(Ok(frame)).is_ok() {
                return;
            }

            tracing::warn!(
                peer = %self.peer_username,
                "live delivery failed, demoting to offline queue"
            );
        }

        if let Err(e) = self
            .state
            .broker
            .publish(
                &self.peer_username,
                &self.username,
                &message.content,
                message.timestamp,
            )
            .await
        {
            // Best effort after a failed live send; the message is lost
            // from the server's perspective.
            tracing::error!(
                peer = %self.peer_username,
                error = %e,
                "failed to publish message to offline queue"
            );
        }
    }
}
