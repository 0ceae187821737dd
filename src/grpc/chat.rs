use crate::auth::AuthUserExt;
use crate::pb::chat_service_server::ChatService;
use crate::pb::{
    ChatMessage, ChatResponse, ConnectRequest, ConnectResponse, CreateChatRequest,
    CreateChatResponse, DeleteChatRequest, DeleteChatResponse, GetChatsRequest, GetChatsResponse,
};
use crate::repos::{chat_repo, user_repo};
use crate::services::chat_service::ChatSession;
use crate::state::AppState;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tonic::{Request, Response, Status, Streaming};

pub struct ChatServiceImpl {
    state: AppState,
}

impl ChatServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl ChatService for ChatServiceImpl {
    async fn create_chat(
        &self,
        request: Request<CreateChatRequest>,
    ) -> Result<Response<CreateChatResponse>, Status> {
        let user = request.auth_user()?;
        let req = request.into_inner();

        let target = user_repo::get_by_username(&self.state.db, &req.username)
            .await
            .map_err(Status::from)?
            .ok_or_else(|| Status::not_found(format!("user '{}' not found", req.username)))?;

        if target.id == user.user_id {
            return Err(Status::invalid_argument("cannot create a chat with yourself"));
        }

        chat_repo::create(&self.state.db, user.user_id, target.id)
            .await
            .map_err(|e| match e {
                crate::error::AppError::AlreadyExists(_) => Status::already_exists(format!(
                    "chat with user '{}' already exists",
                    req.username
                )),
                other => Status::from(other),
            })?;

        tracing::info!(user_id = user.user_id, peer = %req.username, "chat created");

        Ok(Response::new(CreateChatResponse {
            username: req.username,
        }))
    }

    async fn get_chats(
        &self,
        request: Request<GetChatsRequest>,
    ) -> Result<Response<GetChatsResponse>, Status> {
        let user = request.auth_user()?;

        let usernames = chat_repo::peer_usernames(&self.state.db, user.user_id)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(GetChatsResponse { usernames }))
    }

    async fn delete_chat(
        &self,
        request: Request<DeleteChatRequest>,
    ) -> Result<Response<DeleteChatResponse>, Status> {
        let user = request.auth_user()?;
        let req = request.into_inner();

        let target = user_repo::get_by_username(&self.state.db, &req.username)
            .await
            .map_err(Status::from)?
            .ok_or_else(|| Status::not_found(format!("user '{}' not found", req.username)))?;

        let chat = chat_repo::get_by_user_ids(&self.state.db, user.user_id, target.id)
            .await
            .map_err(Status::from)?
            .ok_or_else(|| Status::not_found(format!("chat with '{}' not found", req.username)))?;

        chat_repo::delete(&self.state.db, chat.id)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(DeleteChatResponse { success: true }))
    }

    /// Declares who the caller is about to chat with, before the stream
    /// opens. A stale session from a crashed client is preempted here.
    async fn connect_to_chat(
        &self,
        request: Request<ConnectRequest>,
    ) -> Result<Response<ConnectResponse>, Status> {
        let user = request.auth_user()?;
        let req = request.into_inner();

        let receiver = user_repo::get_by_username(&self.state.db, &req.receiver_username)
            .await
            .map_err(Status::from)?
            .ok_or_else(|| {
                Status::not_found(format!("user '{}' does not exist", req.receiver_username))
            })?;

        chat_repo::get_by_user_ids(&self.state.db, user.user_id, receiver.id)
            .await
            .map_err(Status::from)?
            .ok_or_else(|| {
                Status::not_found(format!("chat with '{}' not found", req.receiver_username))
            })?;

        self.state.registry.declare_peer(user.user_id, receiver.id).await;

        tracing::info!(
            user_id = user.user_id,
            receiver = %req.receiver_username,
            "connected to chat"
        );

        Ok(Response::new(ConnectResponse { success: true }))
    }

    type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatResponse, Status>> + Send + 'static>>;

    async fn chat(
        &self,
        request: Request<Streaming<ChatMessage>>,
    ) -> Result<Response<Self::ChatStream>, Status> {
        let user = request.auth_user()?;
        let inbound = request.into_inner();
        let state = self.state.clone();

        let (peer_id, session) = state
            .registry
            .lookup_session(user.user_id)
            .await
            .ok_or_else(|| {
                Status::failed_precondition("not connected: call ConnectToChat first")
            })?;

        let username = user_repo::get_username_by_id(&state.db, user.user_id)
            .await
            .map_err(Status::from)?;
        let peer_username = user_repo::get_username_by_id(&state.db, peer_id)
            .await
            .map_err(Status::from)?;

        let chat = chat_repo::get_by_user_ids(&state.db, user.user_id, peer_id)
            .await
            .map_err(Status::from)?
            .ok_or_else(|| Status::not_found(format!("chat with '{peer_username}' not found")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        state
            .registry
            .attach_stream(user.user_id, session, tx.clone())
            .await
            .map_err(Status::from)?;

        let chat_session = ChatSession::new(
            state.clone(),
            session,
            chat.id,
            user.user_id,
            peer_id,
            username,
            peer_username,
            tx,
        );
        tokio::spawn(chat_session.run(inbound));

        Ok(Response::new(Box::pin(UnboundedReceiverStream::new(rx))))
    }
}
