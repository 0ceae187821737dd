use crate::auth::interceptor::AuthInterceptor;
use crate::auth::password;
use crate::pb::user_service_server::UserService;
use crate::pb::{
    LoginRequest, LoginResponse, LogoutRequest, LogoutResponse, RegisterRequest, RegisterResponse,
};
use crate::repos::{token_repo, user_repo};
use crate::state::AppState;
use tonic::{Request, Response, Status};

/// Account lifecycle. This service carries no auth interceptor so that
/// Register and Login stay anonymous; Logout authenticates in-handler.
pub struct UserServiceImpl {
    state: AppState,
}

impl UserServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    async fn issue_token(&self, user_id: i64) -> Result<String, Status> {
        let (token, expires_at) = self.state.jwt.sign(user_id).map_err(Status::from)?;

        token_repo::replace_for_user(&self.state.db, user_id, &token, expires_at)
            .await
            .map_err(Status::from)?;

        Ok(token)
    }
}

#[tonic::async_trait]
impl UserService for UserServiceImpl {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();

        if req.username.is_empty() {
            return Err(Status::invalid_argument("username is required"));
        }
        if req.password.is_empty() {
            return Err(Status::invalid_argument("password is required"));
        }
        if req.password != req.confirm_password {
            return Err(Status::invalid_argument("passwords must match"));
        }

        let password_hash = password::hash_password(&req.password).map_err(Status::from)?;
        let user_id = user_repo::create(&self.state.db, &req.username, &password_hash)
            .await
            .map_err(Status::from)?;

        tracing::info!(username = %req.username, user_id, "user registered");

        let token = self.issue_token(user_id).await?;
        Ok(Response::new(RegisterResponse { token }))
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();

        let user = user_repo::get_by_username(&self.state.db, &req.username)
            .await
            .map_err(Status::from)?
            .ok_or_else(|| Status::not_found(format!("user '{}' not found", req.username)))?;

        password::verify_password(&req.password, &user.password_hash).map_err(Status::from)?;

        tracing::info!(username = %user.username, "user logged in");

        let token = self.issue_token(user.id).await?;
        Ok(Response::new(LoginResponse { token }))
    }

    async fn logout(
        &self,
        request: Request<LogoutRequest>,
    ) -> Result<Response<LogoutResponse>, Status> {
        let token = AuthInterceptor::bearer_token(request.metadata())?.to_owned();
        self.state
            .jwt
            .verify(&token)
            .map_err(|_| Status::unauthenticated("invalid or expired token"))?;

        token_repo::get_by_token(&self.state.db, &token)
            .await
            .map_err(Status::from)?
            .ok_or_else(|| Status::unauthenticated("token is not active"))?;

        token_repo::delete_by_token(&self.state.db, &token)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(LogoutResponse { success: true }))
    }
}
