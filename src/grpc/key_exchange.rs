use crate::auth::AuthUserExt;
use crate::models::KeyExchangeStatus;
use crate::pb::key_exchange_service_server::KeyExchangeService;
use crate::pb::{
    CompleteKeyExchangeRequest, CompleteKeyExchangeResponse, GetKeyExchangeParamsRequest,
    GetKeyExchangeParamsResponse, InitKeyExchangeRequest, InitKeyExchangeResponse,
    KeyExchangeStatus as PbKeyExchangeStatus,
};
use crate::services::key_exchange_service::KeyExchangeCoordinator;
use crate::state::AppState;
use tonic::{Request, Response, Status};

pub struct KeyExchangeServiceImpl {
    coordinator: KeyExchangeCoordinator,
}

impl KeyExchangeServiceImpl {
    pub fn new(state: AppState) -> Self {
        Self {
            coordinator: KeyExchangeCoordinator::new(state.db.clone()),
        }
    }
}

fn status_to_pb(status: KeyExchangeStatus) -> PbKeyExchangeStatus {
    match status {
        KeyExchangeStatus::NotStarted => PbKeyExchangeStatus::NotStarted,
        KeyExchangeStatus::Initiated => PbKeyExchangeStatus::Initiated,
        KeyExchangeStatus::Completed => PbKeyExchangeStatus::Completed,
        KeyExchangeStatus::Failed => PbKeyExchangeStatus::Failed,
    }
}

#[tonic::async_trait]
impl KeyExchangeService for KeyExchangeServiceImpl {
    async fn init_key_exchange(
        &self,
        request: Request<InitKeyExchangeRequest>,
    ) -> Result<Response<InitKeyExchangeResponse>, Status> {
        let user = request.auth_user()?;
        let req = request.into_inner();

        self.coordinator
            .init(user.user_id, &req.peer_username, &req.dh_g, &req.dh_p, &req.dh_a)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(InitKeyExchangeResponse { success: true }))
    }

    async fn complete_key_exchange(
        &self,
        request: Request<CompleteKeyExchangeRequest>,
    ) -> Result<Response<CompleteKeyExchangeResponse>, Status> {
        let user = request.auth_user()?;
        let req = request.into_inner();

        self.coordinator
            .complete(user.user_id, &req.peer_username, &req.dh_b)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(CompleteKeyExchangeResponse { success: true }))
    }

    async fn get_key_exchange_params(
        &self,
        request: Request<GetKeyExchangeParamsRequest>,
    ) -> Result<Response<GetKeyExchangeParamsResponse>, Status> {
        let user = request.auth_user()?;
        let req = request.into_inner();

        let view = self
            .coordinator
            .get(user.user_id, &req.peer_username)
            .await
            .map_err(Status::from)?;

        Ok(Response::new(GetKeyExchangeParamsResponse {
            status: status_to_pb(view.status) as i32,
            dh_g: view.dh_g,
            dh_p: view.dh_p,
            dh_a: view.dh_a,
            dh_b: view.dh_b,
        }))
    }
}
