use messenger_service::auth::{AuthInterceptor, JwtKeys};
use messenger_service::broker::MessageBroker;
use messenger_service::pb::chat_service_server::ChatServiceServer;
use messenger_service::pb::key_exchange_service_server::KeyExchangeServiceServer;
use messenger_service::pb::user_service_server::UserServiceServer;
use messenger_service::registry::StreamRegistry;
use messenger_service::services::key_exchange_service;
use messenger_service::{config, db, error, grpc, logging, state::AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let db = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    // Embedded migrations are idempotent; a schema mismatch is fatal.
    db::MIGRATOR
        .run(&db)
        .await
        .map_err(|e| error::AppError::StartServer(format!("database migrations failed: {e}")))?;

    let broker = Arc::new(
        MessageBroker::connect(&cfg.broker_url)
            .await
            .map_err(|e| error::AppError::StartServer(format!("broker: {e}")))?,
    );

    let jwt = Arc::new(JwtKeys::new(&cfg.jwt_secret, cfg.session_token_ttl));
    let registry = StreamRegistry::new();

    let state = AppState {
        db: db.clone(),
        broker,
        registry,
        jwt: jwt.clone(),
        config: cfg.clone(),
    };

    key_exchange_service::spawn_expiry_sweeper(db, cfg.key_exchange_ttl);

    let addr: SocketAddr = cfg
        .grpc_listen
        .parse()
        .map_err(|e| error::AppError::StartServer(format!("invalid GRPC_LISTEN: {e}")))?;

    let auth = AuthInterceptor::new(jwt);

    tracing::info!(%addr, "starting messenger-service gRPC server");

    let server = Server::builder()
        .add_service(UserServiceServer::new(grpc::UserServiceImpl::new(
            state.clone(),
        )))
        .add_service(ChatServiceServer::with_interceptor(
            grpc::ChatServiceImpl::new(state.clone()),
            auth.clone(),
        ))
        .add_service(KeyExchangeServiceServer::with_interceptor(
            grpc::KeyExchangeServiceImpl::new(state),
            auth,
        ))
        .serve(addr);

    tokio::select! {
        result = server => {
            result.map_err(|e| error::AppError::StartServer(format!("grpc server: {e}")))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
