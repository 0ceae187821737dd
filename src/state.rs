use crate::auth::JwtKeys;
use crate::broker::MessageBroker;
use crate::config::Config;
use crate::registry::StreamRegistry;
use sqlx::{Pool, Postgres};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
    pub broker: Arc<MessageBroker>,
    pub registry: StreamRegistry,
    pub jwt: Arc<JwtKeys>,
    pub config: Arc<Config>,
}
