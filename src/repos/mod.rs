pub mod chat_repo;
pub mod key_exchange_repo;
pub mod message_repo;
pub mod token_repo;
pub mod user_repo;
