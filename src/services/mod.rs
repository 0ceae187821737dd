pub mod chat_service;
pub mod key_exchange_service;
