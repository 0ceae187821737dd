pub mod chat;
pub mod key_exchange;
pub mod user;

pub use chat::ChatServiceImpl;
pub use key_exchange::KeyExchangeServiceImpl;
pub use user::UserServiceImpl;
