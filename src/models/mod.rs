pub mod chat;
pub mod key_exchange;
pub mod message;
pub mod token;
pub mod user;

pub use chat::Chat;
pub use key_exchange::{KeyExchange, KeyExchangeStatus};
pub use message::{Message, NewMessage};
pub use token::Token;
pub use user::User;
