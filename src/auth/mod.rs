pub mod interceptor;
pub mod jwt;
pub mod password;

pub use interceptor::{AuthInterceptor, AuthUser, AuthUserExt};
pub use jwt::JwtKeys;
