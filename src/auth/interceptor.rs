use crate::auth::jwt::JwtKeys;
use std::sync::Arc;
use tonic::metadata::MetadataMap;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Identity of the authenticated caller, injected into request extensions.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i64,
}

/// Validates the `authorization: Bearer <jwt>` metadata header and stores
/// the caller identity in request extensions. Attached per service;
/// UserService stays un-intercepted so Register and Login remain anonymous.
#[derive(Clone)]
pub struct AuthInterceptor {
    keys: Arc<JwtKeys>,
}

impl AuthInterceptor {
    pub fn new(keys: Arc<JwtKeys>) -> Self {
        Self { keys }
    }

    /// Extracts the bearer token from request metadata.
    pub fn bearer_token(metadata: &MetadataMap) -> Result<&str, Status> {
        let header = metadata
            .get("authorization")
            .ok_or_else(|| Status::unauthenticated("missing authorization header"))?;

        let value = header
            .to_str()
            .map_err(|_| Status::unauthenticated("invalid authorization header"))?;

        value
            .strip_prefix("Bearer ")
            .ok_or_else(|| Status::unauthenticated("expected 'Bearer <token>'"))
    }

    pub fn authenticate(&self, metadata: &MetadataMap) -> Result<AuthUser, Status> {
        let token = Self::bearer_token(metadata)?;
        let claims = self.keys.verify(token).map_err(|e| {
            tracing::warn!(error = %e, "token validation failed");
            Status::unauthenticated("invalid or expired token")
        })?;

        Ok(AuthUser {
            user_id: claims.user_id,
        })
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let user = self.authenticate(request.metadata())?;
        request.extensions_mut().insert(user);
        Ok(request)
    }
}

/// Handler-side access to the identity stored by [`AuthInterceptor`].
pub trait AuthUserExt {
    fn auth_user(&self) -> Result<AuthUser, Status>;
}

impl<T> AuthUserExt for Request<T> {
    fn auth_user(&self) -> Result<AuthUser, Status> {
        self.extensions()
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| Status::unauthenticated("caller identity missing from request context"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn interceptor() -> AuthInterceptor {
        AuthInterceptor::new(Arc::new(JwtKeys::new("test-secret", Duration::from_secs(3600))))
    }

    fn request_with_token(token: &str) -> Request<()> {
        let mut request = Request::new(());
        let value = format!("Bearer {token}").parse().unwrap();
        request.metadata_mut().insert("authorization", value);
        request
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let mut interceptor = interceptor();
        let status = interceptor.call(Request::new(())).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn malformed_header_is_unauthenticated() {
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert("authorization", "Token abc".parse().unwrap());

        let mut interceptor = interceptor();
        let status = interceptor.call(request).unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn garbage_token_is_unauthenticated() {
        let mut interceptor = interceptor();
        let status = interceptor
            .call(request_with_token("not-a-jwt"))
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[test]
    fn valid_token_injects_identity() {
        let keys = Arc::new(JwtKeys::new("test-secret", Duration::from_secs(3600)));
        let (token, _) = keys.sign(7).unwrap();

        let mut interceptor = AuthInterceptor::new(keys);
        let request = interceptor.call(request_with_token(&token)).unwrap();

        let user = request.auth_user().unwrap();
        assert_eq!(user.user_id, 7);
    }

    #[test]
    fn identity_missing_without_interceptor() {
        let request = Request::new(());
        assert!(request.auth_user().is_err());
    }
}
