use thiserror::Error;
use tonic::Status;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("internal server error")]
    Internal,
}

impl From<AppError> for Status {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Unauthenticated(msg) => Status::unauthenticated(msg),
            AppError::PermissionDenied(msg) => Status::permission_denied(msg),
            AppError::InvalidArgument(msg) => Status::invalid_argument(msg),
            AppError::NotFound(msg) => Status::not_found(msg),
            AppError::AlreadyExists(msg) => Status::already_exists(msg),
            AppError::FailedPrecondition(msg) => Status::failed_precondition(msg),
            // Server-side failures are redacted; details go to the logs only.
            AppError::Database(e) => {
                tracing::error!(error = %e, "database failure");
                Status::internal("internal server error")
            }
            AppError::Broker(e) => {
                tracing::error!(error = %e, "broker failure");
                Status::unavailable("message broker unavailable")
            }
            AppError::Config(msg) | AppError::StartServer(msg) => {
                tracing::error!(error = %msg, "startup failure surfaced in request path");
                Status::internal("internal server error")
            }
            AppError::Internal => Status::internal("internal server error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_stable_codes() {
        let cases = [
            (
                Status::from(AppError::Unauthenticated("no token".into())),
                tonic::Code::Unauthenticated,
            ),
            (
                Status::from(AppError::PermissionDenied("not recipient".into())),
                tonic::Code::PermissionDenied,
            ),
            (
                Status::from(AppError::InvalidArgument("empty content".into())),
                tonic::Code::InvalidArgument,
            ),
            (
                Status::from(AppError::NotFound("user".into())),
                tonic::Code::NotFound,
            ),
            (
                Status::from(AppError::AlreadyExists("chat".into())),
                tonic::Code::AlreadyExists,
            ),
            (
                Status::from(AppError::FailedPrecondition("initiated by peer".into())),
                tonic::Code::FailedPrecondition,
            ),
        ];
        for (status, code) in cases {
            assert_eq!(status.code(), code);
        }
    }

    #[test]
    fn server_errors_are_redacted() {
        let status = Status::from(AppError::Database(sqlx::Error::PoolClosed));
        assert_eq!(status.code(), tonic::Code::Internal);
        assert_eq!(status.message(), "internal server error");

        let status = Status::from(AppError::Internal);
        assert_eq!(status.message(), "internal server error");
    }
}
