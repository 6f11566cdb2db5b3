/// Crate-wide error taxonomy.
///
/// Variants line up with the `error.kind` values the control plane exposes
/// to clients (see the HTTP status mapping in `impl ResponseError`).
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("wallet restricted: {0}")]
    Restricted(String),

    #[error("already running")]
    AlreadyRunning { job_id: String },

    #[error("skipped: {0}")]
    Skipped(String),

    #[error("external provider unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("rate limited by external provider")]
    RateLimited,

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::NotFound(_) => "not_found",
            EngineError::Restricted(_) => "restricted",
            EngineError::AlreadyRunning { .. } => "already_running",
            EngineError::Skipped(_) => "skipped",
            EngineError::ExternalUnavailable(_) => "external_unavailable",
            EngineError::RateLimited => "rate_limited",
            EngineError::Timeout(_) => "timeout",
            EngineError::Database(_) | EngineError::Lock(_) | EngineError::Queue(_) => "internal",
            EngineError::Internal(_) => "internal",
        }
    }

    /// Transient classes feed the in-job retry loop (propagation policy).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::ExternalUnavailable(_)
                | EngineError::RateLimited
                | EngineError::Database(_)
                | EngineError::Lock(_)
                | EngineError::Queue(_)
        )
    }
}

impl ResponseError for EngineError {
    fn status_code(&self) -> StatusCode {
        match self {
            EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Restricted(_) => StatusCode::FORBIDDEN,
            EngineError::AlreadyRunning { .. } => StatusCode::CONFLICT,
            EngineError::Skipped(_) => StatusCode::OK,
            EngineError::ExternalUnavailable(_) | EngineError::RateLimited => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Database(_) | EngineError::Lock(_) | EngineError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        if let EngineError::AlreadyRunning { job_id } = self {
            body["error"]["jobId"] = json!(job_id);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classes_are_not_retried() {
        assert!(!EngineError::InvalidInput("bad".into()).is_transient());
        assert!(!EngineError::Timeout("slow".into()).is_transient());
        assert!(!EngineError::NotFound("w".into()).is_transient());
        assert!(!EngineError::Restricted("w".into()).is_transient());
        assert!(!EngineError::Internal("boom".into()).is_transient());
    }

    #[test]
    fn transient_classes_feed_the_retry_loop() {
        assert!(EngineError::ExternalUnavailable("down".into()).is_transient());
        assert!(EngineError::RateLimited.is_transient());
        assert!(EngineError::Database("conn reset".into()).is_transient());
        assert!(EngineError::Lock("redis down".into()).is_transient());
        assert!(EngineError::Queue("claim failed".into()).is_transient());
    }
}

impl From<tokio_postgres::Error> for EngineError {
    fn from(e: tokio_postgres::Error) -> Self {
        EngineError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for EngineError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        EngineError::Database(e.to_string())
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(e: redis::RedisError) -> Self {
        EngineError::Lock(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Internal(format!("serialization error: {e}"))
    }
}
