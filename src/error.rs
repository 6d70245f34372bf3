//! Error types for the gateway cache layer
//!
//! Cache operations are total and have no error type. Everything that can fail
//! comes from the device gateway or from configuration.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Gateway Error Enum ==
/// Failure reported by (or on the way to) the hotspot device control API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The device could not be reached
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the allotted time
    #[error("Gateway call timed out after {0:?}")]
    Timeout(Duration),

    /// The device accepted the connection but refused the operation
    #[error("Gateway rejected operation: {0}")]
    Rejected(String),

    /// The requested resource does not exist on the device
    #[error("Not found on gateway: {0}")]
    NotFound(String),
}

impl GatewayError {
    /// True for the unavailable class (unreachable or timed out).
    ///
    /// Rejections are never transient and must not be retried automatically.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Timeout(_))
    }
}

/// Convenience Result type for device gateway calls.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

// == Service Error Enum ==
/// Unified error type for the service facade and admin API.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Device gateway failure, propagated unchanged
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Invalid cache or batch configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The batch queue no longer accepts work
    #[error("Batch queue is shut down")]
    QueueClosed,
}

// == IntoResponse Implementation ==
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Gateway(GatewayError::Unavailable(_))
            | ServiceError::Gateway(GatewayError::Timeout(_))
            | ServiceError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Gateway(GatewayError::Rejected(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Gateway(GatewayError::NotFound(_)) => StatusCode::NOT_FOUND,
            ServiceError::Configuration(_) | ServiceError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the service layer.
pub type Result<T> = std::result::Result<T, ServiceError>;
