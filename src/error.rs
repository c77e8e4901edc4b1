//! Error types for the billing core
//!
//! Recoverable gateway errors (`ResumeFailed`, `TokenValidationFailed`) are
//! handled inside the transition that produced them. Everything else ends
//! up as a [`BillingError`] returned to the caller.

use serde::{Deserialize, Serialize};

use crate::session::SessionKind;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BillingError>;

/// Fatal errors surfaced by the session state machine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BillingError {
    /// A caller contract or gateway consistency rule was broken
    #[error("billing invariant violated: {0}")]
    InvariantViolation(String),

    /// The gateway reported an error code this core does not recognize
    #[error("unknown gateway error during {call}: {message}")]
    UnknownGatewayError { call: String, message: String },

    /// The controller task is gone and can no longer accept events
    #[error("billing controller is closed")]
    ControllerClosed,
}

/// Error codes reported by the metering gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    /// The backend could not resume a paused session
    ResumeFailed,
    /// The access credential was rejected
    TokenValidationFailed,
    /// Anything else, including a missing code
    Unrecognized(Option<String>),
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayErrorCode::ResumeFailed => write!(f, "RESUME_FAILED"),
            GatewayErrorCode::TokenValidationFailed => write!(f, "TOKEN_VALIDATION_FAILED"),
            GatewayErrorCode::Unrecognized(Some(code)) => write!(f, "{}", code),
            GatewayErrorCode::Unrecognized(None) => write!(f, "<none>"),
        }
    }
}

/// An error reported asynchronously by the gateway
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
}

impl GatewayError {
    /// An error with the given code and backend message
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn resume_failed(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ResumeFailed, message)
    }

    pub fn token_validation_failed(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::TokenValidationFailed, message)
    }

    /// Whether this error is handled locally instead of being raised
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.code,
            GatewayErrorCode::ResumeFailed | GatewayErrorCode::TokenValidationFailed
        )
    }
}

impl BillingError {
    pub(crate) fn more_than_one_session(statuses: &[(SessionKind, crate::session::SessionStatus)]) -> Self {
        BillingError::InvariantViolation(format!(
            "more than one session is running or paused: {:?}",
            statuses
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_codes() {
        assert!(GatewayError::resume_failed("x").is_recoverable());
        assert!(GatewayError::token_validation_failed("x").is_recoverable());
        assert!(!GatewayError::new(GatewayErrorCode::Unrecognized(None), "x").is_recoverable());
    }

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::new(GatewayErrorCode::Unrecognized(Some("QUOTA".into())), "over limit");
        assert_eq!(err.to_string(), "QUOTA: over limit");
    }
}
