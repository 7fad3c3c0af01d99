//! Unified error types for the gateway.
//!
//! Rejection codes:
//! - VALID_001-003: Parse, size, and schema rejections
//! - RATE_001-002: Rate limit rejections
//! - QUEUE_001: Backpressure drops

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why an inbound message was not forwarded to the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCode {
    /// VALID_001: Payload is not valid JSON
    InvalidFormat,
    /// VALID_002: Event exceeds the size limit
    EventTooLarge,
    /// VALID_003: Event failed schema or semantic checks
    SchemaViolation,
    /// RATE_001: Client exceeded its admission rate
    RateLimited,
    /// RATE_002: Client identity failed validation
    InvalidClient,
    /// QUEUE_001: Aggregator intake is full
    QueueFull,
}

impl RejectionCode {
    /// Get the code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "VALID_001",
            Self::EventTooLarge => "VALID_002",
            Self::SchemaViolation => "VALID_003",
            Self::RateLimited => "RATE_001",
            Self::InvalidClient => "RATE_002",
            Self::QueueFull => "QUEUE_001",
        }
    }

    /// Short machine-readable reason used in acknowledgement frames.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::EventTooLarge => "event_too_large",
            Self::SchemaViolation => "schema_violation",
            Self::RateLimited => "rate_limited",
            Self::InvalidClient => "invalid_client",
            Self::QueueFull => "queue_full",
        }
    }
}

/// Unified error type for the gateway.
#[derive(Debug, Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid event type: {0}")]
    InvalidEventType(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Limits {
        #[validate(range(min = 1))]
        size: u32,
    }

    #[test]
    fn test_validation_errors_become_config_errors() {
        let err: Error = Limits { size: 0 }.validate().unwrap_err().into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().starts_with("invalid configuration"));
    }

    #[test]
    fn test_rejection_codes_are_stable() {
        assert_eq!(RejectionCode::EventTooLarge.code(), "VALID_002");
        assert_eq!(RejectionCode::QueueFull.reason(), "queue_full");
    }
}
