//! Error types for the relay agent.
//!
//! Every fallible operation in lapwire returns [`RelayError`]. Errors carry
//! structured context and can report whether retrying makes sense.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: The collector could not be reached or refused the handshake
//! - **Transport Errors**: The WebSocket failed after the channel was established
//! - **Protocol Errors**: The collector sent a packet the agent does not understand
//! - **Telemetry Errors**: Missing fields or mismatched value types in a frame
//! - **Configuration Errors**: Invalid settings supplied at startup
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use lapwire::RelayError;
//!
//! let error = RelayError::connection_failed("collector refused connection");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Failed to connect to collector: {reason}")]
    Connection {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Collector transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unexpected collector packet: {details}")]
    Protocol { details: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Field '{field}' not found in telemetry data")]
    FieldNotFound { field: String },

    #[error("Type conversion error: {details}")]
    TypeConversion { details: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl RelayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Connection { .. } => true,
            RelayError::Transport { .. } => true,
            RelayError::Timeout { .. } => true,
            RelayError::Protocol { .. } => false,
            RelayError::File { .. } => false,
            RelayError::Parse { .. } => false,
            RelayError::FieldNotFound { .. } => true,
            RelayError::TypeConversion { .. } => false,
            RelayError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::Connection { .. } => vec![
                "Check the collector server is running",
                "Verify the server URL and port",
                "Check firewall rules between agent and collector",
            ],
            RelayError::Transport { .. } => vec![
                "Check network stability",
                "Verify the collector has not restarted",
            ],
            RelayError::Protocol { .. } => vec![
                "Verify the collector speaks Socket.IO v4/v5",
                "Check for a proxy rewriting WebSocket frames",
            ],
            RelayError::File { .. } => vec![
                "Check file exists and is readable",
                "Check file permissions",
            ],
            RelayError::Parse { .. } => vec![
                "Check data format compatibility",
                "Verify source data integrity",
            ],
            RelayError::Timeout { .. } => vec![
                "Increase the connect timeout",
                "Verify the collector is responding",
            ],
            RelayError::FieldNotFound { .. } => vec![
                "Wait for the simulator to finish loading the session",
                "Verify field exists in current simulator version",
            ],
            RelayError::TypeConversion { .. } => vec![
                "Check data type compatibility",
                "Verify expected vs actual data types",
            ],
            RelayError::Config { .. } => vec![
                "Review command line flags and environment variables",
                "Check the configuration file for typos",
            ],
        }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        RelayError::File { path, source }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        RelayError::Connection { reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RelayError::Connection { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        RelayError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for protocol errors.
    pub fn protocol(details: impl Into<String>) -> Self {
        RelayError::Protocol { details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        RelayError::Config { reason: reason.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        RelayError::Parse { context: context.into(), details: details.into() }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Parse { context: "JSON payload".to_string(), details: err.to_string() }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::Transport { reason: "WebSocket failure".to_string(), source: Some(Box::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn error_messages_carry_their_context(
            reason in ".*",
            field_name in "\\w+",
            details in ".*"
        ) {
            let connection_msg = RelayError::connection_failed(reason.clone()).to_string();
            prop_assert!(connection_msg.contains(&reason));

            let field_msg = RelayError::FieldNotFound { field: field_name.clone() }.to_string();
            prop_assert!(field_msg.contains(&field_name));

            let conversion_msg = RelayError::TypeConversion { details: details.clone() }.to_string();
            prop_assert!(conversion_msg.contains(&details));
        }
    }

    #[test]
    fn source_chain_is_preserved() {
        let inner = std::io::Error::other("socket reset");
        let error = RelayError::connection_failed_with_source("handshake", Box::new(inner));

        let source = std::error::Error::source(&error).expect("source should be set");
        assert!(source.to_string().contains("socket reset"));
    }

    #[test]
    fn error_traits_validation() {
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<RelayError>();
    }

    #[test]
    fn retry_classification() {
        assert!(RelayError::connection_failed("down").is_retryable());
        assert!(RelayError::transport("reset").is_retryable());
        assert!(RelayError::Timeout { duration: Duration::from_secs(1) }.is_retryable());
        assert!(!RelayError::config("bad url").is_retryable());
        assert!(!RelayError::protocol("garbage").is_retryable());

        for suggestion in RelayError::connection_failed("down").recovery_suggestions() {
            assert!(suggestion.len() > 5);
        }
    }

    #[test]
    fn from_conversions_work() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "script.yaml");
        match RelayError::from(io_err) {
            RelayError::File { source, .. } => assert_eq!(source.to_string(), "script.yaml"),
            other => panic!("Expected File error variant, got {other:?}"),
        }

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(RelayError::from(json_err), RelayError::Parse { .. }));
    }
}
