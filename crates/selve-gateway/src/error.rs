//! Error types for the gateway engine.

use std::path::PathBuf;
use std::time::Duration;

use selve_protocol::{EncodingError, FaultCode, PayloadError, ServiceState};
use thiserror::Error;

/// Why a submitted call did not produce a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No matching frame arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The gateway answered with a fault.
    #[error("gateway rejected the call: {0}")]
    Rejected(FaultCode),

    /// The transport failed while the call was pending.
    #[error("connection to the gateway was lost")]
    ConnectionLost,

    /// The engine shut down before the call resolved.
    #[error("call cancelled by shutdown")]
    Cancelled,

    /// The worker is not running; nothing was written.
    #[error("gateway engine is not running")]
    NotRunning,

    /// The call could not be encoded; nothing was written.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// The response arrived but its payload did not decode.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl CommandError {
    /// Short label for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            CommandError::Timeout(_) => "timeout",
            CommandError::Rejected(_) => "rejected",
            CommandError::ConnectionLost => "connection_lost",
            CommandError::Cancelled => "cancelled",
            CommandError::NotRunning => "not_running",
            CommandError::Encoding(_) => "encoding",
            CommandError::Payload(_) => "payload",
        }
    }
}

/// Failure of the underlying byte stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport closed by peer")]
    Closed,

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "serial")]
    #[error("failed to open serial port {path}: {source}")]
    Serial {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Discovery needs the gateway in `Ready`.
    #[error("gateway is not ready (state {0:?})")]
    NotReady(ServiceState),

    /// The operation has no gateway method for this entity kind.
    #[error("{operation} is not supported for {kind}")]
    Unsupported {
        operation: &'static str,
        kind: &'static str,
    },
}

impl From<EncodingError> for GatewayError {
    fn from(e: EncodingError) -> Self {
        GatewayError::Command(CommandError::Encoding(e))
    }
}

impl From<PayloadError> for GatewayError {
    fn from(e: PayloadError) -> Self {
        GatewayError::Command(CommandError::Payload(e))
    }
}

impl GatewayError {
    /// The command-level cause, if any.
    pub fn as_command(&self) -> Option<&CommandError> {
        match self {
            GatewayError::Command(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_display() {
        let err = CommandError::Rejected(FaultCode::from(3));
        assert!(err.to_string().starts_with("gateway rejected the call"));
        assert_eq!(err.outcome(), "rejected");
        assert_eq!(CommandError::Timeout(Duration::from_millis(50)).outcome(), "timeout");
    }

    #[test]
    fn test_encoding_error_lifts_into_gateway_error() {
        let err: GatewayError = EncodingError::IdOutOfRange { id: 70, max: 63 }.into();
        assert!(matches!(err.as_command(), Some(CommandError::Encoding(_))));
    }
}
