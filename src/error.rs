//! Error types for alarm provisioning

use std::fmt;

/// Result type alias for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors that can occur while provisioning alarms
#[derive(Debug)]
pub enum ProvisionError {
    /// The run configuration cannot be used (e.g. no usable selection mode)
    InvalidConfig(String),

    /// The configuration file could not be parsed
    ConfigFile(String),

    /// No notification topic matched the configured name
    TopicNotFound(String),

    /// A call to a cloud service failed
    Service {
        /// The operation that failed (e.g. "PutMetricAlarm")
        operation: &'static str,
        /// Description of the failure
        message: String,
    },

    /// A worker task did not complete (panicked or was aborted)
    Worker(String),

    /// I/O error (config file access, etc.)
    Io(std::io::Error),
}

impl ProvisionError {
    pub fn service(operation: &'static str, message: impl ToString) -> Self {
        ProvisionError::Service {
            operation,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            ProvisionError::ConfigFile(msg) => write!(f, "invalid configuration file: {}", msg),
            ProvisionError::TopicNotFound(topic) => {
                write!(f, "notification topic '{}' not found", topic)
            }
            ProvisionError::Service { operation, message } => {
                write!(f, "{} failed: {}", operation, message)
            }
            ProvisionError::Worker(msg) => write!(f, "worker failed: {}", msg),
            ProvisionError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProvisionError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ProvisionError {
    fn from(err: std::io::Error) -> Self {
        ProvisionError::Io(err)
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::ConfigFile(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ProvisionError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProvisionError::Worker(err.to_string())
    }
}
