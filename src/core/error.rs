use std::fmt;
use std::io;
use thiserror::Error;

/// One failed sub-request of a parallel fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutFailure {
    /// Zone or tile index the sub-request was addressing
    pub index: usize,
    /// Rendered error of that sub-request
    pub error: String,
}

impl fmt::Display for FanOutFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: {}", self.index, self.error)
    }
}

fn render_failures(failures: &[FanOutFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Custom error types for the LAN client
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Field `{field}` is {len} bytes long, at most {max} allowed")]
    PayloadTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid value for `{field}`: {reason}")]
    InvalidFieldValue { field: &'static str, reason: String },

    #[error("No response from {target} to {operation} after {attempts} attempt(s)")]
    NoResponse {
        target: String,
        operation: String,
        attempts: u32,
    },

    #[error("{} sub-request(s) failed: {}", .failures.len(), render_failures(.failures))]
    AggregateFanOutFailure { failures: Vec<FanOutFailure> },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new malformed frame error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedFrame(msg.into())
    }

    /// Creates a new invalid field value error
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidFieldValue {
            field,
            reason: reason.into(),
        }
    }

    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new network error
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Whether this error came from exhausting the retry budget
    pub fn is_no_response(&self) -> bool {
        matches!(self, Error::NoResponse { .. })
    }

    /// Indices named by an aggregate fan-out failure, empty otherwise
    pub fn failed_indices(&self) -> Vec<usize> {
        match self {
            Error::AggregateFanOutFailure { failures } => {
                failures.iter().map(|f| f.index).collect()
            }
            _ => Vec::new(),
        }
    }
}
