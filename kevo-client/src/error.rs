/// Error types for the Kevo client
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Cannot write in a read-only transaction")]
    ReadOnlyViolation,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Commit conflict: {0}")]
    CommitConflict(String),

    /// The commit reply never arrived; the writes may or may not be applied
    #[error("Commit outcome unknown: {0}")]
    CommitOutcomeUnknown(String),

    #[error("Remote error ({code}): {message}")]
    Remote { code: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub(crate) fn not_connected() -> Self {
        ClientError::Connection("not connected".to_string())
    }

    pub(crate) fn finished() -> Self {
        ClientError::InvalidState("transaction already finished".to_string())
    }

    pub(crate) fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        ClientError::Remote {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns a stable error code for this error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Connection(_) => "CONNECTION_ERROR",
            ClientError::Timeout(_) => "TIMEOUT",
            ClientError::ReadOnlyViolation => "READ_ONLY_VIOLATION",
            ClientError::InvalidState(_) => "INVALID_STATE",
            ClientError::CommitConflict(_) => "COMMIT_CONFLICT",
            ClientError::CommitOutcomeUnknown(_) => "COMMIT_OUTCOME_UNKNOWN",
            ClientError::Remote { .. } => "REMOTE_ERROR",
            ClientError::InvalidArgument(_) => "INVALID_ARGUMENT",
        }
    }

    /// Returns true if re-running the whole operation may succeed.
    ///
    /// Client-side precondition failures never are: repeating them fails the
    /// same way without reaching the server.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Connection(_) => true,
            ClientError::Timeout(_) => true,
            ClientError::CommitConflict(_) => true,
            ClientError::Remote { code, .. } => {
                code == "Unavailable" || code == "ResourceExhausted"
            }

            // Re-running the transaction could apply it twice
            ClientError::CommitOutcomeUnknown(_) => false,
            ClientError::ReadOnlyViolation => false,
            ClientError::InvalidState(_) => false,
            ClientError::InvalidArgument(_) => false,
        }
    }
}

/// Convert gRPC Status to ClientError
impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        let msg = status.message().to_string();

        match status.code() {
            Code::Unavailable => ClientError::Connection(msg),
            Code::DeadlineExceeded => ClientError::Timeout(msg),
            Code::Aborted => ClientError::CommitConflict(msg),
            code => ClientError::remote(format!("{:?}", code), msg),
        }
    }
}

impl From<tonic::transport::Error> for ClientError {
    fn from(err: tonic::transport::Error) -> Self {
        ClientError::Connection(err.to_string())
    }
}
