use octostore_storage::StorageError;
use thiserror::Error;

/// Result type for notifier operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage fault, passed through unchanged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Unable to initialize {kind} target for account {account_id}: {source}")]
    TargetValidation {
        kind: String,
        account_id: String,
        #[source]
        source: TargetError,
    },

    #[error("Malformed document {path} in bucket {bucket}: {source}")]
    MalformedDocument {
        bucket: String,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Peer error: {0}")]
    Peer(#[from] PeerError),
}

impl NotifyError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// The storage fault behind this error, if it is one.
    pub fn storage_cause(&self) -> Option<&StorageError> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors raised by external delivery targets.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Invalid target configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

impl From<serde_json::Error> for TargetError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Errors raised by cross-node calls.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Peer responded with {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timed out calling {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for PeerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
