//! Storage error types for the object layer abstraction.
//!
//! "Document absent" is deliberately not an error: reads return `Ok(None)`
//! for missing documents, so every variant here is a real fault.

use std::fmt;

/// Errors that can occur during object layer operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The bucket does not exist.
    #[error("Bucket not found: {bucket}")]
    BucketNotFound {
        /// Name of the missing bucket.
        bucket: String,
    },

    /// A disk backing the object layer failed.
    #[error("Faulty disk: disk {disk}")]
    FaultyDisk {
        /// Index of the failing disk.
        disk: usize,
    },

    /// Not enough disks answered a read to satisfy quorum.
    #[error("Read quorum not met: {message}")]
    ReadQuorum {
        /// Description of the quorum failure.
        message: String,
    },

    /// Not enough disks acknowledged a write to satisfy quorum.
    #[error("Write quorum not met: {message}")]
    WriteQuorum {
        /// Description of the quorum failure.
        message: String,
    },

    /// An I/O error occurred on the backend.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `BucketNotFound` error.
    #[must_use]
    pub fn bucket_not_found(bucket: impl Into<String>) -> Self {
        Self::BucketNotFound {
            bucket: bucket.into(),
        }
    }

    /// Creates a new `FaultyDisk` error.
    #[must_use]
    pub fn faulty_disk(disk: usize) -> Self {
        Self::FaultyDisk { disk }
    }

    /// Creates a new `ReadQuorum` error.
    #[must_use]
    pub fn read_quorum(message: impl Into<String>) -> Self {
        Self::ReadQuorum {
            message: message.into(),
        }
    }

    /// Creates a new `WriteQuorum` error.
    #[must_use]
    pub fn write_quorum(message: impl Into<String>) -> Self {
        Self::WriteQuorum {
            message: message.into(),
        }
    }

    /// Creates a new `Io` error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the bucket does not exist.
    #[must_use]
    pub fn is_bucket_not_found(&self) -> bool {
        matches!(self, Self::BucketNotFound { .. })
    }

    /// Returns `true` for faults that may clear up on retry (disk or quorum).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::FaultyDisk { .. } | Self::ReadQuorum { .. } | Self::WriteQuorum { .. }
        )
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BucketNotFound { .. } => ErrorCategory::NotFound,
            Self::FaultyDisk { .. } | Self::Io { .. } => ErrorCategory::Disk,
            Self::ReadQuorum { .. } | Self::WriteQuorum { .. } => ErrorCategory::Quorum,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bucket not found.
    NotFound,
    /// Disk or I/O failure.
    Disk,
    /// Quorum could not be reached.
    Quorum,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Disk => write!(f, "disk"),
            Self::Quorum => write!(f, "quorum"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::bucket_not_found("photos");
        assert_eq!(err.to_string(), "Bucket not found: photos");

        let err = StorageError::faulty_disk(3);
        assert_eq!(err.to_string(), "Faulty disk: disk 3");

        let err = StorageError::read_quorum("2 of 4 disks online");
        assert_eq!(err.to_string(), "Read quorum not met: 2 of 4 disks online");
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::bucket_not_found("b").is_bucket_not_found());
        assert!(!StorageError::faulty_disk(1).is_bucket_not_found());

        assert!(StorageError::faulty_disk(1).is_transient());
        assert!(StorageError::write_quorum("x").is_transient());
        assert!(!StorageError::internal("x").is_transient());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::bucket_not_found("b").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(StorageError::faulty_disk(0).category(), ErrorCategory::Disk);
        assert_eq!(
            StorageError::read_quorum("x").category(),
            ErrorCategory::Quorum
        );
        assert_eq!(ErrorCategory::Quorum.to_string(), "quorum");
    }
}
