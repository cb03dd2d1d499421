//! # octostore-storage
//!
//! Object layer abstraction for OctoStore subsystems.
//!
//! The erasure-coded object engine lives elsewhere; subsystems such as the
//! event notifier only need to read and write small per-bucket documents and
//! enumerate buckets. This crate defines that contract ([`ObjectLayer`]),
//! its error type, and two implementations:
//!
//! - [`InMemoryObjectLayer`]: a map-backed layer for tests and single-process use
//! - [`FaultyObjectLayer`]: a wrapper that injects storage faults on chosen calls

mod error;
pub mod faulty;
mod memory;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use faulty::FaultyObjectLayer;
pub use memory::InMemoryObjectLayer;
pub use traits::ObjectLayer;

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Type alias for a shared object layer trait object.
pub type DynObjectLayer = std::sync::Arc<dyn ObjectLayer>;
