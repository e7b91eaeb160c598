//! Database backup and restore.
//!
//! [`coordinator::BackupCoordinator`] reports backup status, lists stored
//! artifacts, exports the database through a one-shot cluster job and runs
//! the two restore paths.

pub mod coordinator;
pub mod export;
pub mod object_store;
pub mod restore;

#[cfg(test)]
mod mocks;

pub use coordinator::{BackupAction, BackupCoordinator, BackupResult, BackupStatus};
pub use object_store::{AzureBlobStore, BackupArtifact, BlobLocation, ObjectStore};
pub use restore::{RestoreMode, RestoreRequest, RestoreResult};
