//! Store error types.
//!
//! Every failure maps onto an [`ErrorKind`] so callers can report it the same
//! way as import and comparison failures.

use std::path::PathBuf;

use thiserror::Error;

use spl_model::{EntityKind, ErrorKind, OperationFailure, SetId};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The batch carries a version that cannot follow what is stored.
    #[error("version conflict for set {set_id} version {version}: {reason}")]
    VersionConflict {
        set_id: SetId,
        version: u32,
        reason: String,
    },

    #[error("{kind} {id} not found")]
    EntityNotFound { kind: EntityKind, id: String },

    #[error("document set {0} not found")]
    SetNotFound(SetId),

    #[error("invalid {kind} id {value:?}")]
    InvalidId { kind: EntityKind, value: String },

    /// Writes that would leave dependent rows without a parent.
    #[error("refusing to {operation} {kind}: {reason}")]
    RefusedWrite {
        operation: &'static str,
        kind: EntityKind,
        reason: String,
    },

    #[error("operation cancelled before commit")]
    Cancelled,

    #[error("failed to {operation} file: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot at {path}: {reason}")]
    InvalidSnapshot { path: PathBuf, reason: String },

    #[error("failed to serialize store data")]
    Serialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to deserialize store data")]
    Deserialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to complete snapshot write")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VersionConflict { .. } => ErrorKind::VersionConflict,
            Self::EntityNotFound { .. } | Self::SetNotFound(_) | Self::InvalidId { .. } => {
                ErrorKind::EntityNotFound
            }
            Self::RefusedWrite { .. } => ErrorKind::ReferentialIntegrity,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Io { .. }
            | Self::InvalidSnapshot { .. }
            | Self::Serialization { .. }
            | Self::Deserialization { .. }
            | Self::AtomicWriteFailed { .. } => ErrorKind::Storage,
        }
    }

    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        Self::EntityNotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Get a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Io {
                operation, path, ..
            } => format!("Could not {operation} the file at {}", path.display()),
            Self::AtomicWriteFailed { target_path, .. } => format!(
                "Could not save the snapshot to {}. Please check disk space and permissions.",
                target_path.display()
            ),
            Self::Deserialization { .. } => {
                "The snapshot could not be read. The file may be corrupted.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::VersionConflict { .. } => Some(
                "Import a higher versionNumber for this set, or re-import identical content",
            ),
            Self::EntityNotFound { .. } | Self::SetNotFound(_) => {
                Some("List stored document sets to find a valid id")
            }
            Self::InvalidId { .. } => Some("Surrogate ids are 32 hexadecimal characters"),
            Self::RefusedWrite { .. } => Some("Delete the owning document instead"),
            Self::Io { .. } | Self::AtomicWriteFailed { .. } => {
                Some("Check that the path exists and you have the required permissions")
            }
            Self::InvalidSnapshot { .. } | Self::Deserialization { .. } => {
                Some("Restore the snapshot from a backup or start with an empty store")
            }
            Self::Cancelled | Self::Serialization { .. } => None,
        }
    }

    pub fn to_failure(&self) -> OperationFailure {
        OperationFailure::new(self.kind(), self.to_string()).with_suggestion(self.suggestion())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
