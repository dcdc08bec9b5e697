use thiserror::Error;

use spl_model::{ErrorKind, Location, OperationFailure};
use spl_store::StoreError;
use spl_xml::{ExportError, ImportError};

/// Failure to produce a fidelity report.
///
/// Differences between the documents are never errors; they are the report.
#[derive(Debug, Error)]
pub enum CompareError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to regenerate document: {0}")]
    Export(#[from] ExportError),

    #[error("baseline document could not be read: {0}")]
    Baseline(#[source] ImportError),

    #[error("regenerated document could not be read: {0}")]
    Regenerated(#[source] ImportError),

    #[error("comparison cancelled")]
    Cancelled,
}

impl CompareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Store(err) => err.kind(),
            Self::Export(_) => ErrorKind::Malformed,
            Self::Baseline(err) | Self::Regenerated(err) => err.kind(),
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Baseline(err) | Self::Regenerated(err) => err.location(),
            _ => None,
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Store(err) => err.suggestion(),
            Self::Baseline(err) => err.suggestion(),
            Self::Export(_) | Self::Regenerated(_) | Self::Cancelled => None,
        }
    }

    pub fn to_failure(&self) -> OperationFailure {
        OperationFailure::new(self.kind(), self.to_string())
            .at(self.location().cloned())
            .with_suggestion(self.suggestion())
    }
}
