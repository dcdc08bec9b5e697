use std::path::PathBuf;

use thiserror::Error;

use spl_model::{ErrorKind, OperationFailure};
use spl_store::StoreError;
use spl_xml::ExportError;

use crate::jobs::OperationId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("operation {0} not found")]
    UnknownOperation(OperationId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error("failed to {operation} file: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("the engine must be started inside a tokio runtime")]
    NoRuntime,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownOperation(_) => ErrorKind::EntityNotFound,
            Self::Store(err) => err.kind(),
            Self::Export(_) => ErrorKind::Malformed,
            Self::Io { .. } | Self::Config { .. } | Self::NoRuntime => ErrorKind::Storage,
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::UnknownOperation(_) => {
                Some("Results are purged after the retention window; resubmit the operation")
            }
            Self::Store(err) => err.suggestion(),
            Self::Config { .. } => Some("Check the configuration file against the documented keys"),
            Self::Io { .. } => Some("Check that the path exists and is readable"),
            Self::Export(_) | Self::NoRuntime => None,
        }
    }

    pub fn to_failure(&self) -> OperationFailure {
        OperationFailure::new(self.kind(), self.to_string()).with_suggestion(self.suggestion())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
