//! Error types for SPL import and export.

use spl_model::{ErrorKind, Location, OperationFailure};
use thiserror::Error;

/// Fatal import failure. Recoverable problems are collected as
/// [`spl_model::SchemaViolation`]s instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ImportError {
    /// The payload is not well-formed XML.
    #[error("malformed XML at {location}: {message}")]
    Malformed { message: String, location: Location },

    /// A header element that identifies the document is absent.
    #[error("document is missing required element {element}")]
    MissingHeader {
        element: &'static str,
        location: Location,
    },

    /// The graph would contain a dangling or cyclic reference.
    #[error("referential integrity violated at {location}: {message}")]
    ReferentialIntegrity { message: String, location: Location },

    /// The caller cancelled the import.
    #[error("import cancelled")]
    Cancelled,
}

impl ImportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed { .. } | Self::MissingHeader { .. } => ErrorKind::Malformed,
            Self::ReferentialIntegrity { .. } => ErrorKind::ReferentialIntegrity,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::Malformed { location, .. }
            | Self::MissingHeader { location, .. }
            | Self::ReferentialIntegrity { location, .. } => Some(location),
            Self::Cancelled => None,
        }
    }

    /// Get a user-friendly suggestion for fixing this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Malformed { .. } => Some("Check that the payload is a complete, well-formed XML file."),
            Self::MissingHeader { .. } => {
                Some("SPL documents must declare id, setId and versionNumber.")
            }
            Self::ReferentialIntegrity { .. } => Some(
                "Check package codes and section ids; each must be unique along its branch.",
            ),
            Self::Cancelled => None,
        }
    }

    pub fn to_failure(&self) -> OperationFailure {
        OperationFailure::new(self.kind(), self.to_string())
            .at(self.location().cloned())
            .with_suggestion(self.suggestion())
    }
}

/// Export failure. The graph itself is always serializable, so these are
/// infrastructure errors from the underlying writer.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("generated XML is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}
