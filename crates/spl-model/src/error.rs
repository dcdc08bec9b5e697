use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid set id: {0:?}")]
    InvalidSetId(String),
    #[error("invalid document id: {0:?}")]
    InvalidDocumentUid(String),
    #[error("invalid surrogate handle: {0:?}")]
    InvalidHandle(String),
    #[error("unknown entity kind: {0}")]
    UnknownEntityKind(String),
}

/// Machine-readable error classification shared by every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaViolation,
    ReferentialIntegrity,
    VersionConflict,
    EntityNotFound,
    Cancelled,
    Malformed,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaViolation => "schema_violation",
            ErrorKind::ReferentialIntegrity => "referential_integrity",
            ErrorKind::VersionConflict => "version_conflict",
            ErrorKind::EntityNotFound => "entity_not_found",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Storage => "storage",
        }
    }

    /// Only schema violations let an import continue.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::SchemaViolation)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the source an issue was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Element path from the root, e.g. `/document/component/structuredBody/component[2]/section`.
    pub path: String,
    /// Byte offset in the payload, when known.
    pub offset: Option<u64>,
}

impl Location {
    pub fn new(path: impl Into<String>, offset: Option<u64>) -> Self {
        Self {
            path: path.into(),
            offset,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} (byte {offset})", self.path),
            None => f.write_str(&self.path),
        }
    }
}

/// Cardinality or reference rule that a violation breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationRule {
    MissingDosageForm,
    MultipleDosageForms,
    MissingRoute,
    MissingSubstanceCode,
    MissingSectionCode,
    MissingPackageIdentifier,
    InvalidEffectiveTime,
    UnknownIngredientClass,
    /// Product identifier wrapped with a class other than `IDENT`.
    UnsupportedIdentifierClass,
    UnresolvedMoiety,
    UnresolvedInteractionTarget,
    UnresolvedContraindicationTarget,
}

impl ViolationRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationRule::MissingDosageForm => "missing_dosage_form",
            ViolationRule::MultipleDosageForms => "multiple_dosage_forms",
            ViolationRule::MissingRoute => "missing_route",
            ViolationRule::MissingSubstanceCode => "missing_substance_code",
            ViolationRule::MissingSectionCode => "missing_section_code",
            ViolationRule::MissingPackageIdentifier => "missing_package_identifier",
            ViolationRule::InvalidEffectiveTime => "invalid_effective_time",
            ViolationRule::UnknownIngredientClass => "unknown_ingredient_class",
            ViolationRule::UnsupportedIdentifierClass => "unsupported_identifier_class",
            ViolationRule::UnresolvedMoiety => "unresolved_moiety",
            ViolationRule::UnresolvedInteractionTarget => "unresolved_interaction_target",
            ViolationRule::UnresolvedContraindicationTarget => {
                "unresolved_contraindication_target"
            }
        }
    }

    /// Violations found by the cross-reference pass.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            ViolationRule::UnresolvedMoiety
                | ViolationRule::UnresolvedInteractionTarget
                | ViolationRule::UnresolvedContraindicationTarget
        )
    }
}

/// A recoverable schema problem recorded against an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub rule: ViolationRule,
    pub message: String,
    pub location: Location,
}

impl SchemaViolation {
    pub fn new(rule: ViolationRule, message: impl Into<String>, location: Location) -> Self {
        Self {
            rule,
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} at {}", self.rule.as_str(), self.message, self.location)
    }
}

/// Terminal failure of an operation, as reported through progress polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
    pub suggestion: Option<String>,
}

impl OperationFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled by caller")
    }

    #[must_use]
    pub fn at(mut self, location: Option<Location>) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: Option<&str>) -> Self {
        self.suggestion = suggestion.map(str::to_string);
        self
    }
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_schema_violations_are_recoverable() {
        assert!(!ErrorKind::SchemaViolation.is_fatal());
        assert!(ErrorKind::VersionConflict.is_fatal());
        assert!(ErrorKind::Cancelled.is_fatal());
    }

    #[test]
    fn failure_display_includes_location() {
        let failure = OperationFailure::new(ErrorKind::ReferentialIntegrity, "package cycle")
            .at(Some(Location::new("/document/component", Some(120))));
        assert_eq!(
            failure.to_string(),
            "referential_integrity: package cycle at /document/component (byte 120)"
        );
    }
}
