use serde::{Deserialize, Serialize};

/// LOINC, used for document types and section codes.
pub const LOINC_SYSTEM: &str = "2.16.840.1.113883.6.1";

/// FDA Unique Ingredient Identifier (UNII).
pub const UNII_SYSTEM: &str = "2.16.840.1.113883.4.9";

/// National Drug Code.
pub const NDC_SYSTEM: &str = "2.16.840.1.113883.6.69";

/// FDA SPL terminology (dosage forms, routes, marketing categories).
pub const FDA_SPL_SYSTEM: &str = "2.16.840.1.113883.3.26.1.1";

/// LOINC code of the product data elements section.
pub const PRODUCT_DATA_SECTION: &str = "48780-1";

/// LOINC code of the indications and usage section.
pub const INDICATIONS_SECTION: &str = "34067-9";

/// A coded value as it appears on a `code`-like element.
///
/// Attributes are kept verbatim so that export reproduces exactly what was
/// imported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Code {
    pub code: String,
    pub code_system: Option<String>,
    pub display_name: Option<String>,
}

impl Code {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.code_system = Some(system.into());
        self
    }

    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display_name = Some(display.into());
        self
    }

    /// Label for summaries: display name when present, otherwise the code.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.code)
    }
}

/// A physical quantity (`value` + optional `unit`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    pub value: String,
    pub unit: Option<String>,
}

impl Quantity {
    pub fn new(value: impl Into<String>, unit: Option<&str>) -> Self {
        Self {
            value: value.into(),
            unit: unit.map(str::to_string),
        }
    }
}

/// Numerator over denominator, used for strengths and package quantities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: Option<Quantity>,
    pub denominator: Option<Quantity>,
}

impl Ratio {
    pub fn is_empty(&self) -> bool {
        self.numerator.is_none() && self.denominator.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_prefers_display_name() {
        let code = Code::new("C42998").with_display("TABLET");
        assert_eq!(code.label(), "TABLET");
        assert_eq!(Code::new("C42998").label(), "C42998");
    }

    #[test]
    fn empty_ratio() {
        assert!(Ratio::default().is_empty());
        let ratio = Ratio {
            numerator: Some(Quantity::new("250", Some("mg"))),
            denominator: None,
        };
        assert!(!ratio.is_empty());
    }
}
