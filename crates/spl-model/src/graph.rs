//! Entity graph of one parsed SPL document.
//!
//! The graph is identifier-free: vectors carry the document order, and the
//! store assigns surrogate ids and explicit sequence numbers when the graph
//! is committed. Two graphs compare equal exactly when they describe the
//! same document content.

use serde::{Deserialize, Serialize};

use crate::code::{Code, Ratio};
use crate::fragment::XmlNode;
use crate::ids::{DocumentUid, SetId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentGraph {
    pub header: DocumentHeader,
    pub labeler: Option<Labeler>,
    pub sections: Vec<Section>,
}

impl DocumentGraph {
    pub fn new(header: DocumentHeader) -> Self {
        Self {
            header,
            labeler: None,
            sections: Vec::new(),
        }
    }

    /// All sections, depth-first in document order.
    pub fn walk_sections(&self) -> Vec<&Section> {
        let mut out = Vec::new();
        for section in &self.sections {
            push_sections(section, &mut out);
        }
        out
    }

    /// All products, in document order.
    pub fn products(&self) -> Vec<&Product> {
        self.walk_sections()
            .into_iter()
            .flat_map(|section| section.products.iter())
            .collect()
    }

    /// Organizations referenced by this document with their role.
    pub fn organizations(&self) -> Vec<(OrganizationRole, &Organization)> {
        let mut out = Vec::new();
        if let Some(labeler) = &self.labeler {
            out.push((OrganizationRole::Labeler, &labeler.organization));
            if let Some(registrant) = &labeler.registrant {
                out.push((OrganizationRole::Registrant, &registrant.organization));
                for establishment in &registrant.establishments {
                    out.push((OrganizationRole::Establishment, &establishment.organization));
                }
            }
        }
        out
    }
}

fn push_sections<'a>(section: &'a Section, out: &mut Vec<&'a Section>) {
    out.push(section);
    for child in &section.subsections {
        push_sections(child, out);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub document_id: DocumentUid,
    pub set_id: SetId,
    pub version: u32,
    pub document_type: Option<Code>,
    pub title: Option<String>,
    pub effective_time: Option<String>,
    /// `xsi:schemaLocation` of the root element, re-emitted on export.
    pub schema_location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganizationRole {
    Labeler,
    Registrant,
    Establishment,
}

impl OrganizationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationRole::Labeler => "labeler",
            OrganizationRole::Registrant => "registrant",
            OrganizationRole::Establishment => "establishment",
        }
    }
}

/// Shared reference data: the same organization appears in many documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Organization {
    pub id_root: Option<String>,
    pub id_extension: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labeler {
    pub organization: Organization,
    pub registrant: Option<Registrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registrant {
    pub organization: Organization,
    pub establishments: Vec<Establishment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Establishment {
    pub organization: Organization,
    /// Business operations (e.g. MANUFACTURE), in source order.
    pub operations: Vec<Code>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: Option<String>,
    pub code: Option<Code>,
    pub title: Option<String>,
    /// Children of `<text>`, in order.
    pub content: Vec<XmlNode>,
    pub effective_time: Option<String>,
    pub products: Vec<Product>,
    pub subsections: Vec<Section>,
}

impl Section {
    pub fn code_value(&self) -> Option<&str> {
        self.code.as_ref().map(|code| code.code.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub code: Option<Code>,
    pub name: Option<String>,
    /// Exactly one is required; extra declarations are kept and reported.
    pub dosage_forms: Vec<Code>,
    pub generic_name: Option<String>,
    pub active_ingredients: Vec<ActiveIngredient>,
    pub inactive_ingredients: Vec<InactiveIngredient>,
    pub packaging: Vec<PackageItem>,
    pub identifiers: Vec<Code>,
    pub pharmacologic_classes: Vec<Code>,
    pub marketing: Vec<MarketingCategory>,
    pub interactions: Vec<DrugInteraction>,
    pub contraindications: Vec<ContraindicatedDrug>,
    pub routes: Vec<Code>,
}

impl Product {
    pub fn dosage_form(&self) -> Option<&Code> {
        self.dosage_forms.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Substance {
    pub code: Option<Code>,
    pub name: Option<String>,
}

impl Substance {
    pub fn code_value(&self) -> Option<&str> {
        self.code.as_ref().map(|code| code.code.as_str())
    }
}

/// Basis of strength for an active ingredient (`ingredient/@classCode`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveBasis {
    /// ACTIB: active ingredient basis.
    #[default]
    Ingredient,
    /// ACTIM: active moiety basis.
    Moiety,
    /// ACTIR: reference ingredient basis.
    Reference,
}

impl ActiveBasis {
    pub fn class_code(&self) -> &'static str {
        match self {
            ActiveBasis::Ingredient => "ACTIB",
            ActiveBasis::Moiety => "ACTIM",
            ActiveBasis::Reference => "ACTIR",
        }
    }

    pub fn from_class_code(value: &str) -> Option<Self> {
        match value {
            "ACTIB" => Some(ActiveBasis::Ingredient),
            "ACTIM" => Some(ActiveBasis::Moiety),
            "ACTIR" => Some(ActiveBasis::Reference),
            _ => None,
        }
    }
}

/// Class code of inactive ingredients.
pub const INACTIVE_CLASS_CODE: &str = "IACT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveIngredient {
    pub basis: ActiveBasis,
    pub substance: Substance,
    pub strength: Option<Ratio>,
    pub moieties: Vec<MoietyRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactiveIngredient {
    pub substance: Substance,
    pub strength: Option<Ratio>,
}

/// How a cross-reference was settled during the second import pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Not yet examined (only seen between the two passes).
    #[default]
    Pending,
    /// The reference declares the target itself.
    Declared,
    /// Found among the substances declared in the same payload.
    Resolved,
    /// Not declared in the payload; kept as an external reference.
    External,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoietyRef {
    pub code: Option<Code>,
    pub name: Option<String>,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstanceRef {
    pub code: Option<Code>,
    pub name: Option<String>,
    pub resolution: Resolution,
}

impl SubstanceRef {
    pub fn code_value(&self) -> Option<&str> {
        self.code.as_ref().map(|code| code.code.as_str())
    }
}

/// `asContent`: a quantity of one contained packaging level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageItem {
    pub quantity: Option<Ratio>,
    pub level: PackagingLevel,
}

/// `containerPackagedProduct`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagingLevel {
    pub identifiers: Vec<Code>,
    pub form: Option<Code>,
    pub contents: Vec<PackageItem>,
}

impl PackagingLevel {
    pub fn is_leaf(&self) -> bool {
        self.contents.is_empty()
    }

    /// Number of levels in this tree, including this one.
    pub fn level_count(&self) -> usize {
        1 + self
            .contents
            .iter()
            .map(|item| item.level.level_count())
            .sum::<usize>()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketingCategory {
    pub category: Option<Code>,
    pub application_number: Option<String>,
    pub authority: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugInteraction {
    pub code: Option<Code>,
    pub target: SubstanceRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContraindicatedDrug {
    pub target: SubstanceRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> DocumentHeader {
        DocumentHeader {
            document_id: DocumentUid::new("doc-1").unwrap(),
            set_id: SetId::new("set-1").unwrap(),
            version: 1,
            document_type: None,
            title: None,
            effective_time: None,
            schema_location: None,
        }
    }

    #[test]
    fn walk_sections_is_depth_first() {
        let mut graph = DocumentGraph::new(header());
        let mut first = Section {
            title: Some("A".to_string()),
            ..Default::default()
        };
        first.subsections.push(Section {
            title: Some("A.1".to_string()),
            ..Default::default()
        });
        graph.sections.push(first);
        graph.sections.push(Section {
            title: Some("B".to_string()),
            ..Default::default()
        });

        let titles: Vec<_> = graph
            .walk_sections()
            .into_iter()
            .filter_map(|s| s.title.as_deref())
            .collect();
        assert_eq!(titles, vec!["A", "A.1", "B"]);
    }

    #[test]
    fn organizations_carry_roles() {
        let mut graph = DocumentGraph::new(header());
        graph.labeler = Some(Labeler {
            organization: Organization {
                name: Some("Acme".to_string()),
                ..Default::default()
            },
            registrant: Some(Registrant {
                organization: Organization::default(),
                establishments: vec![Establishment {
                    organization: Organization::default(),
                    operations: vec![],
                }],
            }),
        });
        let roles: Vec<_> = graph.organizations().into_iter().map(|(r, _)| r).collect();
        assert_eq!(
            roles,
            vec![
                OrganizationRole::Labeler,
                OrganizationRole::Registrant,
                OrganizationRole::Establishment
            ]
        );
    }

    #[test]
    fn packaging_level_count() {
        let inner = PackagingLevel {
            identifiers: vec![Code::new("0000-0000-01")],
            ..Default::default()
        };
        let outer = PackagingLevel {
            contents: vec![PackageItem {
                quantity: None,
                level: inner,
            }],
            ..Default::default()
        };
        assert_eq!(outer.level_count(), 2);
        assert!(!outer.is_leaf());
    }

    #[test]
    fn active_basis_class_codes() {
        for basis in [
            ActiveBasis::Ingredient,
            ActiveBasis::Moiety,
            ActiveBasis::Reference,
        ] {
            assert_eq!(ActiveBasis::from_class_code(basis.class_code()), Some(basis));
        }
        assert_eq!(ActiveBasis::from_class_code(INACTIVE_CLASS_CODE), None);
    }
}
