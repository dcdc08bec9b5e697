//! Row types, one per entity table.
//!
//! Owned rows carry the document they belong to, their parent key and a
//! sequence number giving their position among siblings. Organizations and
//! pharmacologic classes are shared reference data and carry neither.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spl_model::{
    ActiveBasis, ActiveIngredientId, Code, ContraindicatedDrugId, DocumentId, DocumentUid,
    DrugInteractionId, InactiveIngredientId, MarketingCategoryId, MoietyRef, Organization,
    OrganizationId, OrganizationRole, OrganizationRoleId, PackageIdentifierId, PackageItemId,
    PackagingLevelId, PharmacologicClassId, ProductId, ProductIdentifierId, Ratio, SectionId,
    SetId, Substance, SubstanceRef, XmlNode,
};

/// All stored versions of one logical label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSetRow {
    pub set_id: SetId,
    pub versions: BTreeMap<u32, DocumentId>,
    /// Next allocation counter for this set's scope. Never decreases.
    pub next_counter: u64,
}

impl DocumentSetRow {
    pub fn new(set_id: SetId) -> Self {
        Self {
            set_id,
            versions: BTreeMap::new(),
            next_counter: 0,
        }
    }

    /// Highest stored version.
    pub fn current(&self) -> Option<(u32, DocumentId)> {
        self.versions
            .last_key_value()
            .map(|(version, id)| (*version, *id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub id: DocumentId,
    pub set_id: SetId,
    pub document_uid: DocumentUid,
    pub version: u32,
    pub document_type: Option<Code>,
    pub title: Option<String>,
    pub effective_time: Option<String>,
    pub schema_location: Option<String>,
    pub content_hash: String,
    /// Payload the document was imported from, when it came from XML.
    pub source: Option<String>,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRow {
    pub id: OrganizationId,
    pub organization: Organization,
}

/// Links a document to an organization in one role.
///
/// Registrants hang off the labeler role, establishments off the registrant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationRoleRow {
    pub id: OrganizationRoleId,
    pub document: DocumentId,
    pub organization: OrganizationId,
    pub role: OrganizationRole,
    pub parent: Option<OrganizationRoleId>,
    pub seq: u32,
    pub operations: Vec<Code>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRow {
    pub id: SectionId,
    pub document: DocumentId,
    pub parent: Option<SectionId>,
    pub seq: u32,
    /// `id/@root` as written in the source.
    pub section_root: Option<String>,
    pub code: Option<Code>,
    pub title: Option<String>,
    pub content: Vec<XmlNode>,
    pub effective_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    pub id: ProductId,
    pub document: DocumentId,
    pub section: SectionId,
    pub seq: u32,
    pub code: Option<Code>,
    pub name: Option<String>,
    pub dosage_forms: Vec<Code>,
    pub generic_name: Option<String>,
    pub routes: Vec<Code>,
    pub pharmacologic_classes: Vec<PharmacologicClassId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveIngredientRow {
    pub id: ActiveIngredientId,
    pub document: DocumentId,
    pub product: ProductId,
    pub seq: u32,
    pub basis: ActiveBasis,
    pub substance: Substance,
    pub strength: Option<Ratio>,
    pub moieties: Vec<MoietyRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InactiveIngredientRow {
    pub id: InactiveIngredientId,
    pub document: DocumentId,
    pub product: ProductId,
    pub seq: u32,
    pub substance: Substance,
    pub strength: Option<Ratio>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductIdentifierRow {
    pub id: ProductIdentifierId,
    pub document: DocumentId,
    pub product: ProductId,
    pub seq: u32,
    pub identifier: Code,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketingCategoryRow {
    pub id: MarketingCategoryId,
    pub document: DocumentId,
    pub product: ProductId,
    pub seq: u32,
    pub category: Option<Code>,
    pub application_number: Option<String>,
    pub authority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacologicClassRow {
    pub id: PharmacologicClassId,
    pub code: Code,
}

/// `containerPackagedProduct`. Its position comes from the owning item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingLevelRow {
    pub id: PackagingLevelId,
    pub document: DocumentId,
    pub product: ProductId,
    pub form: Option<Code>,
}

/// `asContent`: places one level inside a product or a containing level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageItemRow {
    pub id: PackageItemId,
    pub document: DocumentId,
    pub product: ProductId,
    /// `None` for the outermost items of a product.
    pub container: Option<PackagingLevelId>,
    pub seq: u32,
    pub quantity: Option<Ratio>,
    pub level: PackagingLevelId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageIdentifierRow {
    pub id: PackageIdentifierId,
    pub document: DocumentId,
    pub level: PackagingLevelId,
    pub seq: u32,
    pub code: Code,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugInteractionRow {
    pub id: DrugInteractionId,
    pub document: DocumentId,
    pub product: ProductId,
    pub seq: u32,
    pub code: Option<Code>,
    pub target: SubstanceRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContraindicatedDrugRow {
    pub id: ContraindicatedDrugId,
    pub document: DocumentId,
    pub product: ProductId,
    pub seq: u32,
    pub target: SubstanceRef,
}
