//! Entity graph model for Structured Product Labeling documents.

pub mod code;
pub mod error;
pub mod fidelity;
pub mod fragment;
pub mod graph;
pub mod ids;

pub use code::{Code, Quantity, Ratio};
pub use error::{ErrorKind, Location, ModelError, OperationFailure, SchemaViolation, ViolationRule};
pub use fidelity::{FidelityReport, Outcome, OutcomeCounts, PathEntry, ReportCategory};
pub use fragment::{XmlElement, XmlNode};
pub use graph::{
    ActiveBasis, ActiveIngredient, ContraindicatedDrug, DocumentGraph, DocumentHeader,
    DrugInteraction, Establishment, InactiveIngredient, Labeler, MarketingCategory, MoietyRef,
    Organization, OrganizationRole, PackageItem, PackagingLevel, Product, Registrant, Resolution,
    Section, Substance, SubstanceRef,
};
pub use ids::{
    ActiveIngredientId, ContraindicatedDrugId, DocumentId, DocumentUid, DrugInteractionId,
    EntityKind, Handle, InactiveIngredientId, MarketingCategoryId, OrganizationId,
    OrganizationRoleId, PackageIdentifierId, PackageItemId, PackagingLevelId,
    PharmacologicClassId, ProductId, ProductIdentifierId, SectionId, SetId, SurrogateId,
};
