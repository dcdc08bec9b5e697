#![deny(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ModelError;

/// Stable identifier of a document set (`setId/@root`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SetId(String);

impl SetId {
    pub fn new(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ModelError::InvalidSetId(value));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External identifier of one document snapshot (`id/@root`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentUid(String);

impl DocumentUid {
    pub fn new(value: impl Into<String>) -> Result<Self, ModelError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ModelError::InvalidDocumentUid(value));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entity category tag. Every surrogate identifier belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Document,
    Organization,
    OrganizationRole,
    Product,
    ActiveIngredient,
    InactiveIngredient,
    ProductIdentifier,
    MarketingCategory,
    PharmacologicClass,
    PackageItem,
    PackagingLevel,
    PackageIdentifier,
    Section,
    DrugInteraction,
    ContraindicatedDrug,
}

impl EntityKind {
    pub const ALL: [EntityKind; 15] = [
        EntityKind::Document,
        EntityKind::Organization,
        EntityKind::OrganizationRole,
        EntityKind::Product,
        EntityKind::ActiveIngredient,
        EntityKind::InactiveIngredient,
        EntityKind::ProductIdentifier,
        EntityKind::MarketingCategory,
        EntityKind::PharmacologicClass,
        EntityKind::PackageItem,
        EntityKind::PackagingLevel,
        EntityKind::PackageIdentifier,
        EntityKind::Section,
        EntityKind::DrugInteraction,
        EntityKind::ContraindicatedDrug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Document => "document",
            EntityKind::Organization => "organization",
            EntityKind::OrganizationRole => "organization_role",
            EntityKind::Product => "product",
            EntityKind::ActiveIngredient => "active_ingredient",
            EntityKind::InactiveIngredient => "inactive_ingredient",
            EntityKind::ProductIdentifier => "product_identifier",
            EntityKind::MarketingCategory => "marketing_category",
            EntityKind::PharmacologicClass => "pharmacologic_class",
            EntityKind::PackageItem => "package_item",
            EntityKind::PackagingLevel => "packaging_level",
            EntityKind::PackageIdentifier => "package_identifier",
            EntityKind::Section => "section",
            EntityKind::DrugInteraction => "drug_interaction",
            EntityKind::ContraindicatedDrug => "contraindicated_drug",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ModelError::UnknownEntityKind(s.to_string()))
    }
}

/// An opaque surrogate handle.
///
/// Derived from the first 16 bytes of a SHA-256 digest over the allocation
/// scope, entity tag and counter, so handles carry no visible ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle([u8; 16]);

impl Handle {
    pub fn from_first_16_bytes_of_sha256(digest: [u8; 32]) -> Self {
        let mut out = [0u8; 16];
        out.copy_from_slice(&digest[..16]);
        Self(out)
    }

    /// Derive the handle for the `counter`-th allocation of `kind` in `scope`.
    pub fn derive(scope: &str, kind: EntityKind, counter: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(scope.as_bytes());
        hasher.update([0u8]);
        hasher.update(kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(counter.to_be_bytes());
        Self::from_first_16_bytes_of_sha256(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn parse_hex(value: &str) -> Result<Self, ModelError> {
        let bytes =
            hex::decode(value.trim()).map_err(|_| ModelError::InvalidHandle(value.to_string()))?;
        if bytes.len() != 16 {
            return Err(ModelError::InvalidHandle(value.to_string()));
        }
        let mut out = [0u8; 16];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl Serialize for Handle {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Handle::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Typed surrogate identifier for one entity category.
pub trait SurrogateId: Copy + Ord + fmt::Display {
    const KIND: EntityKind;

    fn from_handle(handle: Handle) -> Self;

    fn handle(&self) -> Handle;
}

macro_rules! surrogate_id {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Handle);

        impl SurrogateId for $name {
            const KIND: EntityKind = EntityKind::$kind;

            fn from_handle(handle: Handle) -> Self {
                Self(handle)
            }

            fn handle(&self) -> Handle {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Handle::parse_hex(s).map(Self)
            }
        }
    };
}

surrogate_id!(DocumentId => Document);
surrogate_id!(OrganizationId => Organization);
surrogate_id!(OrganizationRoleId => OrganizationRole);
surrogate_id!(ProductId => Product);
surrogate_id!(ActiveIngredientId => ActiveIngredient);
surrogate_id!(InactiveIngredientId => InactiveIngredient);
surrogate_id!(ProductIdentifierId => ProductIdentifier);
surrogate_id!(MarketingCategoryId => MarketingCategory);
surrogate_id!(PharmacologicClassId => PharmacologicClass);
surrogate_id!(PackageItemId => PackageItem);
surrogate_id!(PackagingLevelId => PackagingLevel);
surrogate_id!(PackageIdentifierId => PackageIdentifier);
surrogate_id!(
    /// Sections and subsections share one table.
    SectionId => Section
);
surrogate_id!(DrugInteractionId => DrugInteraction);
surrogate_id!(ContraindicatedDrugId => ContraindicatedDrug);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_hex_round_trips() {
        let handle = Handle::derive("set-1", EntityKind::Product, 7);
        let parsed = Handle::parse_hex(&handle.to_hex()).unwrap();
        assert_eq!(parsed, handle);
        assert_eq!(handle.to_hex().len(), 32);
    }

    #[test]
    fn handle_depends_on_scope_kind_and_counter() {
        let base = Handle::derive("set-1", EntityKind::Product, 1);
        assert_ne!(base, Handle::derive("set-2", EntityKind::Product, 1));
        assert_ne!(base, Handle::derive("set-1", EntityKind::Section, 1));
        assert_ne!(base, Handle::derive("set-1", EntityKind::Product, 2));
    }

    #[test]
    fn handle_rejects_wrong_length() {
        assert!(Handle::parse_hex("abcd").is_err());
        assert!(Handle::parse_hex("not hex at all").is_err());
    }

    #[test]
    fn typed_ids_serialize_as_plain_hex() {
        let id = ProductId::from_handle(Handle::derive("s", EntityKind::Product, 0));
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn entity_kind_parses_tags() {
        assert_eq!(
            "active-ingredient".parse::<EntityKind>().unwrap(),
            EntityKind::ActiveIngredient
        );
        assert_eq!("SECTION".parse::<EntityKind>().unwrap(), EntityKind::Section);
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn set_id_trims_and_rejects_empty() {
        assert_eq!(SetId::new("  abc ").unwrap().as_str(), "abc");
        assert!(SetId::new("   ").is_err());
    }
}
