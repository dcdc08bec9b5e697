//! In-memory entity tables.
//!
//! A committed [`DocumentGraph`] is decomposed into one row per entity, and
//! [`Tables::document_graph`] rebuilds the exact graph from those rows by
//! following parent keys and sequence numbers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spl_model::{
    ActiveIngredient, ActiveIngredientId, Code, ContraindicatedDrug, ContraindicatedDrugId,
    DocumentGraph, DocumentHeader, DocumentId, DrugInteraction, DrugInteractionId, EntityKind,
    Establishment, InactiveIngredient, InactiveIngredientId, Labeler, MarketingCategory,
    MarketingCategoryId, Organization, OrganizationId, OrganizationRole, OrganizationRoleId,
    PackageIdentifierId, PackageItem, PackageItemId, PackagingLevel, PackagingLevelId,
    PharmacologicClassId, Product, ProductId, ProductIdentifierId, Registrant, Section, SectionId,
    SetId,
};

use crate::alloc::{IdAllocator, REFERENCE_SCOPE, set_scope};
use crate::rows::{
    ActiveIngredientRow, ContraindicatedDrugRow, DocumentRow, DocumentSetRow, DrugInteractionRow,
    InactiveIngredientRow, MarketingCategoryRow, OrganizationRoleRow, OrganizationRow,
    PackageIdentifierRow, PackageItemRow, PackagingLevelRow, PharmacologicClassRow,
    ProductIdentifierRow, ProductRow, SectionRow,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    pub sets: BTreeMap<SetId, DocumentSetRow>,
    pub documents: BTreeMap<DocumentId, DocumentRow>,
    pub organizations: BTreeMap<OrganizationId, OrganizationRow>,
    pub organization_roles: BTreeMap<OrganizationRoleId, OrganizationRoleRow>,
    pub sections: BTreeMap<SectionId, SectionRow>,
    pub products: BTreeMap<ProductId, ProductRow>,
    pub active_ingredients: BTreeMap<ActiveIngredientId, ActiveIngredientRow>,
    pub inactive_ingredients: BTreeMap<InactiveIngredientId, InactiveIngredientRow>,
    pub product_identifiers: BTreeMap<ProductIdentifierId, ProductIdentifierRow>,
    pub marketing_categories: BTreeMap<MarketingCategoryId, MarketingCategoryRow>,
    pub pharmacologic_classes: BTreeMap<PharmacologicClassId, PharmacologicClassRow>,
    pub packaging_levels: BTreeMap<PackagingLevelId, PackagingLevelRow>,
    pub package_items: BTreeMap<PackageItemId, PackageItemRow>,
    pub package_identifiers: BTreeMap<PackageIdentifierId, PackageIdentifierRow>,
    pub drug_interactions: BTreeMap<DrugInteractionId, DrugInteractionRow>,
    pub contraindicated_drugs: BTreeMap<ContraindicatedDrugId, ContraindicatedDrugRow>,
    /// Next allocation counter of the shared reference scope.
    pub reference_counter: u64,
}

fn seq(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}

fn ordered<'a, R>(rows: impl Iterator<Item = &'a R>, seq: impl Fn(&R) -> u32) -> Vec<&'a R>
where
    R: 'a,
{
    let mut rows: Vec<&R> = rows.collect();
    rows.sort_by_key(|row| seq(row));
    rows
}

fn purge<K: Ord, R>(table: &mut BTreeMap<K, R>, owned: impl Fn(&R) -> bool) -> usize {
    let before = table.len();
    table.retain(|_, row| !owned(row));
    before - table.len()
}

impl Tables {
    /// Decompose `graph` into rows. Version checks happen before this is called.
    pub(crate) fn insert_document(
        &mut self,
        graph: DocumentGraph,
        content_hash: String,
        source: Option<String>,
        imported_at: DateTime<Utc>,
    ) -> DocumentId {
        let DocumentGraph {
            header,
            labeler,
            sections,
        } = graph;
        let set_counter = self
            .sets
            .entry(header.set_id.clone())
            .or_insert_with(|| DocumentSetRow::new(header.set_id.clone()))
            .next_counter;

        let mut set_ids = IdAllocator::resume(set_scope(&header.set_id), set_counter);
        let document: DocumentId = set_ids.next_id();
        let mut writer = GraphWriter {
            reference_ids: IdAllocator::resume(REFERENCE_SCOPE, self.reference_counter),
            set_ids,
            tables: self,
            document,
        };
        writer.labeler(labeler);
        for (index, section) in sections.into_iter().enumerate() {
            writer.section(section, None, seq(index));
        }
        let set_next = writer.set_ids.position();
        let reference_next = writer.reference_ids.position();
        self.reference_counter = reference_next;

        let version = header.version;
        self.documents.insert(
            document,
            DocumentRow {
                id: document,
                set_id: header.set_id.clone(),
                document_uid: header.document_id,
                version,
                document_type: header.document_type,
                title: header.title,
                effective_time: header.effective_time,
                schema_location: header.schema_location,
                content_hash,
                source,
                imported_at,
            },
        );
        if let Some(set) = self.sets.get_mut(&header.set_id) {
            set.next_counter = set_next;
            set.versions.insert(version, document);
        }
        document
    }

    /// Rebuild the graph of a stored document.
    pub fn document_graph(&self, id: DocumentId) -> Option<DocumentGraph> {
        let row = self.documents.get(&id)?;
        let mut graph = DocumentGraph::new(DocumentHeader {
            document_id: row.document_uid.clone(),
            set_id: row.set_id.clone(),
            version: row.version,
            document_type: row.document_type.clone(),
            title: row.title.clone(),
            effective_time: row.effective_time.clone(),
            schema_location: row.schema_location.clone(),
        });
        graph.labeler = self.read_labeler(id);

        let sections: Vec<&SectionRow> = self
            .sections
            .values()
            .filter(|section| section.document == id)
            .collect();
        graph.sections = self.read_sections(None, &sections);
        Some(graph)
    }

    /// Remove a document and every row it owns. Returns the number of rows removed.
    ///
    /// Shared organizations and pharmacologic classes stay, as do the set's
    /// allocation counters.
    pub(crate) fn delete_document(&mut self, id: DocumentId) -> Option<usize> {
        let row = self.documents.remove(&id)?;
        if let Some(set) = self.sets.get_mut(&row.set_id) {
            set.versions.retain(|_, document| *document != id);
        }
        let removed = 1
            + purge(&mut self.organization_roles, |r| r.document == id)
            + purge(&mut self.sections, |r| r.document == id)
            + purge(&mut self.products, |r| r.document == id)
            + purge(&mut self.active_ingredients, |r| r.document == id)
            + purge(&mut self.inactive_ingredients, |r| r.document == id)
            + purge(&mut self.product_identifiers, |r| r.document == id)
            + purge(&mut self.marketing_categories, |r| r.document == id)
            + purge(&mut self.packaging_levels, |r| r.document == id)
            + purge(&mut self.package_items, |r| r.document == id)
            + purge(&mut self.package_identifiers, |r| r.document == id)
            + purge(&mut self.drug_interactions, |r| r.document == id)
            + purge(&mut self.contraindicated_drugs, |r| r.document == id);
        Some(removed)
    }

    pub fn row_counts(&self) -> BTreeMap<EntityKind, usize> {
        BTreeMap::from([
            (EntityKind::Document, self.documents.len()),
            (EntityKind::Organization, self.organizations.len()),
            (EntityKind::OrganizationRole, self.organization_roles.len()),
            (EntityKind::Section, self.sections.len()),
            (EntityKind::Product, self.products.len()),
            (EntityKind::ActiveIngredient, self.active_ingredients.len()),
            (EntityKind::InactiveIngredient, self.inactive_ingredients.len()),
            (EntityKind::ProductIdentifier, self.product_identifiers.len()),
            (EntityKind::MarketingCategory, self.marketing_categories.len()),
            (EntityKind::PharmacologicClass, self.pharmacologic_classes.len()),
            (EntityKind::PackagingLevel, self.packaging_levels.len()),
            (EntityKind::PackageItem, self.package_items.len()),
            (EntityKind::PackageIdentifier, self.package_identifiers.len()),
            (EntityKind::DrugInteraction, self.drug_interactions.len()),
            (EntityKind::ContraindicatedDrug, self.contraindicated_drugs.len()),
        ])
    }

    fn organization(&self, id: OrganizationId) -> Organization {
        self.organizations
            .get(&id)
            .map(|row| row.organization.clone())
            .unwrap_or_default()
    }

    fn roles(
        &self,
        document: DocumentId,
        role: OrganizationRole,
        parent: Option<OrganizationRoleId>,
    ) -> Vec<&OrganizationRoleRow> {
        ordered(
            self.organization_roles
                .values()
                .filter(|row| row.document == document && row.role == role && row.parent == parent),
            |row| row.seq,
        )
    }

    fn read_labeler(&self, document: DocumentId) -> Option<Labeler> {
        let labeler = *self
            .roles(document, OrganizationRole::Labeler, None)
            .first()?;
        let registrant = self
            .roles(document, OrganizationRole::Registrant, Some(labeler.id))
            .first()
            .map(|registrant| Registrant {
                organization: self.organization(registrant.organization),
                establishments: self
                    .roles(document, OrganizationRole::Establishment, Some(registrant.id))
                    .into_iter()
                    .map(|row| Establishment {
                        organization: self.organization(row.organization),
                        operations: row.operations.clone(),
                    })
                    .collect(),
            });
        Some(Labeler {
            organization: self.organization(labeler.organization),
            registrant,
        })
    }

    fn read_sections(&self, parent: Option<SectionId>, all: &[&SectionRow]) -> Vec<Section> {
        ordered(
            all.iter().copied().filter(|row| row.parent == parent),
            |row| row.seq,
        )
        .into_iter()
        .map(|row| Section {
            id: row.section_root.clone(),
            code: row.code.clone(),
            title: row.title.clone(),
            content: row.content.clone(),
            effective_time: row.effective_time.clone(),
            products: ordered(
                self.products.values().filter(|product| product.section == row.id),
                |product| product.seq,
            )
            .into_iter()
            .map(|product| self.read_product(product))
            .collect(),
            subsections: self.read_sections(Some(row.id), all),
        })
        .collect()
    }

    fn read_product(&self, row: &ProductRow) -> Product {
        let id = row.id;
        Product {
            code: row.code.clone(),
            name: row.name.clone(),
            dosage_forms: row.dosage_forms.clone(),
            generic_name: row.generic_name.clone(),
            active_ingredients: ordered(
                self.active_ingredients.values().filter(|r| r.product == id),
                |r| r.seq,
            )
            .into_iter()
            .map(|r| ActiveIngredient {
                basis: r.basis,
                substance: r.substance.clone(),
                strength: r.strength.clone(),
                moieties: r.moieties.clone(),
            })
            .collect(),
            inactive_ingredients: ordered(
                self.inactive_ingredients.values().filter(|r| r.product == id),
                |r| r.seq,
            )
            .into_iter()
            .map(|r| InactiveIngredient {
                substance: r.substance.clone(),
                strength: r.strength.clone(),
            })
            .collect(),
            packaging: self.read_packaging(id, None),
            identifiers: ordered(
                self.product_identifiers.values().filter(|r| r.product == id),
                |r| r.seq,
            )
            .into_iter()
            .map(|r| r.identifier.clone())
            .collect(),
            pharmacologic_classes: row
                .pharmacologic_classes
                .iter()
                .filter_map(|class| self.pharmacologic_classes.get(class))
                .map(|class| class.code.clone())
                .collect(),
            marketing: ordered(
                self.marketing_categories.values().filter(|r| r.product == id),
                |r| r.seq,
            )
            .into_iter()
            .map(|r| MarketingCategory {
                category: r.category.clone(),
                application_number: r.application_number.clone(),
                authority: r.authority.clone(),
            })
            .collect(),
            interactions: ordered(
                self.drug_interactions.values().filter(|r| r.product == id),
                |r| r.seq,
            )
            .into_iter()
            .map(|r| DrugInteraction {
                code: r.code.clone(),
                target: r.target.clone(),
            })
            .collect(),
            contraindications: ordered(
                self.contraindicated_drugs.values().filter(|r| r.product == id),
                |r| r.seq,
            )
            .into_iter()
            .map(|r| ContraindicatedDrug {
                target: r.target.clone(),
            })
            .collect(),
            routes: row.routes.clone(),
        }
    }

    fn read_packaging(
        &self,
        product: ProductId,
        container: Option<PackagingLevelId>,
    ) -> Vec<PackageItem> {
        ordered(
            self.package_items
                .values()
                .filter(|item| item.product == product && item.container == container),
            |item| item.seq,
        )
        .into_iter()
        .map(|item| {
            let form = self
                .packaging_levels
                .get(&item.level)
                .and_then(|level| level.form.clone());
            PackageItem {
                quantity: item.quantity.clone(),
                level: PackagingLevel {
                    identifiers: ordered(
                        self.package_identifiers
                            .values()
                            .filter(|identifier| identifier.level == item.level),
                        |identifier| identifier.seq,
                    )
                    .into_iter()
                    .map(|identifier| identifier.code.clone())
                    .collect(),
                    form,
                    contents: self.read_packaging(product, Some(item.level)),
                },
            }
        })
        .collect()
    }
}

/// Writes the rows of one document while allocating their ids.
struct GraphWriter<'a> {
    tables: &'a mut Tables,
    set_ids: IdAllocator,
    reference_ids: IdAllocator,
    document: DocumentId,
}

impl GraphWriter<'_> {
    fn shared_organization(&mut self, organization: Organization) -> OrganizationId {
        if let Some(existing) = self
            .tables
            .organizations
            .values()
            .find(|row| row.organization == organization)
        {
            return existing.id;
        }
        let id: OrganizationId = self.reference_ids.next_id();
        self.tables
            .organizations
            .insert(id, OrganizationRow { id, organization });
        id
    }

    fn shared_class(&mut self, code: Code) -> PharmacologicClassId {
        if let Some(existing) = self
            .tables
            .pharmacologic_classes
            .values()
            .find(|row| row.code == code)
        {
            return existing.id;
        }
        let id: PharmacologicClassId = self.reference_ids.next_id();
        self.tables
            .pharmacologic_classes
            .insert(id, PharmacologicClassRow { id, code });
        id
    }

    fn role(
        &mut self,
        organization: Organization,
        role: OrganizationRole,
        parent: Option<OrganizationRoleId>,
        index: usize,
        operations: Vec<Code>,
    ) -> OrganizationRoleId {
        let organization = self.shared_organization(organization);
        let id: OrganizationRoleId = self.set_ids.next_id();
        self.tables.organization_roles.insert(
            id,
            OrganizationRoleRow {
                id,
                document: self.document,
                organization,
                role,
                parent,
                seq: seq(index),
                operations,
            },
        );
        id
    }

    fn labeler(&mut self, labeler: Option<Labeler>) {
        let Some(labeler) = labeler else {
            return;
        };
        let labeler_role = self.role(
            labeler.organization,
            OrganizationRole::Labeler,
            None,
            0,
            Vec::new(),
        );
        let Some(registrant) = labeler.registrant else {
            return;
        };
        let registrant_role = self.role(
            registrant.organization,
            OrganizationRole::Registrant,
            Some(labeler_role),
            0,
            Vec::new(),
        );
        for (index, establishment) in registrant.establishments.into_iter().enumerate() {
            self.role(
                establishment.organization,
                OrganizationRole::Establishment,
                Some(registrant_role),
                index,
                establishment.operations,
            );
        }
    }

    fn section(&mut self, section: Section, parent: Option<SectionId>, position: u32) {
        let id: SectionId = self.set_ids.next_id();
        self.tables.sections.insert(
            id,
            SectionRow {
                id,
                document: self.document,
                parent,
                seq: position,
                section_root: section.id,
                code: section.code,
                title: section.title,
                content: section.content,
                effective_time: section.effective_time,
            },
        );
        for (index, product) in section.products.into_iter().enumerate() {
            self.product(product, id, seq(index));
        }
        for (index, child) in section.subsections.into_iter().enumerate() {
            self.section(child, Some(id), seq(index));
        }
    }

    fn product(&mut self, product: Product, section: SectionId, position: u32) {
        let id: ProductId = self.set_ids.next_id();
        let document = self.document;
        let pharmacologic_classes = product
            .pharmacologic_classes
            .into_iter()
            .map(|code| self.shared_class(code))
            .collect();
        self.tables.products.insert(
            id,
            ProductRow {
                id,
                document,
                section,
                seq: position,
                code: product.code,
                name: product.name,
                dosage_forms: product.dosage_forms,
                generic_name: product.generic_name,
                routes: product.routes,
                pharmacologic_classes,
            },
        );

        for (index, ingredient) in product.active_ingredients.into_iter().enumerate() {
            let row_id = self.set_ids.next_id();
            self.tables.active_ingredients.insert(
                row_id,
                ActiveIngredientRow {
                    id: row_id,
                    document,
                    product: id,
                    seq: seq(index),
                    basis: ingredient.basis,
                    substance: ingredient.substance,
                    strength: ingredient.strength,
                    moieties: ingredient.moieties,
                },
            );
        }
        for (index, ingredient) in product.inactive_ingredients.into_iter().enumerate() {
            let row_id = self.set_ids.next_id();
            self.tables.inactive_ingredients.insert(
                row_id,
                InactiveIngredientRow {
                    id: row_id,
                    document,
                    product: id,
                    seq: seq(index),
                    substance: ingredient.substance,
                    strength: ingredient.strength,
                },
            );
        }
        for (index, identifier) in product.identifiers.into_iter().enumerate() {
            let row_id = self.set_ids.next_id();
            self.tables.product_identifiers.insert(
                row_id,
                ProductIdentifierRow {
                    id: row_id,
                    document,
                    product: id,
                    seq: seq(index),
                    identifier,
                },
            );
        }
        for (index, marketing) in product.marketing.into_iter().enumerate() {
            let row_id = self.set_ids.next_id();
            self.tables.marketing_categories.insert(
                row_id,
                MarketingCategoryRow {
                    id: row_id,
                    document,
                    product: id,
                    seq: seq(index),
                    category: marketing.category,
                    application_number: marketing.application_number,
                    authority: marketing.authority,
                },
            );
        }
        for (index, interaction) in product.interactions.into_iter().enumerate() {
            let row_id = self.set_ids.next_id();
            self.tables.drug_interactions.insert(
                row_id,
                DrugInteractionRow {
                    id: row_id,
                    document,
                    product: id,
                    seq: seq(index),
                    code: interaction.code,
                    target: interaction.target,
                },
            );
        }
        for (index, contraindication) in product.contraindications.into_iter().enumerate() {
            let row_id = self.set_ids.next_id();
            self.tables.contraindicated_drugs.insert(
                row_id,
                ContraindicatedDrugRow {
                    id: row_id,
                    document,
                    product: id,
                    seq: seq(index),
                    target: contraindication.target,
                },
            );
        }
        for (index, item) in product.packaging.into_iter().enumerate() {
            self.package_item(item, id, None, seq(index));
        }
    }

    fn package_item(
        &mut self,
        item: PackageItem,
        product: ProductId,
        container: Option<PackagingLevelId>,
        position: u32,
    ) {
        let document = self.document;
        let level_id: PackagingLevelId = self.set_ids.next_id();
        let item_id = self.set_ids.next_id();
        let PackagingLevel {
            identifiers,
            form,
            contents,
        } = item.level;

        self.tables.packaging_levels.insert(
            level_id,
            PackagingLevelRow {
                id: level_id,
                document,
                product,
                form,
            },
        );
        self.tables.package_items.insert(
            item_id,
            PackageItemRow {
                id: item_id,
                document,
                product,
                container,
                seq: position,
                quantity: item.quantity,
                level: level_id,
            },
        );
        for (index, code) in identifiers.into_iter().enumerate() {
            let row_id = self.set_ids.next_id();
            self.tables.package_identifiers.insert(
                row_id,
                PackageIdentifierRow {
                    id: row_id,
                    document,
                    level: level_id,
                    seq: seq(index),
                    code,
                },
            );
        }
        for (index, child) in contents.into_iter().enumerate() {
            self.package_item(child, product, Some(level_id), seq(index));
        }
    }
}
