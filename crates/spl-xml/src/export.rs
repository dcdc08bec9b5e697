//! SPL export: [`DocumentGraph`] to XML in canonical element order.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use serde::{Deserialize, Serialize};

use spl_model::{
    ActiveIngredient, DocumentGraph, InactiveIngredient, Labeler, MarketingCategory, Organization,
    PackageItem, Product, Section, SubstanceRef, XmlNode,
};

use crate::common::{
    HL7_NS, IDENT_CLASS_CODE, XSI_NS, end, start, write_code, write_empty, write_opt_text,
    write_ratio, write_text_element, write_value,
};
use crate::error::ExportError;
use crate::tree::write_node;

/// Output layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Two-space indentation.
    #[default]
    Pretty,
    /// No insignificant whitespace.
    Minified,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Pretty => "pretty",
            ExportFormat::Minified => "minified",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(ExportFormat::Pretty),
            "minified" | "min" => Ok(ExportFormat::Minified),
            other => Err(format!("unknown export format: {other}")),
        }
    }
}

/// Serialize a document graph.
pub fn export_document(graph: &DocumentGraph, format: ExportFormat) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    match format {
        ExportFormat::Pretty => {
            let mut writer = Writer::new_with_indent(&mut buffer, b' ', 2);
            write_document(&mut writer, graph)?;
        }
        ExportFormat::Minified => {
            let mut writer = Writer::new(&mut buffer);
            write_document(&mut writer, graph)?;
        }
    }
    Ok(String::from_utf8(buffer)?)
}

fn write_document<W: Write>(writer: &mut Writer<W>, graph: &DocumentGraph) -> Result<(), ExportError> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let header = &graph.header;
    let mut root = BytesStart::new("document");
    root.push_attribute(("xmlns", HL7_NS));
    if let Some(location) = &header.schema_location {
        root.push_attribute(("xmlns:xsi", XSI_NS));
        root.push_attribute(("xsi:schemaLocation", location.as_str()));
    }
    writer.write_event(Event::Start(root))?;

    write_empty(writer, "id", &[("root", Some(header.document_id.as_str()))])?;
    if let Some(code) = &header.document_type {
        write_code(writer, "code", code)?;
    }
    write_opt_text(writer, "title", header.title.as_deref())?;
    if let Some(effective_time) = &header.effective_time {
        write_value(writer, "effectiveTime", effective_time)?;
    }
    write_empty(writer, "setId", &[("root", Some(header.set_id.as_str()))])?;
    write_value(writer, "versionNumber", &header.version.to_string())?;

    if let Some(labeler) = &graph.labeler {
        write_labeler(writer, labeler)?;
    }

    if !graph.sections.is_empty() {
        start(writer, "component")?;
        start(writer, "structuredBody")?;
        for section in &graph.sections {
            start(writer, "component")?;
            write_section(writer, section)?;
            end(writer, "component")?;
        }
        end(writer, "structuredBody")?;
        end(writer, "component")?;
    }

    end(writer, "document")
}

fn write_organization_fields<W: Write>(
    writer: &mut Writer<W>,
    organization: &Organization,
) -> Result<(), ExportError> {
    if organization.id_root.is_some() || organization.id_extension.is_some() {
        write_empty(
            writer,
            "id",
            &[
                ("extension", organization.id_extension.as_deref()),
                ("root", organization.id_root.as_deref()),
            ],
        )?;
    }
    write_opt_text(writer, "name", organization.name.as_deref())
}

fn write_labeler<W: Write>(writer: &mut Writer<W>, labeler: &Labeler) -> Result<(), ExportError> {
    start(writer, "author")?;
    start(writer, "assignedEntity")?;
    start(writer, "representedOrganization")?;
    write_organization_fields(writer, &labeler.organization)?;

    if let Some(registrant) = &labeler.registrant {
        start(writer, "assignedEntity")?;
        start(writer, "assignedOrganization")?;
        write_organization_fields(writer, &registrant.organization)?;
        for establishment in &registrant.establishments {
            start(writer, "assignedEntity")?;
            start(writer, "assignedOrganization")?;
            write_organization_fields(writer, &establishment.organization)?;
            end(writer, "assignedOrganization")?;
            for operation in &establishment.operations {
                start(writer, "performance")?;
                start(writer, "actDefinition")?;
                write_code(writer, "code", operation)?;
                end(writer, "actDefinition")?;
                end(writer, "performance")?;
            }
            end(writer, "assignedEntity")?;
        }
        end(writer, "assignedOrganization")?;
        end(writer, "assignedEntity")?;
    }

    end(writer, "representedOrganization")?;
    end(writer, "assignedEntity")?;
    end(writer, "author")
}

fn write_section<W: Write>(writer: &mut Writer<W>, section: &Section) -> Result<(), ExportError> {
    start(writer, "section")?;
    if let Some(id) = &section.id {
        write_empty(writer, "id", &[("root", Some(id.as_str()))])?;
    }
    if let Some(code) = &section.code {
        write_code(writer, "code", code)?;
    }
    write_opt_text(writer, "title", section.title.as_deref())?;
    if !section.content.is_empty() {
        start(writer, "text")?;
        write_fragment(writer, &section.content)?;
        end(writer, "text")?;
    }
    if let Some(effective_time) = &section.effective_time {
        write_value(writer, "effectiveTime", effective_time)?;
    }
    for product in &section.products {
        start(writer, "subject")?;
        write_product(writer, product)?;
        end(writer, "subject")?;
    }
    for subsection in &section.subsections {
        start(writer, "component")?;
        write_section(writer, subsection)?;
        end(writer, "component")?;
    }
    end(writer, "section")
}

/// Write labeling text unindented: whitespace between inline elements is
/// content, so the pretty layout must not add any.
fn write_fragment<W: Write>(writer: &mut Writer<W>, nodes: &[XmlNode]) -> Result<(), ExportError> {
    let mut inline = Writer::new(Vec::new());
    for node in nodes {
        write_node(&mut inline, node)?;
    }
    writer.get_mut().write_all(&inline.into_inner())?;
    Ok(())
}

fn write_product<W: Write>(writer: &mut Writer<W>, product: &Product) -> Result<(), ExportError> {
    start(writer, "manufacturedProduct")?;
    start(writer, "manufacturedProduct")?;
    if let Some(code) = &product.code {
        write_code(writer, "code", code)?;
    }
    write_opt_text(writer, "name", product.name.as_deref())?;
    for form in &product.dosage_forms {
        write_code(writer, "formCode", form)?;
    }
    if let Some(generic) = &product.generic_name {
        start(writer, "asEntityWithGeneric")?;
        start(writer, "genericMedicine")?;
        write_text_element(writer, "name", generic)?;
        end(writer, "genericMedicine")?;
        end(writer, "asEntityWithGeneric")?;
    }
    for class in &product.pharmacologic_classes {
        start(writer, "asSpecializedKind")?;
        start(writer, "generalizedMaterialKind")?;
        write_code(writer, "code", class)?;
        end(writer, "generalizedMaterialKind")?;
        end(writer, "asSpecializedKind")?;
    }
    for ingredient in &product.active_ingredients {
        write_active_ingredient(writer, ingredient)?;
    }
    for ingredient in &product.inactive_ingredients {
        write_inactive_ingredient(writer, ingredient)?;
    }
    for item in &product.packaging {
        write_package_item(writer, item)?;
    }
    for identifier in &product.identifiers {
        let mut wrapper = BytesStart::new("asIdentifiedEntity");
        wrapper.push_attribute(("classCode", IDENT_CLASS_CODE));
        writer.write_event(Event::Start(wrapper))?;
        write_empty(
            writer,
            "id",
            &[
                ("extension", Some(identifier.code.as_str())),
                ("root", identifier.code_system.as_deref()),
            ],
        )?;
        end(writer, "asIdentifiedEntity")?;
    }
    end(writer, "manufacturedProduct")?;

    for approval in &product.marketing {
        write_approval(writer, approval)?;
    }
    for interaction in &product.interactions {
        start(writer, "subjectOf")?;
        start(writer, "interaction")?;
        if let Some(code) = &interaction.code {
            write_code(writer, "code", code)?;
        }
        write_interactant(writer, &interaction.target)?;
        end(writer, "interaction")?;
        end(writer, "subjectOf")?;
    }
    for contraindication in &product.contraindications {
        start(writer, "subjectOf")?;
        start(writer, "contraindication")?;
        write_interactant(writer, &contraindication.target)?;
        end(writer, "contraindication")?;
        end(writer, "subjectOf")?;
    }
    for route in &product.routes {
        start(writer, "consumedIn")?;
        start(writer, "substanceAdministration")?;
        write_code(writer, "routeCode", route)?;
        end(writer, "substanceAdministration")?;
        end(writer, "consumedIn")?;
    }
    end(writer, "manufacturedProduct")
}

fn start_ingredient<W: Write>(writer: &mut Writer<W>, class_code: &str) -> Result<(), ExportError> {
    let mut element = BytesStart::new("ingredient");
    element.push_attribute(("classCode", class_code));
    writer.write_event(Event::Start(element))?;
    Ok(())
}

fn write_active_ingredient<W: Write>(
    writer: &mut Writer<W>,
    ingredient: &ActiveIngredient,
) -> Result<(), ExportError> {
    start_ingredient(writer, ingredient.basis.class_code())?;
    if let Some(strength) = &ingredient.strength {
        write_ratio(writer, strength)?;
    }
    start(writer, "ingredientSubstance")?;
    if let Some(code) = &ingredient.substance.code {
        write_code(writer, "code", code)?;
    }
    write_opt_text(writer, "name", ingredient.substance.name.as_deref())?;
    for moiety in &ingredient.moieties {
        start(writer, "activeMoiety")?;
        start(writer, "activeMoiety")?;
        if let Some(code) = &moiety.code {
            write_code(writer, "code", code)?;
        }
        write_opt_text(writer, "name", moiety.name.as_deref())?;
        end(writer, "activeMoiety")?;
        end(writer, "activeMoiety")?;
    }
    end(writer, "ingredientSubstance")?;
    end(writer, "ingredient")
}

fn write_inactive_ingredient<W: Write>(
    writer: &mut Writer<W>,
    ingredient: &InactiveIngredient,
) -> Result<(), ExportError> {
    start_ingredient(writer, spl_model::graph::INACTIVE_CLASS_CODE)?;
    if let Some(strength) = &ingredient.strength {
        write_ratio(writer, strength)?;
    }
    start(writer, "ingredientSubstance")?;
    if let Some(code) = &ingredient.substance.code {
        write_code(writer, "code", code)?;
    }
    write_opt_text(writer, "name", ingredient.substance.name.as_deref())?;
    end(writer, "ingredientSubstance")?;
    end(writer, "ingredient")
}

fn write_package_item<W: Write>(writer: &mut Writer<W>, item: &PackageItem) -> Result<(), ExportError> {
    start(writer, "asContent")?;
    if let Some(quantity) = &item.quantity {
        write_ratio(writer, quantity)?;
    }
    start(writer, "containerPackagedProduct")?;
    for identifier in &item.level.identifiers {
        write_code(writer, "code", identifier)?;
    }
    if let Some(form) = &item.level.form {
        write_code(writer, "formCode", form)?;
    }
    for child in &item.level.contents {
        write_package_item(writer, child)?;
    }
    end(writer, "containerPackagedProduct")?;
    end(writer, "asContent")
}

fn write_approval<W: Write>(
    writer: &mut Writer<W>,
    approval: &MarketingCategory,
) -> Result<(), ExportError> {
    start(writer, "subjectOf")?;
    start(writer, "approval")?;
    if approval.application_number.is_some() || approval.authority.is_some() {
        write_empty(
            writer,
            "id",
            &[
                ("extension", approval.application_number.as_deref()),
                ("root", approval.authority.as_deref()),
            ],
        )?;
    }
    if let Some(category) = &approval.category {
        write_code(writer, "code", category)?;
    }
    end(writer, "approval")?;
    end(writer, "subjectOf")
}

fn write_interactant<W: Write>(
    writer: &mut Writer<W>,
    target: &SubstanceRef,
) -> Result<(), ExportError> {
    start(writer, "interactant")?;
    if let Some(code) = &target.code {
        write_code(writer, "code", code)?;
    }
    write_opt_text(writer, "name", target.name.as_deref())?;
    end(writer, "interactant")
}
