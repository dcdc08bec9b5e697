//! First import pass: streaming parse into an entity graph.
//!
//! The parser keeps a stack of entity frames (document, organization,
//! section, product, ingredient, packaging level, ...). Every start tag is
//! classified by the innermost frame and the element path relative to it:
//! it either opens a new frame, fills a field of the current one, is a
//! container on the way to a known element, or is unknown and skipped with
//! its whole subtree.

use std::collections::HashSet;

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, trace, warn};

use spl_model::fragment::local_name;
use spl_model::graph::INACTIVE_CLASS_CODE;
use spl_model::{
    ActiveBasis, ActiveIngredient, Code, ContraindicatedDrug, DocumentGraph, DocumentHeader,
    DocumentUid, DrugInteraction, Establishment, InactiveIngredient, Labeler, Location,
    MarketingCategory, MoietyRef, Organization, PackageItem, PackagingLevel, Product, Quantity,
    Ratio, Registrant, SchemaViolation, Section, SetId, ViolationRule, XmlElement,
};

use super::ProgressMonitor;
use crate::common::IDENT_CLASS_CODE;
use super::resolve::{PendingReference, ReferenceKind};
use crate::common::{PathTracker, normalize_text};
use crate::error::ImportError;
use crate::tree::{FragmentBuilder, element_from_start, reference_char};

/// Events between two cancellation and progress checks.
const POLL_INTERVAL: u64 = 64;

pub(crate) struct FirstPass {
    pub graph: DocumentGraph,
    pub violations: Vec<SchemaViolation>,
    pub references: Vec<PendingReference>,
}

pub(crate) fn first_pass(
    bytes: &[u8],
    monitor: &dyn ProgressMonitor,
) -> Result<FirstPass, ImportError> {
    if monitor.is_cancelled() {
        return Err(ImportError::Cancelled);
    }

    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let total = bytes.len().max(1) as f64;
    let mut parser = Parser::default();
    let mut buf = Vec::new();
    let mut events: u64 = 0;
    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(err) => {
                parser.offset = u64::try_from(reader.buffer_position()).ok();
                return Err(parser.malformed(err.to_string()));
            }
        };
        parser.offset = u64::try_from(reader.buffer_position()).ok();
        match event {
            Event::Start(start) => {
                let element = element_from_start(&start).map_err(|msg| parser.malformed(msg))?;
                parser.start(element)?;
            }
            Event::End(_) => parser.end()?,
            Event::Text(text) => parser.text(&String::from_utf8_lossy(&text)),
            Event::CData(data) => parser.text(&String::from_utf8_lossy(&data)),
            Event::GeneralRef(reference) => {
                let ch = reference_char(&reference).map_err(|msg| parser.malformed(msg))?;
                let mut utf8 = [0u8; 4];
                parser.text(ch.encode_utf8(&mut utf8));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();

        events += 1;
        if events % POLL_INTERVAL == 0 {
            if monitor.is_cancelled() {
                debug!(events, "import cancelled while parsing");
                return Err(ImportError::Cancelled);
            }
            let position = parser.offset.unwrap_or(0) as f64;
            monitor.report((position / total).min(1.0));
        }
    }

    parser.finish()
}

/// Innermost entity being built.
enum Scope {
    Document,
    Labeler(Labeler),
    Registrant(Registrant),
    Establishment(Establishment),
    Section(Section),
    Text(FragmentBuilder),
    Product(Product),
    Ingredient {
        class_code: Option<String>,
        ingredient: ActiveIngredient,
    },
    Package(PackageItem),
    Approval(MarketingCategory),
    Interaction(DrugInteraction),
    Contraindication(ContraindicatedDrug),
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Document,
    Labeler,
    Registrant,
    Establishment,
    Section,
    Text,
    Product,
    Ingredient,
    Package,
    Approval,
    Interaction,
    Contraindication,
    Skip,
}

impl Scope {
    fn kind(&self) -> FrameKind {
        match self {
            Scope::Document => FrameKind::Document,
            Scope::Labeler(_) => FrameKind::Labeler,
            Scope::Registrant(_) => FrameKind::Registrant,
            Scope::Establishment(_) => FrameKind::Establishment,
            Scope::Section(_) => FrameKind::Section,
            Scope::Text(_) => FrameKind::Text,
            Scope::Product(_) => FrameKind::Product,
            Scope::Ingredient { .. } => FrameKind::Ingredient,
            Scope::Package(_) => FrameKind::Package,
            Scope::Approval(_) => FrameKind::Approval,
            Scope::Interaction(_) => FrameKind::Interaction,
            Scope::Contraindication(_) => FrameKind::Contraindication,
            Scope::Skip => FrameKind::Skip,
        }
    }

    fn open(kind: FrameKind, element: &XmlElement) -> Self {
        match kind {
            FrameKind::Document => Scope::Document,
            FrameKind::Labeler => Scope::Labeler(Labeler {
                organization: Organization::default(),
                registrant: None,
            }),
            FrameKind::Registrant => Scope::Registrant(Registrant {
                organization: Organization::default(),
                establishments: Vec::new(),
            }),
            FrameKind::Establishment => Scope::Establishment(Establishment {
                organization: Organization::default(),
                operations: Vec::new(),
            }),
            FrameKind::Section => Scope::Section(Section::default()),
            FrameKind::Text => Scope::Text(FragmentBuilder::new()),
            FrameKind::Product => Scope::Product(Product::default()),
            FrameKind::Ingredient => Scope::Ingredient {
                class_code: element.attribute("classCode").map(str::to_string),
                ingredient: ActiveIngredient::default(),
            },
            FrameKind::Package => Scope::Package(PackageItem::default()),
            FrameKind::Approval => Scope::Approval(MarketingCategory::default()),
            FrameKind::Interaction => Scope::Interaction(DrugInteraction::default()),
            FrameKind::Contraindication => {
                Scope::Contraindication(ContraindicatedDrug::default())
            }
            FrameKind::Skip => Scope::Skip,
        }
    }

    fn organization_mut(&mut self) -> Option<&mut Organization> {
        match self {
            Scope::Labeler(labeler) => Some(&mut labeler.organization),
            Scope::Registrant(registrant) => Some(&mut registrant.organization),
            Scope::Establishment(establishment) => Some(&mut establishment.organization),
            _ => None,
        }
    }

    fn ratio_mut(&mut self) -> Option<&mut Ratio> {
        match self {
            Scope::Ingredient { ingredient, .. } => ingredient.strength.as_mut(),
            Scope::Package(item) => item.quantity.as_mut(),
            _ => None,
        }
    }
}

struct Frame {
    scope: Scope,
    /// Depth of the element that opened this frame.
    depth: usize,
    location: Location,
}

/// Elements whose attributes fill a field of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leaf {
    DocumentId,
    DocumentCode,
    EffectiveTime,
    SetId,
    VersionNumber,
    OrganizationId,
    Operation,
    SectionId,
    SectionCode,
    ProductCode,
    DosageForm,
    PharmacologicClass,
    ProductIdentifier,
    IdentifiedEntity,
    Route,
    Quantity,
    Numerator,
    Denominator,
    SubstanceCode,
    Moiety,
    MoietyCode,
    PackageCode,
    PackageForm,
    ApprovalId,
    ApprovalCode,
    InteractionCode,
    InteractantCode,
}

/// Elements whose text content fills a field of the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    DocumentTitle,
    SectionTitle,
    OrganizationName,
    ProductName,
    GenericName,
    SubstanceName,
    MoietyName,
    InteractantName,
}

enum Action {
    /// A container on the way to a known element.
    Descend,
    Skip,
    Open(FrameKind),
    Capture(TextTarget),
    Leaf(Leaf),
}

/// Classify a start tag by the innermost frame and the path below it.
fn classify(kind: FrameKind, rel: &[&str]) -> Action {
    match kind {
        FrameKind::Document => match rel {
            ["id"] => Action::Leaf(Leaf::DocumentId),
            ["code"] => Action::Leaf(Leaf::DocumentCode),
            ["title"] => Action::Capture(TextTarget::DocumentTitle),
            ["effectiveTime"] => Action::Leaf(Leaf::EffectiveTime),
            ["setId"] => Action::Leaf(Leaf::SetId),
            ["versionNumber"] => Action::Leaf(Leaf::VersionNumber),
            ["author"] | ["author", "assignedEntity"] => Action::Descend,
            ["author", "assignedEntity", "representedOrganization"] => {
                Action::Open(FrameKind::Labeler)
            }
            ["component"]
            | ["component", "structuredBody"]
            | ["component", "structuredBody", "component"] => Action::Descend,
            ["component", "structuredBody", "component", "section"] => {
                Action::Open(FrameKind::Section)
            }
            _ => Action::Skip,
        },
        FrameKind::Labeler => match rel {
            ["id"] => Action::Leaf(Leaf::OrganizationId),
            ["name"] => Action::Capture(TextTarget::OrganizationName),
            ["assignedEntity"] => Action::Descend,
            ["assignedEntity", "assignedOrganization"] => Action::Open(FrameKind::Registrant),
            _ => Action::Skip,
        },
        FrameKind::Registrant => match rel {
            ["id"] => Action::Leaf(Leaf::OrganizationId),
            ["name"] => Action::Capture(TextTarget::OrganizationName),
            ["assignedEntity"] => Action::Open(FrameKind::Establishment),
            _ => Action::Skip,
        },
        FrameKind::Establishment => match rel {
            ["assignedOrganization"] => Action::Descend,
            ["assignedOrganization", "id"] => Action::Leaf(Leaf::OrganizationId),
            ["assignedOrganization", "name"] => Action::Capture(TextTarget::OrganizationName),
            ["performance"] | ["performance", "actDefinition"] => Action::Descend,
            ["performance", "actDefinition", "code"] => Action::Leaf(Leaf::Operation),
            _ => Action::Skip,
        },
        FrameKind::Section => match rel {
            ["id"] => Action::Leaf(Leaf::SectionId),
            ["code"] => Action::Leaf(Leaf::SectionCode),
            ["title"] => Action::Capture(TextTarget::SectionTitle),
            ["text"] => Action::Open(FrameKind::Text),
            ["effectiveTime"] => Action::Leaf(Leaf::EffectiveTime),
            ["subject"] => Action::Descend,
            ["subject", "manufacturedProduct"] => Action::Open(FrameKind::Product),
            ["component"] => Action::Descend,
            ["component", "section"] => Action::Open(FrameKind::Section),
            _ => Action::Skip,
        },
        FrameKind::Product => classify_product(rel),
        FrameKind::Ingredient => match rel {
            ["quantity"] => Action::Leaf(Leaf::Quantity),
            ["quantity", "numerator"] => Action::Leaf(Leaf::Numerator),
            ["quantity", "denominator"] => Action::Leaf(Leaf::Denominator),
            ["ingredientSubstance"] | ["ingredientSubstance", "activeMoiety"] => Action::Descend,
            ["ingredientSubstance", "code"] => Action::Leaf(Leaf::SubstanceCode),
            ["ingredientSubstance", "name"] => Action::Capture(TextTarget::SubstanceName),
            ["ingredientSubstance", "activeMoiety", "activeMoiety"] => Action::Leaf(Leaf::Moiety),
            ["ingredientSubstance", "activeMoiety", "activeMoiety", "code"] => {
                Action::Leaf(Leaf::MoietyCode)
            }
            ["ingredientSubstance", "activeMoiety", "activeMoiety", "name"] => {
                Action::Capture(TextTarget::MoietyName)
            }
            _ => Action::Skip,
        },
        FrameKind::Package => match rel {
            ["quantity"] => Action::Leaf(Leaf::Quantity),
            ["quantity", "numerator"] => Action::Leaf(Leaf::Numerator),
            ["quantity", "denominator"] => Action::Leaf(Leaf::Denominator),
            ["containerPackagedProduct"] => Action::Descend,
            ["containerPackagedProduct", "code"] => Action::Leaf(Leaf::PackageCode),
            ["containerPackagedProduct", "formCode"] => Action::Leaf(Leaf::PackageForm),
            ["containerPackagedProduct", "asContent"] => Action::Open(FrameKind::Package),
            _ => Action::Skip,
        },
        FrameKind::Approval => match rel {
            ["id"] => Action::Leaf(Leaf::ApprovalId),
            ["code"] => Action::Leaf(Leaf::ApprovalCode),
            _ => Action::Skip,
        },
        FrameKind::Interaction => match rel {
            ["code"] => Action::Leaf(Leaf::InteractionCode),
            ["interactant"] => Action::Descend,
            ["interactant", "code"] => Action::Leaf(Leaf::InteractantCode),
            ["interactant", "name"] => Action::Capture(TextTarget::InteractantName),
            _ => Action::Skip,
        },
        FrameKind::Contraindication => match rel {
            ["interactant"] => Action::Descend,
            ["interactant", "code"] => Action::Leaf(Leaf::InteractantCode),
            ["interactant", "name"] => Action::Capture(TextTarget::InteractantName),
            _ => Action::Skip,
        },
        FrameKind::Text | FrameKind::Skip => Action::Skip,
    }
}

fn classify_product(rel: &[&str]) -> Action {
    match rel {
        ["manufacturedProduct"] => Action::Descend,
        ["manufacturedProduct", "code"] => Action::Leaf(Leaf::ProductCode),
        ["manufacturedProduct", "name"] => Action::Capture(TextTarget::ProductName),
        ["manufacturedProduct", "formCode"] => Action::Leaf(Leaf::DosageForm),
        ["manufacturedProduct", "asEntityWithGeneric"]
        | ["manufacturedProduct", "asEntityWithGeneric", "genericMedicine"] => Action::Descend,
        ["manufacturedProduct", "asEntityWithGeneric", "genericMedicine", "name"] => {
            Action::Capture(TextTarget::GenericName)
        }
        ["manufacturedProduct", "asSpecializedKind"]
        | ["manufacturedProduct", "asSpecializedKind", "generalizedMaterialKind"] => {
            Action::Descend
        }
        ["manufacturedProduct", "asSpecializedKind", "generalizedMaterialKind", "code"] => {
            Action::Leaf(Leaf::PharmacologicClass)
        }
        ["manufacturedProduct", "ingredient"] => Action::Open(FrameKind::Ingredient),
        ["manufacturedProduct", "asContent"] => Action::Open(FrameKind::Package),
        ["manufacturedProduct", "asIdentifiedEntity"] => Action::Leaf(Leaf::IdentifiedEntity),
        ["manufacturedProduct", "asIdentifiedEntity", "id"] => {
            Action::Leaf(Leaf::ProductIdentifier)
        }
        ["subjectOf"] => Action::Descend,
        ["subjectOf", "approval"] => Action::Open(FrameKind::Approval),
        ["subjectOf", "interaction"] => Action::Open(FrameKind::Interaction),
        ["subjectOf", "contraindication"] => Action::Open(FrameKind::Contraindication),
        ["consumedIn"] | ["consumedIn", "substanceAdministration"] => Action::Descend,
        ["consumedIn", "substanceAdministration", "routeCode"] => Action::Leaf(Leaf::Route),
        _ => Action::Skip,
    }
}

fn attr(element: &XmlElement, key: &str) -> Option<String> {
    element.attribute(key).map(str::to_string)
}

fn code_from(element: &XmlElement) -> Option<Code> {
    let code = element.attribute("code")?;
    Some(Code {
        code: code.to_string(),
        code_system: attr(element, "codeSystem"),
        display_name: attr(element, "displayName"),
    })
}

fn quantity_from(element: &XmlElement) -> Option<Quantity> {
    let value = element.attribute("value")?;
    Some(Quantity::new(value, element.attribute("unit")))
}

/// Package codes declared anywhere below `level`.
fn nested_package_codes(level: &PackagingLevel) -> HashSet<&str> {
    let mut codes = HashSet::new();
    let mut stack: Vec<&PackagingLevel> = level.contents.iter().map(|item| &item.level).collect();
    while let Some(current) = stack.pop() {
        codes.extend(current.identifiers.iter().map(|code| code.code.as_str()));
        stack.extend(current.contents.iter().map(|item| &item.level));
    }
    codes
}

fn top(frames: &mut [Frame]) -> Option<&mut Scope> {
    frames.last_mut().map(|frame| &mut frame.scope)
}

struct Capture {
    target: TextTarget,
    depth: usize,
    text: String,
}

#[derive(Default)]
struct HeaderFields {
    document_id: Option<String>,
    set_id: Option<String>,
    version: Option<String>,
    document_type: Option<Code>,
    title: Option<String>,
    effective_time: Option<String>,
    schema_location: Option<String>,
}

#[derive(Default)]
struct Parser {
    names: Vec<String>,
    paths: PathTracker,
    frames: Vec<Frame>,
    capture: Option<Capture>,
    header: HeaderFields,
    labeler: Option<Labeler>,
    sections: Vec<Section>,
    section_ids: HashSet<String>,
    violations: Vec<SchemaViolation>,
    references: Vec<PendingReference>,
    offset: Option<u64>,
    root_closed: bool,
}

impl Parser {
    fn location(&self) -> Location {
        Location::new(self.paths.current(), self.offset)
    }

    fn malformed(&self, message: impl Into<String>) -> ImportError {
        ImportError::Malformed {
            message: message.into(),
            location: self.location(),
        }
    }

    fn violation(&mut self, rule: ViolationRule, message: impl Into<String>, location: Location) {
        let violation = SchemaViolation::new(rule, message, location);
        warn!(rule = rule.as_str(), location = %violation.location, "{}", violation.message);
        self.violations.push(violation);
    }

    fn push_frame(&mut self, scope: Scope) {
        self.frames.push(Frame {
            scope,
            depth: self.names.len(),
            location: self.location(),
        });
    }

    fn start(&mut self, element: XmlElement) -> Result<(), ImportError> {
        self.names.push(element.name.clone());
        self.paths.push(&element.name);

        let Some(frame) = self.frames.last_mut() else {
            return self.open_root(&element);
        };
        let base = frame.depth;
        let kind = match &mut frame.scope {
            Scope::Skip => return Ok(()),
            Scope::Text(builder) => {
                builder.open(element);
                return Ok(());
            }
            scope => scope.kind(),
        };

        let action = {
            let rel: Vec<&str> = self.names[base..].iter().map(String::as_str).collect();
            classify(kind, &rel)
        };
        match action {
            Action::Descend => {}
            Action::Skip => {
                trace!(path = %self.paths.current(), "skipping unsupported element");
                self.push_frame(Scope::Skip);
            }
            Action::Open(kind) => {
                let scope = Scope::open(kind, &element);
                self.push_frame(scope);
            }
            Action::Capture(target) => {
                self.capture = Some(Capture {
                    target,
                    depth: self.names.len(),
                    text: String::new(),
                });
            }
            Action::Leaf(leaf) => self.leaf(leaf, &element)?,
        }
        Ok(())
    }

    fn open_root(&mut self, element: &XmlElement) -> Result<(), ImportError> {
        if self.root_closed {
            return Err(self.malformed("content after the document element"));
        }
        if element.name != "document" {
            return Err(self.malformed(format!(
                "root element is <{}>, expected <document>",
                element.name
            )));
        }
        self.header.schema_location = element
            .attributes
            .iter()
            .find(|(key, _)| local_name(key) == "schemaLocation")
            .map(|(_, value)| value.clone());
        self.push_frame(Scope::Document);
        Ok(())
    }

    fn check_effective_time(&mut self, value: &str) {
        let valid = value
            .get(..8)
            .is_some_and(|date| NaiveDate::parse_from_str(date, "%Y%m%d").is_ok());
        if !valid {
            let location = self.location();
            self.violation(
                ViolationRule::InvalidEffectiveTime,
                format!("effective time {value:?} is not a YYYYMMDD date"),
                location,
            );
        }
    }

    fn leaf(&mut self, leaf: Leaf, element: &XmlElement) -> Result<(), ImportError> {
        match leaf {
            Leaf::DocumentId => self.header.document_id = attr(element, "root"),
            Leaf::DocumentCode => self.header.document_type = code_from(element),
            Leaf::SetId => self.header.set_id = attr(element, "root"),
            Leaf::VersionNumber => self.header.version = attr(element, "value"),
            Leaf::EffectiveTime => {
                let value = attr(element, "value");
                if let Some(value) = &value {
                    self.check_effective_time(value);
                }
                match top(&mut self.frames) {
                    Some(Scope::Section(section)) => section.effective_time = value,
                    Some(Scope::Document) => self.header.effective_time = value,
                    _ => {}
                }
            }
            Leaf::OrganizationId => {
                if let Some(organization) = top(&mut self.frames).and_then(Scope::organization_mut)
                    && organization.id_root.is_none()
                    && organization.id_extension.is_none()
                {
                    organization.id_root = attr(element, "root");
                    organization.id_extension = attr(element, "extension");
                }
            }
            Leaf::Operation => {
                if let (Some(Scope::Establishment(establishment)), Some(code)) =
                    (top(&mut self.frames), code_from(element))
                {
                    establishment.operations.push(code);
                }
            }
            Leaf::SectionId => {
                let Some(root) = attr(element, "root") else {
                    return Ok(());
                };
                if !self.section_ids.insert(root.clone()) {
                    return Err(ImportError::ReferentialIntegrity {
                        message: format!("section id {root} is declared more than once"),
                        location: self.location(),
                    });
                }
                if let Some(Scope::Section(section)) = top(&mut self.frames) {
                    section.id = Some(root);
                }
            }
            Leaf::IdentifiedEntity => {
                let class_code = attr(element, "classCode");
                if class_code.as_deref() != Some(IDENT_CLASS_CODE) {
                    let location = self.location();
                    self.violation(
                        ViolationRule::UnsupportedIdentifierClass,
                        format!(
                            "identified entity class {} is not {IDENT_CLASS_CODE}; exported as {IDENT_CLASS_CODE}",
                            class_code.as_deref().unwrap_or("(none)")
                        ),
                        location,
                    );
                }
            }
            Leaf::SectionCode => {
                if let Some(Scope::Section(section)) = top(&mut self.frames) {
                    section.code = code_from(element);
                }
            }
            Leaf::ProductCode
            | Leaf::DosageForm
            | Leaf::PharmacologicClass
            | Leaf::ProductIdentifier
            | Leaf::Route => {
                if let Some(Scope::Product(product)) = top(&mut self.frames) {
                    apply_product_leaf(product, leaf, element);
                }
            }
            Leaf::Quantity => match top(&mut self.frames) {
                Some(Scope::Ingredient { ingredient, .. }) => {
                    ingredient.strength = Some(Ratio::default());
                }
                Some(Scope::Package(item)) => item.quantity = Some(Ratio::default()),
                _ => {}
            },
            Leaf::Numerator => {
                if let Some(ratio) = top(&mut self.frames).and_then(Scope::ratio_mut) {
                    ratio.numerator = quantity_from(element);
                }
            }
            Leaf::Denominator => {
                if let Some(ratio) = top(&mut self.frames).and_then(Scope::ratio_mut) {
                    ratio.denominator = quantity_from(element);
                }
            }
            Leaf::SubstanceCode => {
                if let Some(Scope::Ingredient { ingredient, .. }) = top(&mut self.frames) {
                    ingredient.substance.code = code_from(element);
                }
            }
            Leaf::Moiety => {
                if let Some(Scope::Ingredient { ingredient, .. }) = top(&mut self.frames) {
                    ingredient.moieties.push(MoietyRef::default());
                }
            }
            Leaf::MoietyCode => {
                if let Some(Scope::Ingredient { ingredient, .. }) = top(&mut self.frames)
                    && let Some(moiety) = ingredient.moieties.last_mut()
                {
                    moiety.code = code_from(element);
                }
            }
            Leaf::PackageCode => {
                if let (Some(Scope::Package(item)), Some(code)) =
                    (top(&mut self.frames), code_from(element))
                {
                    item.level.identifiers.push(code);
                }
            }
            Leaf::PackageForm => {
                if let Some(Scope::Package(item)) = top(&mut self.frames) {
                    item.level.form = code_from(element);
                }
            }
            Leaf::ApprovalId => {
                if let Some(Scope::Approval(approval)) = top(&mut self.frames) {
                    approval.application_number = attr(element, "extension");
                    approval.authority = attr(element, "root");
                }
            }
            Leaf::ApprovalCode => {
                if let Some(Scope::Approval(approval)) = top(&mut self.frames) {
                    approval.category = code_from(element);
                }
            }
            Leaf::InteractionCode => {
                if let Some(Scope::Interaction(interaction)) = top(&mut self.frames) {
                    interaction.code = code_from(element);
                }
            }
            Leaf::InteractantCode => match top(&mut self.frames) {
                Some(Scope::Interaction(interaction)) => {
                    interaction.target.code = code_from(element);
                }
                Some(Scope::Contraindication(contraindication)) => {
                    contraindication.target.code = code_from(element);
                }
                _ => {}
            },
        }
        Ok(())
    }

    fn finish_capture(&mut self, capture: Capture) {
        let text = normalize_text(&capture.text);
        match (capture.target, top(&mut self.frames)) {
            (TextTarget::DocumentTitle, _) => self.header.title = Some(text),
            (TextTarget::SectionTitle, Some(Scope::Section(section))) => {
                section.title = Some(text);
            }
            (TextTarget::OrganizationName, Some(scope)) => {
                if let Some(organization) = scope.organization_mut() {
                    organization.name = Some(text);
                }
            }
            (TextTarget::ProductName, Some(Scope::Product(product))) => {
                product.name = Some(text);
            }
            (TextTarget::GenericName, Some(Scope::Product(product))) => {
                product.generic_name = Some(text);
            }
            (TextTarget::SubstanceName, Some(Scope::Ingredient { ingredient, .. })) => {
                ingredient.substance.name = Some(text);
            }
            (TextTarget::MoietyName, Some(Scope::Ingredient { ingredient, .. })) => {
                if let Some(moiety) = ingredient.moieties.last_mut() {
                    moiety.name = Some(text);
                }
            }
            (TextTarget::InteractantName, Some(Scope::Interaction(interaction))) => {
                interaction.target.name = Some(text);
            }
            (TextTarget::InteractantName, Some(Scope::Contraindication(contraindication))) => {
                contraindication.target.name = Some(text);
            }
            _ => {}
        }
    }

    fn end(&mut self) -> Result<(), ImportError> {
        let depth = self.names.len();
        if self
            .capture
            .as_ref()
            .is_some_and(|capture| capture.depth == depth)
            && let Some(capture) = self.capture.take()
        {
            self.finish_capture(capture);
        }

        let closes_frame = self.frames.last().is_some_and(|frame| frame.depth == depth);
        if closes_frame {
            if let Some(frame) = self.frames.pop() {
                self.close(frame)?;
            }
        } else if let Some(Frame {
            scope: Scope::Text(builder),
            ..
        }) = self.frames.last_mut()
        {
            builder.close();
        }

        self.names.pop();
        self.paths.pop();
        Ok(())
    }

    fn text(&mut self, value: &str) {
        if let Some(Frame {
            scope: Scope::Text(builder),
            ..
        }) = self.frames.last_mut()
        {
            builder.text(value);
        } else if let Some(capture) = &mut self.capture {
            capture.text.push_str(value);
        }
    }

    fn close(&mut self, frame: Frame) -> Result<(), ImportError> {
        let Frame {
            scope, location, ..
        } = frame;
        match scope {
            Scope::Document => self.root_closed = true,
            Scope::Skip => {}
            Scope::Labeler(labeler) => {
                debug!(name = ?labeler.organization.name, "labeler parsed");
                self.labeler = Some(labeler);
            }
            Scope::Registrant(registrant) => {
                if let Some(Scope::Labeler(labeler)) = top(&mut self.frames) {
                    labeler.registrant = Some(registrant);
                }
            }
            Scope::Establishment(establishment) => {
                if let Some(Scope::Registrant(registrant)) = top(&mut self.frames) {
                    registrant.establishments.push(establishment);
                }
            }
            Scope::Section(section) => {
                if section.code.is_none() {
                    self.violation(
                        ViolationRule::MissingSectionCode,
                        "section has no section-type code",
                        location,
                    );
                }
                debug!(
                    code = section.code_value().unwrap_or("-"),
                    products = section.products.len(),
                    subsections = section.subsections.len(),
                    "section parsed"
                );
                match top(&mut self.frames) {
                    Some(Scope::Section(parent)) => parent.subsections.push(section),
                    _ => self.sections.push(section),
                }
            }
            Scope::Text(builder) => {
                if let Some(Scope::Section(section)) = top(&mut self.frames) {
                    section.content.extend(builder.finish());
                }
            }
            Scope::Product(product) => {
                self.check_product(&product, &location);
                debug!(name = ?product.name, "product parsed");
                if let Some(Scope::Section(section)) = top(&mut self.frames) {
                    section.products.push(product);
                }
            }
            Scope::Ingredient {
                class_code,
                ingredient,
            } => self.close_ingredient(class_code.as_deref(), ingredient, location),
            Scope::Package(item) => self.close_package(item, location)?,
            Scope::Approval(approval) => {
                if let Some(Scope::Product(product)) = top(&mut self.frames) {
                    product.marketing.push(approval);
                }
            }
            Scope::Interaction(interaction) => {
                self.references.push(PendingReference {
                    kind: ReferenceKind::Interaction,
                    code: interaction.target.code_value().map(str::to_string),
                    declared: false,
                    location,
                });
                if let Some(Scope::Product(product)) = top(&mut self.frames) {
                    product.interactions.push(interaction);
                }
            }
            Scope::Contraindication(contraindication) => {
                self.references.push(PendingReference {
                    kind: ReferenceKind::Contraindication,
                    code: contraindication.target.code_value().map(str::to_string),
                    declared: false,
                    location,
                });
                if let Some(Scope::Product(product)) = top(&mut self.frames) {
                    product.contraindications.push(contraindication);
                }
            }
        }
        Ok(())
    }

    fn check_product(&mut self, product: &Product, location: &Location) {
        match product.dosage_forms.len() {
            0 => self.violation(
                ViolationRule::MissingDosageForm,
                "product declares no dosage form",
                location.clone(),
            ),
            1 => {}
            count => self.violation(
                ViolationRule::MultipleDosageForms,
                format!("product declares {count} dosage forms; exactly one is allowed"),
                location.clone(),
            ),
        }
        if product.routes.is_empty() {
            self.violation(
                ViolationRule::MissingRoute,
                "product declares no route of administration",
                location.clone(),
            );
        }
    }

    fn close_ingredient(
        &mut self,
        class_code: Option<&str>,
        mut ingredient: ActiveIngredient,
        location: Location,
    ) {
        if ingredient.substance.code.is_none() {
            self.violation(
                ViolationRule::MissingSubstanceCode,
                "ingredient substance has no code",
                location.clone(),
            );
        }
        let class_code = class_code.unwrap_or_default();
        if class_code == INACTIVE_CLASS_CODE {
            let inactive = InactiveIngredient {
                substance: ingredient.substance,
                strength: ingredient.strength,
            };
            if let Some(Scope::Product(product)) = top(&mut self.frames) {
                product.inactive_ingredients.push(inactive);
            }
        } else if let Some(basis) = ActiveBasis::from_class_code(class_code) {
            ingredient.basis = basis;
            for moiety in &ingredient.moieties {
                self.references.push(PendingReference {
                    kind: ReferenceKind::Moiety,
                    code: moiety.code.as_ref().map(|code| code.code.clone()),
                    declared: moiety.name.is_some(),
                    location: location.clone(),
                });
            }
            if let Some(Scope::Product(product)) = top(&mut self.frames) {
                product.active_ingredients.push(ingredient);
            }
        } else {
            self.violation(
                ViolationRule::UnknownIngredientClass,
                format!("ingredient class {class_code:?} is not recognized; ingredient dropped"),
                location,
            );
        }
    }

    fn close_package(&mut self, item: PackageItem, location: Location) -> Result<(), ImportError> {
        if item.level.is_leaf() && item.level.identifiers.is_empty() {
            self.violation(
                ViolationRule::MissingPackageIdentifier,
                "innermost packaging level has no package code",
                location.clone(),
            );
        }
        let nested = nested_package_codes(&item.level);
        if let Some(code) = item
            .level
            .identifiers
            .iter()
            .find(|code| nested.contains(code.code.as_str()))
        {
            return Err(ImportError::ReferentialIntegrity {
                message: format!("package code {} reappears beneath itself", code.code),
                location,
            });
        }
        match top(&mut self.frames) {
            Some(Scope::Package(parent)) => parent.level.contents.push(item),
            Some(Scope::Product(product)) => product.packaging.push(item),
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<FirstPass, ImportError> {
        if !self.frames.is_empty() {
            return Err(self.malformed("unexpected end of document"));
        }
        if !self.root_closed {
            return Err(self.malformed("document has no <document> root element"));
        }

        let header_location = Location::new("/document", None);
        let missing = |element: &'static str| ImportError::MissingHeader {
            element,
            location: header_location.clone(),
        };
        let document_id = self
            .header
            .document_id
            .and_then(|value| DocumentUid::new(value).ok())
            .ok_or_else(|| missing("id"))?;
        let set_id = self
            .header
            .set_id
            .and_then(|value| SetId::new(value).ok())
            .ok_or_else(|| missing("setId"))?;
        let raw_version = self.header.version.ok_or_else(|| missing("versionNumber"))?;
        let version = raw_version
            .trim()
            .parse::<u32>()
            .map_err(|_| ImportError::Malformed {
                message: format!("versionNumber {raw_version:?} is not a non-negative integer"),
                location: Location::new("/document/versionNumber", None),
            })?;

        let header = DocumentHeader {
            document_id,
            set_id,
            version,
            document_type: self.header.document_type,
            title: self.header.title,
            effective_time: self.header.effective_time,
            schema_location: self.header.schema_location,
        };
        let mut graph = DocumentGraph::new(header);
        graph.labeler = self.labeler;
        graph.sections = self.sections;

        Ok(FirstPass {
            graph,
            violations: self.violations,
            references: self.references,
        })
    }
}

fn apply_product_leaf(product: &mut Product, leaf: Leaf, element: &XmlElement) {
    match leaf {
        Leaf::ProductCode => product.code = code_from(element),
        Leaf::DosageForm => product.dosage_forms.extend(code_from(element)),
        Leaf::PharmacologicClass => product.pharmacologic_classes.extend(code_from(element)),
        Leaf::Route => product.routes.extend(code_from(element)),
        Leaf::ProductIdentifier => {
            if let Some(extension) = element.attribute("extension") {
                let mut code = Code::new(extension);
                code.code_system = attr(element, "root");
                product.identifiers.push(code);
            }
        }
        _ => {}
    }
}
