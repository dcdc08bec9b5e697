//! Second import pass: cross-reference resolution.
//!
//! The first pass records every code-addressed reference it meets. Once the
//! whole payload is parsed, the substance index is built from the graph and
//! each reference is settled as declared, resolved or external.

use std::collections::HashSet;

use tracing::{debug, warn};

use spl_model::{Code, DocumentGraph, Location, Product, Resolution, SchemaViolation, Section, ViolationRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReferenceKind {
    Moiety,
    Interaction,
    Contraindication,
}

impl ReferenceKind {
    fn rule(self) -> ViolationRule {
        match self {
            ReferenceKind::Moiety => ViolationRule::UnresolvedMoiety,
            ReferenceKind::Interaction => ViolationRule::UnresolvedInteractionTarget,
            ReferenceKind::Contraindication => ViolationRule::UnresolvedContraindicationTarget,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ReferenceKind::Moiety => "active moiety",
            ReferenceKind::Interaction => "interaction target",
            ReferenceKind::Contraindication => "contraindicated substance",
        }
    }
}

/// A reference seen during the first pass, with the place it was seen.
#[derive(Debug, Clone)]
pub(crate) struct PendingReference {
    pub kind: ReferenceKind,
    pub code: Option<String>,
    /// The reference carries its own declaration (an inline moiety name).
    pub declared: bool,
    pub location: Location,
}

/// Every substance code declared anywhere in one payload.
#[derive(Debug, Default)]
pub(crate) struct SubstanceIndex {
    codes: HashSet<String>,
}

impl SubstanceIndex {
    pub fn build(graph: &DocumentGraph) -> Self {
        let mut index = Self::default();
        for product in graph.products() {
            for ingredient in &product.active_ingredients {
                index.declare(ingredient.substance.code.as_ref());
                for moiety in &ingredient.moieties {
                    if moiety.name.is_some() {
                        index.declare(moiety.code.as_ref());
                    }
                }
            }
            for ingredient in &product.inactive_ingredients {
                index.declare(ingredient.substance.code.as_ref());
            }
        }
        index
    }

    fn declare(&mut self, code: Option<&Code>) {
        if let Some(code) = code {
            self.codes.insert(code.code.clone());
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    fn resolve(&self, code: Option<&Code>) -> Resolution {
        match code {
            Some(code) if self.contains(&code.code) => Resolution::Resolved,
            _ => Resolution::External,
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }
}

/// Settle every reference in `graph` and report the ones that stay external.
pub(crate) fn resolve_references(
    graph: &mut DocumentGraph,
    pending: &[PendingReference],
) -> Vec<SchemaViolation> {
    let index = SubstanceIndex::build(graph);
    debug!(substances = index.len(), references = pending.len(), "resolving cross-references");
    for_each_product_mut(&mut graph.sections, &mut |product| {
        for ingredient in &mut product.active_ingredients {
            for moiety in &mut ingredient.moieties {
                moiety.resolution = if moiety.name.is_some() {
                    Resolution::Declared
                } else {
                    index.resolve(moiety.code.as_ref())
                };
            }
        }
        for interaction in &mut product.interactions {
            interaction.target.resolution = index.resolve(interaction.target.code.as_ref());
        }
        for contraindication in &mut product.contraindications {
            contraindication.target.resolution =
                index.resolve(contraindication.target.code.as_ref());
        }
    });

    let mut violations = Vec::new();
    for reference in pending {
        if reference.declared {
            continue;
        }
        let message = match reference.code.as_deref() {
            Some(code) if index.contains(code) => continue,
            Some(code) => format!(
                "{} {code} is not declared in this document; kept as an external reference",
                reference.kind.label()
            ),
            None => format!("{} has no substance code", reference.kind.label()),
        };
        let violation = SchemaViolation::new(reference.kind.rule(), message, reference.location.clone());
        warn!(rule = violation.rule.as_str(), location = %violation.location, "{}", violation.message);
        violations.push(violation);
    }
    violations
}

fn for_each_product_mut(sections: &mut [Section], visit: &mut impl FnMut(&mut Product)) {
    for section in sections {
        for product in &mut section.products {
            visit(product);
        }
        for_each_product_mut(&mut section.subsections, visit);
    }
}

#[cfg(test)]
mod tests {
    use spl_model::{
        ActiveIngredient, DocumentHeader, DocumentUid, DrugInteraction, MoietyRef, SetId,
        Substance, SubstanceRef,
    };

    use super::*;

    fn graph_with(product: Product) -> DocumentGraph {
        let mut graph = DocumentGraph::new(DocumentHeader {
            document_id: DocumentUid::new("doc").unwrap(),
            set_id: SetId::new("set").unwrap(),
            version: 1,
            document_type: None,
            title: None,
            effective_time: None,
            schema_location: None,
        });
        graph.sections.push(Section {
            products: vec![product],
            ..Default::default()
        });
        graph
    }

    fn pending(kind: ReferenceKind, code: &str) -> PendingReference {
        PendingReference {
            kind,
            code: Some(code.to_string()),
            declared: false,
            location: Location::new("/document", None),
        }
    }

    #[test]
    fn moiety_by_code_resolves_against_declared_substances() {
        let product = Product {
            active_ingredients: vec![
                ActiveIngredient {
                    substance: Substance {
                        code: Some(Code::new("AAA")),
                        name: Some("Alpha".to_string()),
                    },
                    moieties: vec![MoietyRef {
                        code: Some(Code::new("BBB")),
                        name: None,
                        resolution: Resolution::Pending,
                    }],
                    ..Default::default()
                },
                ActiveIngredient {
                    substance: Substance {
                        code: Some(Code::new("BBB")),
                        name: Some("Beta".to_string()),
                    },
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut graph = graph_with(product);
        let violations =
            resolve_references(&mut graph, &[pending(ReferenceKind::Moiety, "BBB")]);

        assert!(violations.is_empty());
        let product = graph.products()[0];
        assert_eq!(
            product.active_ingredients[0].moieties[0].resolution,
            Resolution::Resolved
        );
    }

    #[test]
    fn undeclared_interaction_target_is_external() {
        let product = Product {
            interactions: vec![DrugInteraction {
                code: None,
                target: SubstanceRef {
                    code: Some(Code::new("ZZZ")),
                    name: None,
                    resolution: Resolution::Pending,
                },
            }],
            ..Default::default()
        };
        let mut graph = graph_with(product);
        let violations =
            resolve_references(&mut graph, &[pending(ReferenceKind::Interaction, "ZZZ")]);

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].rule, ViolationRule::UnresolvedInteractionTarget);
        assert_eq!(
            graph.products()[0].interactions[0].target.resolution,
            Resolution::External
        );
    }

    #[test]
    fn index_ignores_code_only_moieties() {
        let product = Product {
            active_ingredients: vec![ActiveIngredient {
                moieties: vec![MoietyRef {
                    code: Some(Code::new("CCC")),
                    name: None,
                    resolution: Resolution::Pending,
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let index = SubstanceIndex::build(&graph_with(product));
        assert_eq!(index.len(), 0);
        assert!(!index.contains("CCC"));
    }
}
