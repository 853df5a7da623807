use provenance_types::{ContaminationFinding, DerivationTree, Layer, Severity};

use crate::text::{ReasoningMatcher, normalize};

/// Heuristic only: phrasing is evidence of tuning, not proof of it.
pub(crate) fn scan(
    tree: &DerivationTree,
    reasoning: &ReasoningMatcher,
    out: &mut Vec<ContaminationFinding>,
) {
    for node in tree.iter() {
        let fields = [
            ("expression", Some(node.expression.as_str())),
            ("documentation", node.documentation.as_deref()),
        ];
        for (field, text) in fields {
            let Some(text) = text else { continue };
            let text = normalize(text);
            for snippet in reasoning.find(&text) {
                out.push(ContaminationFinding::at_node(
                    Layer::Reasoning,
                    Severity::Warning,
                    node.id,
                    format!("{field} reads as circular justification: \"{snippet}\""),
                ));
            }
        }
    }
}
