use provenance_types::{ContaminationFinding, DerivationTree, Layer, Severity};

use crate::text::{PhraseMatcher, normalize};

pub(crate) fn scan(tree: &DerivationTree, phrases: &PhraseMatcher, out: &mut Vec<ContaminationFinding>) {
    for node in tree.iter() {
        let fields = [
            ("expression", Some(node.expression.as_str())),
            ("documentation", node.documentation.as_deref()),
        ];
        for (field, text) in fields {
            let Some(text) = text else { continue };
            let text = normalize(text);
            for phrase in phrases.find(&text) {
                out.push(ContaminationFinding::at_node(
                    Layer::Lexical,
                    Severity::Warning,
                    node.id,
                    format!("{field} mentions empirical source \"{phrase}\""),
                ));
            }
        }
    }
}
