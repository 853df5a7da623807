use std::collections::BTreeSet;

use provenance_types::{AxiomId, ContaminationFinding, DerivationTree, Layer, Severity};

/// Declared axiom dependencies against what the inputs actually carry.
pub(crate) fn scan(tree: &DerivationTree, out: &mut Vec<ContaminationFinding>) {
    for node in tree.iter().filter(|n| !n.is_axiom()) {
        let reachable: BTreeSet<AxiomId> = node
            .input_node_ids
            .iter()
            .flat_map(|input| tree.reachable_axioms(*input))
            .collect();

        let absent = join(node.axiom_dependencies.difference(&reachable));
        if !absent.is_empty() {
            out.push(ContaminationFinding::at_node(
                Layer::Contextual,
                Severity::Warning,
                node.id,
                format!("provenance inconsistency: declares {absent} but no input reaches it"),
            ));
        }

        let undeclared = join(reachable.difference(&node.axiom_dependencies));
        if !undeclared.is_empty() {
            out.push(ContaminationFinding::at_node(
                Layer::Contextual,
                Severity::Info,
                node.id,
                format!("inherits undeclared {undeclared} through its inputs"),
            ));
        }
    }
}

fn join<'a>(ids: impl Iterator<Item = &'a AxiomId>) -> String {
    ids.map(AxiomId::as_str).collect::<Vec<_>>().join(", ")
}
