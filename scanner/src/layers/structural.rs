use provenance_types::{
    ContaminationFinding, DerivationTree, Layer, NodeId, Severity, TreeViolation,
};

/// The only non-heuristic layer: invariant breaches and undeclared empirical
/// inputs are critical.
pub(crate) fn scan(tree: &DerivationTree, out: &mut Vec<ContaminationFinding>) {
    let mut findings: Vec<ContaminationFinding> = tree
        .validate()
        .into_iter()
        .map(|violation| {
            ContaminationFinding::at_node(
                Layer::Structural,
                Severity::Critical,
                violation_node(&violation),
                violation.to_string(),
            )
        })
        .collect();

    for node in tree.iter() {
        for name in node.empirical_inputs.keys() {
            let finding = if tree.has_exception(node.id, name) {
                ContaminationFinding::at_node(
                    Layer::Structural,
                    Severity::Info,
                    node.id,
                    format!("empirical input '{name}' used under a declared exception"),
                )
            } else {
                ContaminationFinding::at_node(
                    Layer::Structural,
                    Severity::Critical,
                    node.id,
                    format!("empirical input '{name}' without a declared exception"),
                )
            };
            findings.push(finding);
        }
    }

    findings.sort_by_key(ContaminationFinding::node_id);
    out.extend(findings);
}

fn violation_node(violation: &TreeViolation) -> NodeId {
    match violation {
        TreeViolation::MissingOutput(node)
        | TreeViolation::DanglingInput { node, .. }
        | TreeViolation::Cycle { node }
        | TreeViolation::UnsupportedLeaf { node }
        | TreeViolation::AxiomWithInputs { node }
        | TreeViolation::Unreachable { node } => *node,
    }
}
