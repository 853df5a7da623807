use provenance_types::{
    ContaminationFinding, DerivationNode, DerivationTree, Layer, ReviewStatus, Severity,
};

use crate::config::{ReferenceConstant, ScanConfig};

pub(crate) fn scan(tree: &DerivationTree, config: &ScanConfig, out: &mut Vec<ContaminationFinding>) {
    let depths = tree.depths();
    for node in tree.iter() {
        let Some(value) = node.numeric_value else {
            continue;
        };
        for reference in &config.references {
            let deviation = reference.relative_deviation(value);
            if deviation > config.tolerance {
                continue;
            }
            let depth = depths.get(&node.id).copied();
            if suppressed(node, depth, config.shallow_depth) {
                tracing::debug!(
                    node = %node.id,
                    reference = %reference.name,
                    "Numerical match suppressed for accepted shallow node"
                );
                continue;
            }
            out.push(ContaminationFinding::at_node(
                Layer::Numerical,
                Severity::Warning,
                node.id,
                describe_match(value, reference, deviation, depth),
            ));
        }
    }
}

/// Only a reviewed-and-accepted node at or above `shallow_depth` is exempt.
fn suppressed(node: &DerivationNode, depth: Option<usize>, shallow_depth: usize) -> bool {
    node.reviewed_status == ReviewStatus::Accepted && depth.is_some_and(|d| d <= shallow_depth)
}

pub(crate) fn describe_match(
    value: f64,
    reference: &ReferenceConstant,
    deviation: f64,
    depth: Option<usize>,
) -> String {
    let relation = if deviation < reference.relative_uncertainty {
        "inside"
    } else {
        "outside"
    };
    let depth = depth.map_or_else(|| "unknown".to_string(), |d| d.to_string());
    format!(
        "value {value} matches reference {} = {} (relative deviation {deviation:.3e}, {relation} reference uncertainty {:.1e}, depth {depth})",
        reference.name, reference.value, reference.relative_uncertainty
    )
}
