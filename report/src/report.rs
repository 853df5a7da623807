use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use provenance_monitor::{CriterionState, EvaluationSummary, SystemStatus};
use provenance_seal::{
    IntegrityEvent, IntegritySnapshot, OrderingBreach, Prediction, SealedDataset,
    check_temporal_ordering,
};
use provenance_types::{
    AxiomId, ContaminationFinding, DerivationTree, NodeId, ReviewStatus, Severity, Timestamp,
};
use provenance_utils::{WriteMode, write_artifact};

use crate::error::ReportError;

/// One row of the node table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub id: NodeId,
    pub kind: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    pub axioms: Vec<AxiomId>,
    pub inputs: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_bound: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub empirical_inputs: Vec<String>,
    pub reviewed_status: ReviewStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegritySection {
    pub seals: Vec<SealedDataset>,
    pub predictions: Vec<Prediction>,
    pub events: Vec<IntegrityEvent>,
    pub ordering_breaches: Vec<OrderingBreach>,
}

/// Frozen audit of one derivation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: Timestamp,
    pub output_name: String,
    pub output: NodeId,
    pub status: SystemStatus,
    pub nodes: Vec<NodeRow>,
    pub findings: Vec<ContaminationFinding>,
    pub criteria: Vec<CriterionState>,
    pub integrity: IntegritySection,
}

impl Report {
    pub fn critical_findings(&self) -> impl Iterator<Item = &ContaminationFinding> {
        self.findings.iter().filter(|f| f.is_critical())
    }

    pub fn failed_criteria(&self) -> impl Iterator<Item = &CriterionState> {
        self.criteria.iter().filter(|c| c.is_failed())
    }

    /// Markdown rendering. Status comes first; critical findings and failed
    /// criteria come before the node table.
    #[must_use]
    pub fn render_markdown(&self) -> String {
        crate::render::render(self)
    }
}

/// Assemble a report. Pure: reads its inputs, writes nothing.
pub fn generate(
    tree: &DerivationTree,
    findings: &[ContaminationFinding],
    summary: &EvaluationSummary,
    integrity: &IntegritySnapshot,
) -> Result<Report, ReportError> {
    for finding in findings {
        if let Some(node) = finding.node_id()
            && !tree.contains(node)
        {
            return Err(ReportError::NotFound {
                what: format!("{} finding", finding.layer),
                node,
            });
        }
    }
    for prediction in &integrity.predictions {
        if let Some(node) = prediction.node_id
            && !tree.contains(node)
        {
            return Err(ReportError::NotFound {
                what: format!("prediction '{}'", prediction.name),
                node,
            });
        }
    }

    let depths = tree.depths();
    let nodes = tree
        .iter()
        .map(|node| NodeRow {
            id: node.id,
            kind: if node.is_axiom() { "axiom" } else { "step" }.to_string(),
            expression: node.expression.clone(),
            depth: depths.get(&node.id).copied(),
            axioms: node.axiom_dependencies.iter().cloned().collect(),
            inputs: node.input_node_ids.iter().copied().collect(),
            value: node.numeric_value,
            error_bound: node.error_bound,
            empirical_inputs: node.empirical_inputs.keys().cloned().collect(),
            reviewed_status: node.reviewed_status,
        })
        .collect();

    let mut findings = findings.to_vec();
    // Most severe first; the sort is stable so layer order is kept within a
    // severity.
    findings.sort_by(|a, b| b.severity.cmp(&a.severity));

    let ordering_breaches = check_temporal_ordering(
        &integrity.predictions,
        &integrity.seals,
        &integrity.comparisons,
    );

    let status = overall_status(&summary.status, &findings, integrity, &ordering_breaches);
    let report = Report {
        generated_at: Utc::now(),
        output_name: tree.output_name.clone(),
        output: tree.output,
        status,
        nodes,
        findings,
        criteria: summary.criteria.clone(),
        integrity: IntegritySection {
            seals: integrity.seals.clone(),
            predictions: integrity.predictions.clone(),
            events: integrity.events.clone(),
            ordering_breaches,
        },
    };
    tracing::info!(
        output = %report.output_name,
        status = report.status.label(),
        nodes = report.nodes.len(),
        findings = report.findings.len(),
        critical = report.findings.iter().filter(|f| f.severity == Severity::Critical).count(),
        "Audit report generated"
    );
    Ok(report)
}

/// The monitor's status, falsified further by anything critical the report
/// itself carries.
fn overall_status(
    monitored: &SystemStatus,
    findings: &[ContaminationFinding],
    integrity: &IntegritySnapshot,
    breaches: &[OrderingBreach],
) -> SystemStatus {
    let mut reasons = monitored.reasons().to_vec();
    let mut add = |reason: String| {
        if !reasons.contains(&reason) {
            reasons.push(reason);
        }
    };

    let critical = findings.iter().filter(|f| f.is_critical()).count();
    if critical > 0 {
        add(format!("{critical} critical contamination finding(s)"));
    }
    let open = integrity.open_event_count();
    if open > 0 {
        add(format!("{open} unresolved integrity event(s)"));
    }
    for breach in breaches {
        add(format!(
            "prediction '{}' was registered after dataset '{}' was sealed",
            breach.prediction, breach.dataset_name
        ));
    }

    if reasons.is_empty() {
        SystemStatus::Valid
    } else {
        SystemStatus::Falsified { reasons }
    }
}

/// Write the Markdown rendering to `path`, replacing any previous report.
pub fn write_report(path: impl AsRef<Path>, report: &Report) -> Result<(), ReportError> {
    persist(path.as_ref(), report.render_markdown().as_bytes())
}

/// Write the report as pretty JSON to `path`.
pub fn write_report_json(path: impl AsRef<Path>, report: &Report) -> Result<(), ReportError> {
    let bytes = serde_json::to_vec_pretty(report)?;
    persist(path.as_ref(), &bytes)
}

fn persist(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    write_artifact(path, bytes, WriteMode::Replace).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Report written");
    Ok(())
}
