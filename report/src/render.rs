//! Markdown rendering and the matching parser.

use std::fmt::Write as _;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

use provenance_seal::IntegrityEvent;
use provenance_types::AxiomId;

use crate::error::ReportError;
use crate::report::Report;

const NODES_HEADING: &str = "Derivation nodes";
const FINDINGS_HEADING: &str = "Findings";
const STATUS_PREFIX: &str = "Status: ";

pub(crate) fn render(report: &Report) -> String {
    let mut out = String::new();
    let critical: Vec<_> = report.critical_findings().collect();
    let failed: Vec<_> = report.failed_criteria().collect();

    let _ = writeln!(out, "# Derivation audit: {}\n", cell(&report.output_name));
    let _ = writeln!(out, "**{STATUS_PREFIX}{}**\n", report.status.label());
    let _ = writeln!(out, "- Output node: {}", report.output);
    let _ = writeln!(out, "- Nodes: {}", report.nodes.len());
    let _ = writeln!(
        out,
        "- Findings: {} ({} critical)",
        report.findings.len(),
        critical.len()
    );
    let _ = writeln!(out, "- Generated: {}\n", report.generated_at.to_rfc3339());

    if !report.status.reasons().is_empty() {
        out.push_str("## Falsification reasons\n\n");
        for reason in report.status.reasons() {
            let _ = writeln!(out, "- {}", cell(reason));
        }
        out.push('\n');
    }

    if !critical.is_empty() {
        out.push_str("## Critical findings\n\n");
        out.push_str("| Layer | Location | Evidence |\n|---|---|---|\n");
        for finding in &critical {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                finding.layer,
                finding.location,
                cell(&finding.evidence)
            );
        }
        out.push('\n');
    }

    if !failed.is_empty() {
        out.push_str("## Failed criteria\n\n");
        for criterion in &failed {
            let _ = writeln!(
                out,
                "- **{}**: {}",
                cell(&criterion.name),
                cell(&criterion.description)
            );
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## {NODES_HEADING}\n");
    out.push_str("| Node | Kind | Depth | Expression | Axioms | Inputs | Value | Review |\n");
    out.push_str("|---|---|---|---|---|---|---|---|\n");
    for node in &report.nodes {
        let depth = node.depth.map_or_else(|| "?".to_string(), |d| d.to_string());
        let axioms = node
            .axioms
            .iter()
            .map(AxiomId::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let inputs = node
            .inputs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let value = match (node.value, node.error_bound) {
            (Some(v), Some(e)) => format!("{v} ± {e}"),
            (Some(v), None) => v.to_string(),
            (None, _) => String::new(),
        };
        let _ = writeln!(
            out,
            "| {} | {} | {depth} | {} | {axioms} | {inputs} | {value} | {} |",
            node.id,
            node.kind,
            cell(&node.expression),
            node.reviewed_status
        );
    }
    out.push('\n');

    let _ = writeln!(out, "## {FINDINGS_HEADING}\n");
    if report.findings.is_empty() {
        out.push_str("_None._\n\n");
    } else {
        out.push_str("| Severity | Layer | Location | Evidence |\n|---|---|---|---|\n");
        for finding in &report.findings {
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} |",
                finding.severity,
                finding.layer,
                finding.location,
                cell(&finding.evidence)
            );
        }
        out.push('\n');
    }

    out.push_str("## Falsification criteria\n\n");
    if report.criteria.is_empty() {
        out.push_str("_None registered._\n\n");
    } else {
        out.push_str("| Criterion | Status | Description |\n|---|---|---|\n");
        for criterion in &report.criteria {
            let _ = writeln!(
                out,
                "| {} | {} | {} |",
                cell(&criterion.name),
                criterion.status,
                cell(&criterion.description)
            );
        }
        out.push('\n');
    }

    render_integrity(report, &mut out);
    out
}

fn render_integrity(report: &Report, out: &mut String) {
    let integrity = &report.integrity;
    out.push_str("## Data integrity\n\n");
    if integrity.seals.is_empty() && integrity.predictions.is_empty() && integrity.events.is_empty() {
        out.push_str("_No sealed data._\n");
        return;
    }

    if !integrity.seals.is_empty() {
        out.push_str("| Dataset | SHA-256 | Bytes | Sealed at |\n|---|---|---|---|\n");
        for seal in &integrity.seals {
            let _ = writeln!(
                out,
                "| {} | `{}` | {} | {} |",
                cell(&seal.dataset_name),
                seal.digest,
                seal.byte_len,
                seal.sealed_at.to_rfc3339()
            );
        }
        out.push('\n');
    }

    for prediction in &integrity.predictions {
        let _ = writeln!(
            out,
            "- Prediction **{}** = {} registered {}",
            cell(&prediction.name),
            prediction.value,
            prediction.registered_at.to_rfc3339()
        );
    }
    for breach in &integrity.ordering_breaches {
        let _ = writeln!(
            out,
            "- Ordering breach: prediction **{}** not registered before **{}** was sealed",
            cell(&breach.prediction),
            cell(&breach.dataset_name)
        );
    }
    for event in &integrity.events {
        let state = if event.is_open() { "OPEN" } else { "resolved" };
        let kind = match event {
            IntegrityEvent::Tamper(_) => "tamper",
            IntegrityEvent::TemporalOrdering(_) => "temporal ordering",
        };
        let _ = writeln!(
            out,
            "- Event #{} ({kind}, {state}): {}",
            event.id(),
            cell(&event.describe())
        );
    }
}

/// Keep table cells on one line and escape column separators.
fn cell(text: &str) -> String {
    text.replace(['\r', '\n'], " ").replace('|', "\\|")
}

/// What [`parse_rendered`] recovers from a rendered report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub node_count: usize,
    pub finding_count: usize,
    /// `VALID` or `FALSIFIED`.
    pub status: String,
}

/// Parse a rendered report back into its headline numbers.
pub fn parse_rendered(markdown: &str) -> Result<ReportSummary, ReportError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Section {
        Other,
        Nodes,
        Findings,
    }

    let mut status: Option<String> = None;
    let mut section = Section::Other;
    let mut heading: Option<String> = None;
    let mut node_count: Option<usize> = None;
    let mut finding_count = 0;

    for event in Parser::new_ext(markdown, Options::ENABLE_TABLES) {
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H2,
                ..
            }) => heading = Some(String::new()),
            Event::End(TagEnd::Heading(HeadingLevel::H2)) => {
                section = match heading.take().as_deref().map(str::trim) {
                    Some(NODES_HEADING) => {
                        node_count.get_or_insert(0);
                        Section::Nodes
                    }
                    Some(FINDINGS_HEADING) => Section::Findings,
                    _ => Section::Other,
                };
            }
            Event::Text(text) => {
                if let Some(heading) = heading.as_mut() {
                    heading.push_str(&text);
                } else if status.is_none()
                    && let Some(rest) = text.strip_prefix(STATUS_PREFIX)
                {
                    status = Some(rest.trim().to_string());
                }
            }
            Event::Start(Tag::TableRow) => match section {
                Section::Nodes => *node_count.get_or_insert(0) += 1,
                Section::Findings => finding_count += 1,
                Section::Other => {}
            },
            _ => {}
        }
    }

    Ok(ReportSummary {
        node_count: node_count.ok_or(ReportError::Parse("the node table"))?,
        finding_count,
        status: status.ok_or(ReportError::Parse("the status line"))?,
    })
}
