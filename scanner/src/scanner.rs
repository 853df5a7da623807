use std::collections::BTreeSet;
use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;

use provenance_types::{
    ContaminationFinding, DerivationTree, FindingLocation, Layer, NodeId, Severity,
};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::layers::{contextual, lexical, numerical, reasoning, structural};
use crate::text::{PhraseMatcher, ReasoningMatcher, normalize};

/// Runs every layer over a tree. Holds only compiled matchers, so one scanner
/// can be shared across threads.
#[derive(Debug)]
pub struct Scanner {
    config: ScanConfig,
    phrases: PhraseMatcher,
    reasoning: ReasoningMatcher,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Result<Self, ScanError> {
        if !config.tolerance.is_finite() || config.tolerance <= 0.0 || config.tolerance >= 1.0 {
            return Err(ScanError::InvalidTolerance(config.tolerance));
        }
        if let Some(bad) = config.references.iter().find(|r| !r.value.is_finite()) {
            return Err(ScanError::InvalidReference(bad.name.clone()));
        }
        let phrases = PhraseMatcher::new(&config.lexical_phrases)?;
        let reasoning = ReasoningMatcher::new(&config.reasoning_patterns)?;
        tracing::debug!(
            phrases = config.lexical_phrases.len(),
            patterns = config.reasoning_patterns.len(),
            references = config.references.len(),
            "Scanner ready"
        );
        Ok(Self {
            config,
            phrases,
            reasoning,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// All five layers in fixed order, then corroboration. Never short-circuits
    /// and never touches the tree.
    #[must_use]
    pub fn scan(&self, tree: &DerivationTree) -> Vec<ContaminationFinding> {
        let mut findings = Vec::new();
        lexical::scan(tree, &self.phrases, &mut findings);
        numerical::scan(tree, &self.config, &mut findings);
        reasoning::scan(tree, &self.reasoning, &mut findings);
        contextual::scan(tree, &mut findings);
        structural::scan(tree, &mut findings);
        corroborate(&mut findings);

        let critical = findings.iter().filter(|f| f.is_critical()).count();
        if critical > 0 {
            tracing::warn!(
                output = %tree.output_name,
                findings = findings.len(),
                critical,
                "Scan found critical contamination"
            );
        } else {
            tracing::info!(output = %tree.output_name, findings = findings.len(), "Scan complete");
        }
        findings
    }

    /// Scan independent trees in parallel. Results are in input order.
    #[must_use]
    pub fn scan_many(&self, trees: &[DerivationTree]) -> Vec<Vec<ContaminationFinding>> {
        trees.par_iter().map(|tree| self.scan(tree)).collect()
    }

    /// Lexical, reasoning and numeric-literal checks over a routine's source,
    /// line by line.
    #[must_use]
    pub fn scan_source(&self, source: &str, text: &str) -> Vec<ContaminationFinding> {
        let mut findings = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = normalize(raw);
            let at = || FindingLocation::Source {
                source: source.to_string(),
                line: index + 1,
            };

            for phrase in self.phrases.find(&line) {
                findings.push(ContaminationFinding {
                    layer: Layer::Lexical,
                    severity: Severity::Warning,
                    evidence: format!("source mentions empirical source \"{phrase}\""),
                    location: at(),
                });
            }

            for literal in literal_pattern().find_iter(&line) {
                let digits = literal.as_str().replace('_', "");
                if significant_digits(&digits) < self.config.min_literal_digits {
                    continue;
                }
                let Ok(value) = digits.parse::<f64>() else {
                    continue;
                };
                for reference in &self.config.references {
                    let deviation = reference.relative_deviation(value);
                    if deviation <= self.config.tolerance {
                        findings.push(ContaminationFinding {
                            layer: Layer::Numerical,
                            severity: Severity::Warning,
                            evidence: format!(
                                "literal {}: {}",
                                literal.as_str(),
                                numerical::describe_match(value, reference, deviation, None)
                            ),
                            location: at(),
                        });
                    }
                }
            }

            for snippet in self.reasoning.find(&line) {
                findings.push(ContaminationFinding {
                    layer: Layer::Reasoning,
                    severity: Severity::Warning,
                    evidence: format!("source reads as circular justification: \"{snippet}\""),
                    location: at(),
                });
            }
        }
        tracing::info!(source, findings = findings.len(), "Source scan complete");
        findings
    }
}

/// Escalate heuristic findings on nodes that also carry a critical structural
/// finding.
pub fn corroborate(findings: &mut [ContaminationFinding]) {
    let broken: BTreeSet<NodeId> = findings
        .iter()
        .filter(|f| f.layer == Layer::Structural && f.is_critical())
        .filter_map(ContaminationFinding::node_id)
        .collect();
    for finding in findings.iter_mut() {
        let corroborated = finding.layer.is_heuristic()
            && finding.severity < Severity::Critical
            && finding.node_id().is_some_and(|id| broken.contains(&id));
        if corroborated {
            finding.severity = Severity::Critical;
            finding.evidence.push_str(" [corroborated by structural layer]");
        }
    }
}

/// Any critical finding makes the system status falsified.
#[must_use]
pub fn blocks_validity(findings: &[ContaminationFinding]) -> bool {
    findings.iter().any(ContaminationFinding::is_critical)
}

/// A critical structural finding: the tree itself is unsound.
#[must_use]
pub fn is_hard_failure(findings: &[ContaminationFinding]) -> bool {
    findings
        .iter()
        .any(|f| f.layer == Layer::Structural && f.is_critical())
}

fn literal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b\d[\d_]*(?:\.\d[\d_]*)?(?:[eE][-+]?\d+)?")
            .expect("numeric literal pattern is valid")
    })
}

/// Mantissa digits without leading zeros: `0.00137036` has 6.
fn significant_digits(literal: &str) -> usize {
    let mantissa = literal
        .split(['e', 'E'])
        .next()
        .unwrap_or(literal);
    mantissa
        .chars()
        .filter(char::is_ascii_digit)
        .skip_while(|c| *c == '0')
        .count()
}
