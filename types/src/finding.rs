//! Contamination findings produced by the scanner.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::NodeId;

/// Which analysis layer produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Lexical,
    Numerical,
    Reasoning,
    Contextual,
    Structural,
}

impl Layer {
    pub const ALL: [Self; 5] = [
        Self::Lexical,
        Self::Numerical,
        Self::Reasoning,
        Self::Contextual,
        Self::Structural,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Numerical => "numerical",
            Self::Reasoning => "reasoning",
            Self::Contextual => "contextual",
            Self::Structural => "structural",
        }
    }

    /// Every layer except structural is a heuristic.
    #[must_use]
    pub const fn is_heuristic(self) -> bool {
        !matches!(self, Self::Structural)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered: `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "at", rename_all = "snake_case")]
pub enum FindingLocation {
    Node { node_id: NodeId },
    Source { source: String, line: usize },
}

impl fmt::Display for FindingLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node { node_id } => write!(f, "{node_id}"),
            Self::Source { source, line } => write!(f, "{source}:{line}"),
        }
    }
}

/// Immutable evidence of possible empirical leakage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContaminationFinding {
    pub layer: Layer,
    pub severity: Severity,
    pub evidence: String,
    pub location: FindingLocation,
}

impl ContaminationFinding {
    #[must_use]
    pub fn at_node(layer: Layer, severity: Severity, node_id: NodeId, evidence: String) -> Self {
        Self {
            layer,
            severity,
            evidence,
            location: FindingLocation::Node { node_id },
        }
    }

    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        match self.location {
            FindingLocation::Node { node_id } => Some(node_id),
            FindingLocation::Source { .. } => None,
        }
    }

    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}
