//! Derivation nodes: one step in a provenance chain.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AxiomId, NodeId, NonEmptyString, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Root of a provenance chain. Carries exactly one axiom.
    Axiom { axiom: AxiomId },
    /// Computation step consuming other nodes.
    Step,
}

// ── Review lifecycle ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Unreviewed,
    Accepted,
    Flagged,
    Rejected,
}

impl ReviewStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unreviewed => "unreviewed",
            Self::Accepted => "accepted",
            Self::Flagged => "flagged",
            Self::Rejected => "rejected",
        }
    }

    /// Permitted review transitions. `Rejected` is terminal.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Unreviewed,
                Self::Accepted | Self::Flagged | Self::Rejected
            ) | (Self::Flagged, Self::Accepted | Self::Rejected)
                | (Self::Accepted, Self::Flagged)
        )
    }

    pub fn transition(self, next: Self) -> Result<Self, ReviewTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ReviewTransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid review transition from {from} to {to}")]
pub struct ReviewTransitionError {
    pub from: ReviewStatus,
    pub to: ReviewStatus,
}

// ── Node ─────────────────────────────────────────────────────

/// One immutable step in a derivation.
///
/// Only `reviewed_status` changes after creation, and only through a logged
/// review record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivationNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    pub expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    pub axiom_dependencies: BTreeSet<AxiomId>,
    pub input_node_ids: BTreeSet<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_bound: Option<f64>,
    /// Externally measured values used by this step, keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub empirical_inputs: BTreeMap<String, f64>,
    pub created_at: Timestamp,
    #[serde(default)]
    pub reviewed_status: ReviewStatus,
}

impl DerivationNode {
    #[must_use]
    pub fn is_axiom(&self) -> bool {
        matches!(self.kind, NodeKind::Axiom { .. })
    }

    #[must_use]
    pub fn axiom(&self) -> Option<&AxiomId> {
        match &self.kind {
            NodeKind::Axiom { axiom } => Some(axiom),
            NodeKind::Step => None,
        }
    }

    /// A step with no inputs: a dangling, unexplained number.
    #[must_use]
    pub fn is_unsupported_leaf(&self) -> bool {
        !self.is_axiom() && self.input_node_ids.is_empty()
    }

    #[must_use]
    pub fn is_pure(&self) -> bool {
        self.empirical_inputs.is_empty()
    }
}

/// Explicit, separately logged permission for a node to use one empirical input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredException {
    pub node_id: NodeId,
    pub input_name: String,
    pub justification: NonEmptyString,
    pub actor: NonEmptyString,
    pub declared_at: Timestamp,
}

/// Normalize an expression to its semantic form: trimmed, internal whitespace
/// collapsed to single spaces.
#[must_use]
pub fn normalize_expression(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
