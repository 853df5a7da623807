use thiserror::Error;

use provenance_types::{AxiomId, NodeId, ReviewTransitionError};
use provenance_utils::LogError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDependency {
    #[error("axiom {0} is not in the catalog")]
    UnknownAxiom(AxiomId),
    #[error("step nodes must declare at least one axiom dependency")]
    Empty,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid dependency: {0}")]
    InvalidDependency(#[from] InvalidDependency),
    #[error("adding node {node} would create a cycle through {via}")]
    Cycle { node: NodeId, via: NodeId },
    #[error("node {0} not found")]
    NotFound(NodeId),
    #[error("{field} of '{expression}' must be finite")]
    NonFiniteValue {
        expression: String,
        field: &'static str,
    },
    #[error("node {node} has no empirical input named '{input}'")]
    UnknownEmpiricalInput { node: NodeId, input: String },
    #[error(transparent)]
    Review(#[from] ReviewTransitionError),
    #[error("node log replay failed at seq {seq}: {reason}")]
    Replay { seq: u64, reason: String },
    #[error(transparent)]
    Log(#[from] LogError),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("derivation '{output_name}' has no steps")]
    EmptyTree { output_name: String },
    #[error("derivation '{output_name}' is incomplete: non-axiom leaves {}", format_ids(.leaves))]
    IncompleteTree {
        output_name: String,
        leaves: Vec<NodeId>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn format_ids(ids: &[NodeId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
