//! Core domain types for derivation provenance auditing.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Every other crate in the workspace builds on these: the node store persists
//! [`DerivationNode`]s, the scanner emits [`ContaminationFinding`]s, and the report
//! renders both.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod axiom;
mod finding;
mod ids;
mod node;
mod tree;

pub use axiom::{Axiom, AxiomCatalog, CatalogError};
pub use finding::{ContaminationFinding, FindingLocation, Layer, Severity};
pub use ids::{AxiomId, InvalidNodeId, NodeId};
pub use node::{
    DeclaredException, DerivationNode, NodeKind, ReviewStatus, ReviewTransitionError,
    normalize_expression,
};
pub use tree::{DerivationTree, TreeViolation};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// UTC timestamp used for every lifecycle field in the workspace.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// ============================================================================
// NonEmpty String Types
// ============================================================================

/// A string guaranteed to be non-empty (after trimming).
///
/// Used wherever a human has to state something for the record: exception
/// justifications, reset justifications, actor names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NonEmptyString(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("value must not be empty")]
pub struct EmptyStringError;

impl NonEmptyString {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyStringError> {
        let value = value.into();
        if value.trim().is_empty() {
            Err(EmptyStringError)
        } else {
            Ok(Self(value))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl TryFrom<String> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NonEmptyString {
    type Error = EmptyStringError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl std::ops::Deref for NonEmptyString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for NonEmptyString {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for NonEmptyString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
