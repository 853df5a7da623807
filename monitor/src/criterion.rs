use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use provenance_types::Timestamp;

use crate::state::SystemState;

/// Outcome of one predicate call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub passed: bool,
    /// Distance from the failure boundary; positive while passing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub margin: Option<f64>,
    /// The values the predicate looked at.
    #[serde(default)]
    pub inputs: BTreeMap<String, f64>,
}

impl Evaluation {
    #[must_use]
    pub fn pass() -> Self {
        Self {
            passed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fail() -> Self {
        Self::default()
    }

    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = Some(margin);
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: f64) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    /// Drop non-finite numbers, which JSON cannot carry.
    pub(crate) fn sanitized(mut self) -> Self {
        self.margin = self.margin.filter(|m| m.is_finite());
        self.inputs.retain(|_, v| v.is_finite());
        self
    }
}

pub type Predicate = Box<dyn Fn(&SystemState) -> Evaluation + Send + Sync>;

/// A named, pure condition that, once failed, falsifies the system.
pub struct Criterion {
    pub name: String,
    pub description: String,
    pub predicate: Predicate,
}

impl Criterion {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&SystemState) -> Evaluation + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            predicate: Box::new(predicate),
        }
    }

    #[must_use]
    pub fn evaluate(&self, state: &SystemState) -> Evaluation {
        (self.predicate)(state)
    }
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Criterion")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    #[default]
    Viable,
    Failed,
}

impl CriterionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viable => "viable",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CriterionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one criterion after an evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionState {
    pub name: String,
    pub description: String,
    pub status: CriterionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluated_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluation: Option<Evaluation>,
}

impl CriterionState {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == CriterionStatus::Failed
    }
}
