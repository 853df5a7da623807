//! Inputs to falsification predicates and the global status they feed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use provenance_seal::IntegritySnapshot;
use provenance_types::ContaminationFinding;

/// An experimental value with its one-sigma uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub uncertainty: f64,
}

/// Read-only view of everything a predicate may look at.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemState {
    pub predictions: BTreeMap<String, f64>,
    pub measurements: BTreeMap<String, Measurement>,
    /// Derived output values keyed by output name.
    pub derived_values: BTreeMap<String, f64>,
    pub findings: Vec<ContaminationFinding>,
    pub open_integrity_events: usize,
}

impl SystemState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prediction(mut self, name: impl Into<String>, value: f64) -> Self {
        self.predictions.insert(name.into(), value);
        self
    }

    pub fn with_measurement(mut self, name: impl Into<String>, value: f64, uncertainty: f64) -> Self {
        self.measurements
            .insert(name.into(), Measurement { value, uncertainty });
        self
    }

    pub fn with_derived(mut self, output: impl Into<String>, value: f64) -> Self {
        self.derived_values.insert(output.into(), value);
        self
    }

    pub fn with_findings(mut self, findings: impl IntoIterator<Item = ContaminationFinding>) -> Self {
        self.findings.extend(findings);
        self
    }

    /// Take predictions and the open event count from the seal.
    pub fn with_integrity(mut self, snapshot: &IntegritySnapshot) -> Self {
        for prediction in &snapshot.predictions {
            self.predictions
                .insert(prediction.name.clone(), prediction.value);
        }
        self.open_integrity_events = snapshot.open_event_count();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SystemStatus {
    Valid,
    Falsified { reasons: Vec<String> },
}

impl SystemStatus {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Falsified { .. } => "FALSIFIED",
        }
    }

    #[must_use]
    pub fn reasons(&self) -> &[String] {
        match self {
            Self::Valid => &[],
            Self::Falsified { reasons } => reasons,
        }
    }
}
