//! Seal ledger records.

use serde::{Deserialize, Serialize};

use provenance_types::{NodeId, NonEmptyString, Timestamp};

/// A dataset frozen by digest before any comparison touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedDataset {
    pub dataset_name: String,
    /// Lowercase hex SHA-256 of the dataset bytes.
    pub digest: String,
    pub byte_len: u64,
    pub sealed_at: Timestamp,
}

/// A theory value committed before it is compared with data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    pub registered_at: Timestamp,
}

impl Prediction {
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64, registered_at: Timestamp) -> Self {
        Self {
            name: name.into(),
            value,
            node_id: None,
            registered_at,
        }
    }

    pub fn derived_by(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }
}

/// A prediction was checked against a sealed dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comparison {
    pub prediction: String,
    pub dataset_name: String,
    pub compared_at: Timestamp,
}

/// Explicit sign-off that closes an integrity event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub justification: NonEmptyString,
    pub actor: NonEmptyString,
    pub resolved_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperEvent {
    pub id: u64,
    pub dataset_name: String,
    pub expected_digest: String,
    pub observed_digest: String,
    pub detected_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

/// A comparison whose prediction was registered at or after the dataset's
/// seal time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderingBreach {
    pub prediction: String,
    pub dataset_name: String,
    pub prediction_registered_at: Timestamp,
    pub dataset_sealed_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalOrderingViolation {
    pub id: u64,
    #[serde(flatten)]
    pub breach: OrderingBreach,
    pub detected_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

/// Either kind of integrity event. Unresolved events count against validity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityEvent {
    Tamper(TamperEvent),
    TemporalOrdering(TemporalOrderingViolation),
}

impl IntegrityEvent {
    #[must_use]
    pub fn id(&self) -> u64 {
        match self {
            Self::Tamper(e) => e.id,
            Self::TemporalOrdering(v) => v.id,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            Self::Tamper(e) => e.resolution.is_none(),
            Self::TemporalOrdering(v) => v.resolution.is_none(),
        }
    }

    /// One-line description for logs and reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Tamper(e) => format!(
                "dataset '{}' digest changed: sealed {}, observed {}",
                e.dataset_name, e.expected_digest, e.observed_digest
            ),
            Self::TemporalOrdering(v) => format!(
                "prediction '{}' registered at {} but dataset '{}' was sealed at {}",
                v.breach.prediction,
                v.breach.prediction_registered_at.to_rfc3339(),
                v.breach.dataset_name,
                v.breach.dataset_sealed_at.to_rfc3339()
            ),
        }
    }
}

/// Everything the seal knows, for reports and falsification predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegritySnapshot {
    pub seals: Vec<SealedDataset>,
    pub predictions: Vec<Prediction>,
    pub comparisons: Vec<Comparison>,
    pub events: Vec<IntegrityEvent>,
}

impl IntegritySnapshot {
    pub fn open_events(&self) -> impl Iterator<Item = &IntegrityEvent> {
        self.events.iter().filter(|e| e.is_open())
    }

    #[must_use]
    pub fn open_event_count(&self) -> usize {
        self.open_events().count()
    }

    #[must_use]
    pub fn prediction(&self, name: &str) -> Option<&Prediction> {
        self.predictions.iter().find(|p| p.name == name)
    }
}

/// One line of the seal log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum SealLogRecord {
    Sealed { dataset: SealedDataset },
    PredictionRegistered { prediction: Prediction },
    Compared { comparison: Comparison },
    TamperDetected { event: TamperEvent },
    TemporalViolation { violation: TemporalOrderingViolation },
    Resolved { event_id: u64, resolution: Resolution },
}
