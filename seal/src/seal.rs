use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use provenance_types::{NonEmptyString, Timestamp};
use provenance_utils::{AppendLog, sha256_hex, sha256_reader};

use crate::error::SealError;
use crate::ordering::breach;
use crate::record::{
    Comparison, IntegrityEvent, IntegritySnapshot, Prediction, Resolution, SealLogRecord,
    SealedDataset, TamperEvent, TemporalOrderingViolation,
};

/// Result of checking dataset bytes against their seal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub matched: bool,
    /// Present exactly when `matched` is false.
    pub tamper_event: Option<TamperEvent>,
}

struct SealInner {
    seals: BTreeMap<String, SealedDataset>,
    predictions: BTreeMap<String, Prediction>,
    comparisons: Vec<Comparison>,
    events: BTreeMap<u64, IntegrityEvent>,
    next_event_id: u64,
    log: AppendLog<SealLogRecord>,
}

/// Write-once registry of dataset digests and committed predictions.
pub struct DataSeal {
    inner: Mutex<SealInner>,
}

impl std::fmt::Debug for DataSeal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("DataSeal")
            .field("seals", &inner.seals.len())
            .field("predictions", &inner.predictions.len())
            .field("events", &inner.events.len())
            .finish_non_exhaustive()
    }
}

impl DataSeal {
    #[must_use]
    pub fn new(log: AppendLog<SealLogRecord>) -> Self {
        Self {
            inner: Mutex::new(SealInner {
                seals: BTreeMap::new(),
                predictions: BTreeMap::new(),
                comparisons: Vec::new(),
                events: BTreeMap::new(),
                next_event_id: 1,
                log,
            }),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(AppendLog::in_memory())
    }

    /// Open a seal backed by a log file, replaying its history.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SealError> {
        let log = AppendLog::open(path)?;
        let entries = log.read_all()?;
        let seal = Self::new(log);
        {
            let mut inner = seal.lock();
            for entry in entries {
                replay(&mut inner, entry.seq, entry.record)?;
            }
            tracing::info!(
                seals = inner.seals.len(),
                predictions = inner.predictions.len(),
                events = inner.events.len(),
                "Data seal replayed"
            );
        }
        Ok(seal)
    }

    /// Seal `bytes` under `name`. A name can be sealed once.
    pub fn seal(
        &self,
        name: &str,
        bytes: &[u8],
        timestamp: Timestamp,
    ) -> Result<SealedDataset, SealError> {
        self.seal_digest(name, &sha256_hex(bytes), bytes.len() as u64, timestamp)
    }

    /// Seal a dataset file, streaming it through the digest.
    pub fn seal_file(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        timestamp: Timestamp,
    ) -> Result<SealedDataset, SealError> {
        let (digest, byte_len) = digest_file(path.as_ref())?;
        self.seal_digest(name, &digest, byte_len, timestamp)
    }

    /// Seal a digest computed elsewhere (see [`digest_offloaded`]).
    pub fn seal_digest(
        &self,
        name: &str,
        digest: &str,
        byte_len: u64,
        timestamp: Timestamp,
    ) -> Result<SealedDataset, SealError> {
        if digest.len() != 64 || !digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(SealError::InvalidDigest(digest.to_string()));
        }
        let mut inner = self.lock();
        if inner.seals.contains_key(name) {
            return Err(SealError::AlreadySealed(name.to_string()));
        }
        let dataset = SealedDataset {
            dataset_name: name.to_string(),
            digest: digest.to_string(),
            byte_len,
            sealed_at: timestamp,
        };
        inner.log.append(&SealLogRecord::Sealed {
            dataset: dataset.clone(),
        })?;
        tracing::info!(dataset = %name, digest = %dataset.digest, byte_len, "Dataset sealed");
        inner.seals.insert(name.to_string(), dataset.clone());
        Ok(dataset)
    }

    /// Check `bytes` against the sealed digest. A mismatch appends one tamper
    /// event and is reported in the outcome, not as an error.
    pub fn verify(&self, name: &str, bytes: &[u8]) -> Result<VerifyOutcome, SealError> {
        self.verify_digest(name, &sha256_hex(bytes))
    }

    pub fn verify_file(&self, name: &str, path: impl AsRef<Path>) -> Result<VerifyOutcome, SealError> {
        let (digest, _) = digest_file(path.as_ref())?;
        self.verify_digest(name, &digest)
    }

    pub fn verify_digest(&self, name: &str, observed: &str) -> Result<VerifyOutcome, SealError> {
        let mut inner = self.lock();
        let expected = inner
            .seals
            .get(name)
            .map(|s| s.digest.clone())
            .ok_or_else(|| SealError::not_found("dataset", name))?;
        if expected == observed {
            tracing::debug!(dataset = %name, "Seal verified");
            return Ok(VerifyOutcome {
                matched: true,
                tamper_event: None,
            });
        }

        let event = TamperEvent {
            id: inner.next_event_id,
            dataset_name: name.to_string(),
            expected_digest: expected,
            observed_digest: observed.to_string(),
            detected_at: Utc::now(),
            resolution: None,
        };
        inner.log.append(&SealLogRecord::TamperDetected {
            event: event.clone(),
        })?;
        tracing::warn!(
            dataset = %name,
            event = event.id,
            expected = %event.expected_digest,
            observed = %event.observed_digest,
            "Sealed dataset was modified"
        );
        inner.next_event_id += 1;
        inner
            .events
            .insert(event.id, IntegrityEvent::Tamper(event.clone()));
        Ok(VerifyOutcome {
            matched: false,
            tamper_event: Some(event),
        })
    }

    pub fn register_prediction(&self, prediction: Prediction) -> Result<(), SealError> {
        if !prediction.value.is_finite() {
            return Err(SealError::NonFiniteValue(prediction.name));
        }
        let mut inner = self.lock();
        if inner.predictions.contains_key(&prediction.name) {
            return Err(SealError::AlreadyRegistered(prediction.name));
        }
        inner.log.append(&SealLogRecord::PredictionRegistered {
            prediction: prediction.clone(),
        })?;
        tracing::info!(
            prediction = %prediction.name,
            value = prediction.value,
            "Prediction registered"
        );
        inner.predictions.insert(prediction.name.clone(), prediction);
        Ok(())
    }

    /// Record that `prediction` was compared with `dataset`. Returns the
    /// ordering violation, if any; it is logged and stays open until resolved.
    pub fn compare(
        &self,
        prediction: &str,
        dataset: &str,
        at: Timestamp,
    ) -> Result<Option<TemporalOrderingViolation>, SealError> {
        let mut inner = self.lock();
        let found = inner
            .predictions
            .get(prediction)
            .ok_or_else(|| SealError::not_found("prediction", prediction))?;
        let seal = inner
            .seals
            .get(dataset)
            .ok_or_else(|| SealError::not_found("dataset", dataset))?;
        let breach = breach(found, seal);

        let comparison = Comparison {
            prediction: prediction.to_string(),
            dataset_name: dataset.to_string(),
            compared_at: at,
        };
        inner.log.append(&SealLogRecord::Compared {
            comparison: comparison.clone(),
        })?;
        inner.comparisons.push(comparison);

        let Some(breach) = breach else {
            tracing::debug!(prediction, dataset, "Comparison recorded");
            return Ok(None);
        };
        let violation = TemporalOrderingViolation {
            id: inner.next_event_id,
            breach,
            detected_at: Utc::now(),
            resolution: None,
        };
        inner.log.append(&SealLogRecord::TemporalViolation {
            violation: violation.clone(),
        })?;
        tracing::warn!(
            prediction,
            dataset,
            event = violation.id,
            "Prediction registered after dataset was sealed"
        );
        inner.next_event_id += 1;
        inner.events.insert(
            violation.id,
            IntegrityEvent::TemporalOrdering(violation.clone()),
        );
        Ok(Some(violation))
    }

    /// Close an integrity event with an explicit, logged justification.
    pub fn resolve(
        &self,
        event_id: u64,
        justification: NonEmptyString,
        actor: NonEmptyString,
    ) -> Result<IntegrityEvent, SealError> {
        let mut inner = self.lock();
        let event = inner
            .events
            .get(&event_id)
            .ok_or(SealError::UnknownEvent(event_id))?;
        if !event.is_open() {
            return Err(SealError::AlreadyResolved(event_id));
        }
        let resolution = Resolution {
            justification,
            actor,
            resolved_at: Utc::now(),
        };
        inner.log.append(&SealLogRecord::Resolved {
            event_id,
            resolution: resolution.clone(),
        })?;
        tracing::info!(event = event_id, actor = %resolution.actor, "Integrity event resolved");
        let event = apply_resolution(&mut inner.events, event_id, resolution)
            .ok_or(SealError::UnknownEvent(event_id))?;
        Ok(event)
    }

    /// Unresolved tamper events and ordering violations, oldest first.
    #[must_use]
    pub fn open_events(&self) -> Vec<IntegrityEvent> {
        self.lock()
            .events
            .values()
            .filter(|e| e.is_open())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> IntegritySnapshot {
        let inner = self.lock();
        IntegritySnapshot {
            seals: inner.seals.values().cloned().collect(),
            predictions: inner.predictions.values().cloned().collect(),
            comparisons: inner.comparisons.clone(),
            events: inner.events.values().cloned().collect(),
        }
    }

    pub fn verify_log(&self) -> Result<u64, SealError> {
        Ok(self.lock().log.verify()?)
    }

    fn lock(&self) -> MutexGuard<'_, SealInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Hash `bytes` on tokio's blocking pool.
pub async fn digest_offloaded(bytes: Vec<u8>) -> Result<String, SealError> {
    let digest = tokio::task::spawn_blocking(move || sha256_hex(&bytes)).await?;
    Ok(digest)
}

fn digest_file(path: &Path) -> Result<(String, u64), SealError> {
    let io_err = |source: io::Error| SealError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let byte_len = file.metadata().map_err(io_err)?.len();
    let digest = sha256_reader(file).map_err(io_err)?;
    Ok((digest, byte_len))
}

fn apply_resolution(
    events: &mut BTreeMap<u64, IntegrityEvent>,
    event_id: u64,
    resolution: Resolution,
) -> Option<IntegrityEvent> {
    let event = events.get_mut(&event_id)?;
    match event {
        IntegrityEvent::Tamper(e) => e.resolution = Some(resolution),
        IntegrityEvent::TemporalOrdering(v) => v.resolution = Some(resolution),
    }
    Some(event.clone())
}

fn replay(inner: &mut SealInner, seq: u64, record: SealLogRecord) -> Result<(), SealError> {
    let fail = |reason: String| SealError::Replay { seq, reason };
    match record {
        SealLogRecord::Sealed { dataset } => {
            if inner.seals.contains_key(&dataset.dataset_name) {
                return Err(fail(format!("dataset '{}' sealed twice", dataset.dataset_name)));
            }
            inner.seals.insert(dataset.dataset_name.clone(), dataset);
        }
        SealLogRecord::PredictionRegistered { prediction } => {
            if inner.predictions.contains_key(&prediction.name) {
                return Err(fail(format!("prediction '{}' registered twice", prediction.name)));
            }
            inner.predictions.insert(prediction.name.clone(), prediction);
        }
        SealLogRecord::Compared { comparison } => inner.comparisons.push(comparison),
        SealLogRecord::TamperDetected { event } => {
            inner.next_event_id = inner.next_event_id.max(event.id + 1);
            inner.events.insert(event.id, IntegrityEvent::Tamper(event));
        }
        SealLogRecord::TemporalViolation { violation } => {
            inner.next_event_id = inner.next_event_id.max(violation.id + 1);
            inner
                .events
                .insert(violation.id, IntegrityEvent::TemporalOrdering(violation));
        }
        SealLogRecord::Resolved {
            event_id,
            resolution,
        } => {
            apply_resolution(&mut inner.events, event_id, resolution)
                .ok_or_else(|| fail(format!("resolution of unknown event #{event_id}")))?;
        }
    }
    Ok(())
}
