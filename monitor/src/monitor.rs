use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use provenance_types::{NonEmptyString, Timestamp};
use provenance_utils::AppendLog;

use crate::criterion::{Criterion, CriterionState, CriterionStatus, Evaluation};
use crate::error::RegistryError;
use crate::state::{SystemState, SystemStatus};

/// One line of the falsification log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FalsificationRecord {
    Registered {
        name: String,
        description: String,
    },
    Failed {
        name: String,
        evaluation: Evaluation,
        at: Timestamp,
    },
    Reset {
        name: String,
        justification: NonEmptyString,
        actor: NonEmptyString,
        at: Timestamp,
    },
}

/// Result of one [`FalsificationMonitor::evaluate_all`] pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub evaluated_at: Timestamp,
    pub criteria: Vec<CriterionState>,
    pub status: SystemStatus,
}

impl EvaluationSummary {
    pub fn failed(&self) -> impl Iterator<Item = &CriterionState> {
        self.criteria.iter().filter(|c| c.is_failed())
    }
}

/// Collects criteria before the registry is closed.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    criteria: Vec<Criterion>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, criterion: Criterion) -> Result<(), RegistryError> {
        if criterion.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.criteria.iter().any(|c| c.name == criterion.name) {
            return Err(RegistryError::DuplicateCriterion(criterion.name));
        }
        tracing::debug!(criterion = %criterion.name, "Criterion registered");
        self.criteria.push(criterion);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Close the registry over `log`. Failures and resets already in the log
    /// are replayed, so a criterion that failed in an earlier run stays failed.
    pub fn build(
        self,
        mut log: AppendLog<FalsificationRecord>,
    ) -> Result<FalsificationMonitor, RegistryError> {
        let mut entries: Vec<Entry> = self
            .criteria
            .into_iter()
            .map(|criterion| Entry {
                state: CriterionState {
                    name: criterion.name.clone(),
                    description: criterion.description.clone(),
                    status: CriterionStatus::Viable,
                    last_evaluated_at: None,
                    last_evaluation: None,
                },
                criterion,
            })
            .collect();

        let mut logged = BTreeSet::new();
        for entry in log.read_all()? {
            let seq = entry.seq;
            match entry.record {
                FalsificationRecord::Registered { name, .. } => {
                    logged.insert(name);
                }
                FalsificationRecord::Failed { name, evaluation, at } => {
                    if let Some(e) = entries.iter_mut().find(|e| e.state.name == name) {
                        e.state.status = CriterionStatus::Failed;
                        e.state.last_evaluated_at = Some(at);
                        e.state.last_evaluation = Some(evaluation);
                    } else {
                        tracing::warn!(criterion = %name, seq, "Logged failure for unregistered criterion");
                    }
                }
                FalsificationRecord::Reset { name, .. } => {
                    if let Some(e) = entries.iter_mut().find(|e| e.state.name == name) {
                        e.state.status = CriterionStatus::Viable;
                    } else {
                        tracing::warn!(criterion = %name, seq, "Logged reset for unregistered criterion");
                    }
                }
            }
        }

        for entry in entries.iter().filter(|e| !logged.contains(&e.state.name)) {
            log.append(&FalsificationRecord::Registered {
                name: entry.state.name.clone(),
                description: entry.state.description.clone(),
            })?;
        }

        let failed = entries.iter().filter(|e| e.state.is_failed()).count();
        tracing::info!(criteria = entries.len(), failed, "Falsification registry closed");
        Ok(FalsificationMonitor {
            registry: Mutex::new(Registry { entries, log }),
        })
    }

    /// [`build`](Self::build) over a log file.
    pub fn build_at(self, path: impl AsRef<Path>) -> Result<FalsificationMonitor, RegistryError> {
        self.build(AppendLog::open(path)?)
    }
}

struct Entry {
    criterion: Criterion,
    state: CriterionState,
}

struct Registry {
    entries: Vec<Entry>,
    log: AppendLog<FalsificationRecord>,
}

/// The closed set of falsification criteria.
pub struct FalsificationMonitor {
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for FalsificationMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FalsificationMonitor")
            .field("criteria", &self.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl FalsificationMonitor {
    /// Evaluate every criterion against `state` under one lock.
    ///
    /// Predicates run in parallel; results are committed in registration
    /// order. A failed criterion stays failed whatever its predicate says now.
    pub fn evaluate_all(&self, state: &SystemState) -> Result<EvaluationSummary, RegistryError> {
        let mut registry = self.lock();
        let evaluated_at = Utc::now();
        let results: Vec<Evaluation> = registry
            .entries
            .par_iter()
            .map(|entry| entry.criterion.evaluate(state).sanitized())
            .collect();

        let Registry { entries, log } = &mut *registry;
        let failures: Vec<FalsificationRecord> = entries
            .iter()
            .zip(&results)
            .filter(|(entry, evaluation)| {
                entry.state.status == CriterionStatus::Viable && !evaluation.passed
            })
            .map(|(entry, evaluation)| FalsificationRecord::Failed {
                name: entry.state.name.clone(),
                evaluation: evaluation.clone(),
                at: evaluated_at,
            })
            .collect();
        // All failures land in one write before any state changes.
        log.append_all(&failures)?;

        for (entry, evaluation) in entries.iter_mut().zip(results) {
            if entry.state.status == CriterionStatus::Viable && !evaluation.passed {
                tracing::warn!(
                    criterion = %entry.state.name,
                    inputs = ?evaluation.inputs,
                    "Falsification criterion failed"
                );
                entry.state.status = CriterionStatus::Failed;
            }
            entry.state.last_evaluated_at = Some(evaluated_at);
            entry.state.last_evaluation = Some(evaluation);
        }

        let criteria: Vec<CriterionState> = entries.iter().map(|e| e.state.clone()).collect();
        let status = system_status(&criteria, state);
        tracing::info!(criteria = criteria.len(), status = status.label(), "Evaluation pass complete");
        Ok(EvaluationSummary {
            evaluated_at,
            criteria,
            status,
        })
    }

    /// The only way back to viable. Logged permanently.
    pub fn reset(
        &self,
        name: &str,
        justification: NonEmptyString,
        actor: NonEmptyString,
    ) -> Result<(), RegistryError> {
        let mut registry = self.lock();
        let Registry { entries, log } = &mut *registry;
        let entry = entries
            .iter_mut()
            .find(|e| e.state.name == name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        if !entry.state.is_failed() {
            return Err(RegistryError::NotFailed(name.to_string()));
        }
        log.append(&FalsificationRecord::Reset {
            name: name.to_string(),
            justification: justification.clone(),
            actor: actor.clone(),
            at: Utc::now(),
        })?;
        tracing::warn!(criterion = %name, %actor, %justification, "Falsification criterion reset");
        entry.state.status = CriterionStatus::Viable;
        Ok(())
    }

    #[must_use]
    pub fn criteria(&self) -> Vec<CriterionState> {
        self.lock().entries.iter().map(|e| e.state.clone()).collect()
    }

    pub fn records(&self) -> Result<Vec<FalsificationRecord>, RegistryError> {
        Ok(self.lock().log.records()?)
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Valid iff every criterion is viable, no finding is critical and no
/// integrity event is open.
#[must_use]
pub fn system_status(criteria: &[CriterionState], state: &SystemState) -> SystemStatus {
    let mut reasons: Vec<String> = criteria
        .iter()
        .filter(|c| c.is_failed())
        .map(|c| format!("criterion '{}' failed: {}", c.name, c.description))
        .collect();

    let critical = state.findings.iter().filter(|f| f.is_critical()).count();
    if critical > 0 {
        reasons.push(format!("{critical} critical contamination finding(s)"));
    }
    if state.open_integrity_events > 0 {
        reasons.push(format!(
            "{} unresolved integrity event(s)",
            state.open_integrity_events
        ));
    }

    if reasons.is_empty() {
        SystemStatus::Valid
    } else {
        SystemStatus::Falsified { reasons }
    }
}
