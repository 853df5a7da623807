//! Append-only record of scan runs.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use provenance_types::{ContaminationFinding, DerivationTree, NodeId, Timestamp};
use provenance_utils::{AppendLog, LogError};

/// One scan run as persisted in the finding log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRun {
    pub run_id: u64,
    /// Output name of the scanned tree, or the source name.
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<NodeId>,
    pub scanned_at: Timestamp,
    pub findings: Vec<ContaminationFinding>,
}

#[derive(Debug)]
pub struct FindingLog {
    log: AppendLog<ScanRun>,
}

impl FindingLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        Ok(Self {
            log: AppendLog::open(path)?,
        })
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            log: AppendLog::in_memory(),
        }
    }

    pub fn record_tree(
        &mut self,
        tree: &DerivationTree,
        findings: &[ContaminationFinding],
    ) -> Result<ScanRun, LogError> {
        self.append(tree.output_name.clone(), Some(tree.output), findings)
    }

    pub fn record_source(
        &mut self,
        source: &str,
        findings: &[ContaminationFinding],
    ) -> Result<ScanRun, LogError> {
        self.append(source.to_string(), None, findings)
    }

    pub fn runs(&self) -> Result<Vec<ScanRun>, LogError> {
        self.log.records()
    }

    pub fn verify(&self) -> Result<u64, LogError> {
        self.log.verify()
    }

    fn append(
        &mut self,
        subject: String,
        output: Option<NodeId>,
        findings: &[ContaminationFinding],
    ) -> Result<ScanRun, LogError> {
        let run = ScanRun {
            run_id: self.log.len(),
            subject,
            output,
            scanned_at: Utc::now(),
            findings: findings.to_vec(),
        };
        self.log.append(&run)?;
        tracing::debug!(run = run.run_id, subject = %run.subject, findings = run.findings.len(), "Recorded scan run");
        Ok(run)
    }
}
