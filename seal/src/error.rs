use std::io;
use std::path::PathBuf;

use thiserror::Error;

use provenance_utils::LogError;

#[derive(Debug, Error)]
pub enum SealError {
    #[error("dataset '{0}' is already sealed")]
    AlreadySealed(String),
    #[error("prediction '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("integrity event #{0} not found")]
    UnknownEvent(u64),
    #[error("integrity event #{0} is already resolved")]
    AlreadyResolved(u64),
    #[error("digest must be 64 lowercase hex characters, got '{0}'")]
    InvalidDigest(String),
    #[error("prediction '{0}' must have a finite value")]
    NonFiniteValue(String),
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("digest task failed: {0}")]
    Offload(#[from] tokio::task::JoinError),
    #[error("seal log replay failed at seq {seq}: {reason}")]
    Replay { seq: u64, reason: String },
    #[error(transparent)]
    Log(#[from] LogError),
}

impl SealError {
    pub(crate) fn not_found(kind: &'static str, name: &str) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }
}
