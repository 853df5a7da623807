use thiserror::Error;

use provenance_utils::LogError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("criterion '{0}' is already registered")]
    DuplicateCriterion(String),
    #[error("criterion name must not be empty")]
    EmptyName,
    #[error("criterion '{0}' not found")]
    NotFound(String),
    #[error("criterion '{0}' has not failed; only failed criteria can be reset")]
    NotFailed(String),
    #[error(transparent)]
    Log(#[from] LogError),
}
