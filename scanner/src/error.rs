use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("tolerance must be a finite number in (0, 1), got {0}")]
    InvalidTolerance(f64),
    #[error("reference constant '{0}' must have a finite value")]
    InvalidReference(String),
    #[error("invalid reasoning pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("failed to build phrase automaton: {0}")]
    Automaton(#[from] aho_corasick::BuildError),
}
