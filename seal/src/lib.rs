//! Experimental data seal.
//!
//! Datasets are frozen by SHA-256 digest before any prediction is compared
//! with them. Every seal, prediction, comparison, tamper detection and
//! resolution is appended to the seal log; nothing is ever overwritten.
//!
//! Tamper events and temporal ordering violations are integrity events, not
//! errors: they are returned as values, logged, and stay open until someone
//! resolves them with a stated justification.

mod error;
mod ordering;
mod record;
mod seal;

pub use error::SealError;
pub use ordering::check_temporal_ordering;
pub use record::{
    Comparison, IntegrityEvent, IntegritySnapshot, OrderingBreach, Prediction, Resolution,
    SealLogRecord, SealedDataset, TamperEvent, TemporalOrderingViolation,
};
pub use seal::{DataSeal, VerifyOutcome, digest_offloaded};
