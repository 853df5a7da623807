//! Falsification registry and monitor.
//!
//! Criteria are registered on a [`RegistryBuilder`] and closed into a
//! [`FalsificationMonitor`]; after that the set cannot grow. Each criterion is
//! `viable` until its predicate first fails, then `failed` until someone calls
//! [`FalsificationMonitor::reset`] with a written justification. Failures and
//! resets are appended to the falsification log.

mod builtins;
mod criterion;
mod error;
mod monitor;
mod state;

pub use builtins::{derived_value_present, relative_deviation, within_sigma};
pub use criterion::{Criterion, CriterionState, CriterionStatus, Evaluation, Predicate};
pub use error::RegistryError;
pub use monitor::{
    EvaluationSummary, FalsificationMonitor, FalsificationRecord, RegistryBuilder, system_status,
};
pub use state::{Measurement, SystemState, SystemStatus};
