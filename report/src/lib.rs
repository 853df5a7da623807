//! Audit report generation.
//!
//! [`generate`] combines a derivation tree, its scan findings, the latest
//! falsification summary and the seal's integrity state into a [`Report`].
//! The Markdown rendering leads with the overall status so a falsified
//! derivation cannot be mistaken for a clean one; [`parse_rendered`] reads the
//! headline numbers back out of it.

mod error;
mod render;
mod report;

pub use error::ReportError;
pub use render::{ReportSummary, parse_rendered};
pub use report::{IntegritySection, NodeRow, Report, generate, write_report, write_report_json};
