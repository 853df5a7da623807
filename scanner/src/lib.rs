//! Contamination scanner.
//!
//! Five layers run over every tree, always all of them, in this order:
//!
//! | Layer | Looks at | Default severity |
//! |-------|----------|------------------|
//! | lexical | expressions and documentation, NFKC-folded | warning |
//! | numerical | `numeric_value` against reference constants | warning |
//! | reasoning | circular-justification phrasing | warning |
//! | contextual | declared vs structurally reachable axioms | warning / info |
//! | structural | tree invariants, empirical inputs | critical / info |
//!
//! Only the structural layer hard-fails a tree. Heuristic findings are
//! escalated to critical when the same node also fails structurally.

mod config;
mod error;
mod layers;
mod log;
mod scanner;
mod text;

pub use config::{
    DEFAULT_LEXICAL_PHRASES, DEFAULT_MIN_LITERAL_DIGITS, DEFAULT_REASONING_PATTERNS,
    DEFAULT_SHALLOW_DEPTH, DEFAULT_TOLERANCE, ReferenceConstant, ScanConfig, default_references,
};
pub use error::ScanError;
pub use log::{FindingLog, ScanRun};
pub use scanner::{Scanner, blocks_validity, corroborate, is_hard_failure};
