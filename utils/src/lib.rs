//! Shared infrastructure utilities for the provenance workspace.
//!
//! - **`append_log`**: Hash-chained JSON-lines logs that are only ever appended to
//! - **`digest`**: SHA-256 content digests in lowercase hex
//! - **`atomic_write`**: Crash-safe artifact persistence (temp + rename)

pub mod append_log;
pub mod atomic_write;
pub mod digest;

pub use append_log::{AppendLog, Envelope, GENESIS_HASH, LogError};
pub use atomic_write::{WriteMode, write_artifact};
pub use digest::{sha256_hex, sha256_reader};
