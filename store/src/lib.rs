//! Derivation node store and tree builder.
//!
//! ```text
//! derivation routine ──step()──▶ TreeBuilder ──create_node()──▶ NodeStore
//!                                     │                            │
//!                                  finish()                  nodes.jsonl (append-only)
//!                                     ▼
//!                              DerivationTree
//! ```
//!
//! The store owns every node; trees are frozen, reachable subgraphs of it.
//! A single mutex serializes id allocation, graph mutation and log writes, so
//! independent derivation runs can share one `Arc<NodeStore>`.

mod builder;
mod error;
mod store;

pub use builder::{StepInput, TreeBuilder};
pub use error::{BuildError, InvalidDependency, StoreError};
pub use store::{NewNode, NodeLogRecord, NodeStore};
