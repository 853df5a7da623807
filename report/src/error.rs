use std::io;
use std::path::PathBuf;

use thiserror::Error;

use provenance_types::NodeId;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{what} references node {node}, which is not in the tree")]
    NotFound { what: String, node: NodeId },
    #[error("rendered report is missing {0}")]
    Parse(&'static str),
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write report to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
