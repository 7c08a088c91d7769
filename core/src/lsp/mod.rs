//! Language Server Protocol plumbing: framing, a generic client, and the
//! per-file reference resolver built on top of it.

pub mod client;
pub mod framing;
pub mod registry;
pub mod resolver;
pub mod uri;

pub use client::ProtocolClient;
pub use registry::AnalyzerRegistry;
pub use resolver::ReferenceResolver;

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LspError {
    #[error("Failed to start analyzer {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },
    #[error("Request cancelled")]
    Cancelled,
    #[error("Analyzer connection closed")]
    Disconnected,
    #[error("Analyzer returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Invalid URI: {0}")]
    Uri(String),
}
