//! review-refs library: which symbols did a diff touch, and who uses them.
//!
//! This crate provides:
//! - Unified diff splitting and new-file line mapping (`diff`)
//! - Tree-sitter extraction of the declarations enclosing changed lines (`symbols`)
//! - A Language Server Protocol client and per-file reference resolver (`lsp`)
//! - Local git patch collection (`sources`) and session building (`session`)
//!
//! Feature flags:
//! - `lsp`: reference lookup through external language servers
//! - `cli`: Command-line interface
//! - `server`: Local HTTP endpoint for the session viewer

// Core modules
pub mod config;
pub mod diff;
pub mod error;
pub mod session;
pub mod sources;
pub mod symbols;

#[cfg(feature = "lsp")]
pub mod lsp;

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use error::AppError;
pub use session::{build_session, Session};
