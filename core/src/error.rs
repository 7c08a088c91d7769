use serde::Serialize;
use thiserror::Error;

/// Unified error type for the CLI and HTTP surface.
///
/// Serializes to `{"type": ..., "details": {...}}` so the HTTP endpoint can
/// hand it to the viewer unchanged.
#[derive(Error, Debug, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    #[error("Git error: {message}")]
    Git { message: String, operation: String },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error("Analyzer error: {message}")]
    Analyzer { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },
}

impl AppError {
    /// Create a Git error with operation context
    pub fn git(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Git {
            message: message.into(),
            operation: operation.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn analyzer(message: impl Into<String>) -> Self {
        Self::Analyzer {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (user can retry or take action)
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Git and IO failures are often transient; analyzers can be
            // installed or restarted.
            Self::Git { .. } | Self::Analyzer { .. } | Self::Io { .. } => true,
            // Won't change on retry without the user editing something
            Self::Config { .. } | Self::NotFound { .. } | Self::Parse { .. } => false,
        }
    }
}

impl From<crate::sources::LocalGitError> for AppError {
    fn from(err: crate::sources::LocalGitError) -> Self {
        use crate::sources::LocalGitError;
        match err {
            LocalGitError::Git(msg) => AppError::git(msg.trim(), "git"),
            LocalGitError::Io(e) => AppError::io(e.to_string()),
            LocalGitError::NotARepo => AppError::not_found("git repository"),
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        AppError::config(err.to_string())
    }
}

impl From<crate::session::SessionError> for AppError {
    fn from(err: crate::session::SessionError) -> Self {
        use crate::session::SessionError;
        match err {
            SessionError::RepoInfo(e) => AppError::git(e.to_string().trim(), "repo-info"),
            SessionError::Patches(e) => AppError::git(e.to_string().trim(), "diff"),
            SessionError::Task(e) => AppError::io(e.to_string()),
        }
    }
}

impl From<crate::symbols::extractor::ExtractError> for AppError {
    fn from(err: crate::symbols::extractor::ExtractError) -> Self {
        AppError::parse(err.to_string())
    }
}

#[cfg(feature = "lsp")]
impl From<crate::lsp::LspError> for AppError {
    fn from(err: crate::lsp::LspError) -> Self {
        AppError::analyzer(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::io(err.to_string())
    }
}

impl From<AppError> for String {
    fn from(err: AppError) -> Self {
        err.to_string()
    }
}
