//! User configuration, read from `config.json` in the review-refs home.
//!
//! The home directory is `$REVIEW_REFS_HOME` if set, otherwise
//! `~/.review-refs`. A missing file means defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHomeDir,
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How to launch a language analyzer for one file extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerCommand {
    /// Executable name or path. Empty disables analysis for the extension.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// `languageId` sent with `textDocument/didOpen`.
    #[serde(default)]
    pub language_id: String,
}

impl AnalyzerCommand {
    pub fn new(command: &str, args: &[&str], language_id: &str) -> Self {
        Self {
            command: command.to_owned(),
            args: args.iter().map(|a| (*a).to_owned()).collect(),
            language_id: language_id.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub request_timeout_ms: u64,
    /// Files analysed at the same time within one session build.
    pub concurrency: usize,
    /// Lines of context captured on each side of a reference.
    pub context_radius: u32,
    /// Only map `+` lines to spans, ignoring context lines.
    pub added_lines_only: bool,
    /// Extension (without dot) to analyzer, merged over the built-in table.
    pub analyzers: HashMap<String, AnalyzerCommand>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            concurrency: 4,
            context_radius: 2,
            added_lines_only: false,
            analyzers: HashMap::new(),
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("[Config::load_from] no config at {}", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// `$REVIEW_REFS_HOME` or `~/.review-refs`.
pub fn home_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(custom) = std::env::var("REVIEW_REFS_HOME") {
        return Ok(PathBuf::from(custom));
    }
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".review-refs"))
}

pub fn default_path() -> Result<PathBuf, ConfigError> {
    Ok(home_dir()?.join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "requestTimeoutMs": 2500,
                "analyzers": {
                    "go": { "command": "/opt/bin/gopls", "args": ["serve"] },
                    "py": { "command": "" }
                }
            }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.request_timeout_ms, 2500);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.analyzers["go"].command, "/opt/bin/gopls");
        assert_eq!(config.analyzers["go"].args, vec!["serve"]);
        assert!(config.analyzers["go"].language_id.is_empty());
        assert!(config.analyzers["py"].command.is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Json { .. })
        ));
    }
}
