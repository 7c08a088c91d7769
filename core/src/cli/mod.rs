pub mod commands;

use crate::config::Config;
use crate::error::AppError;
use crate::lsp::{AnalyzerRegistry, ReferenceResolver};
use crate::session::{self, NoReferences, ReferenceFinder, Session};
use crate::sources::LocalGitSource;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "review-refs")]
#[command(author, version, about = "Show the symbols a diff touches and who references them", long_about = None)]
pub struct Cli {
    /// Repository path (defaults to current directory)
    #[arg(short, long, global = true)]
    pub repo: Option<String>,

    /// Base ref to diff the working tree against (defaults to the default branch)
    #[arg(short, long, global = true)]
    pub base: Option<String>,

    /// Config file (default: ~/.review-refs/config.json, env: REVIEW_REFS_HOME)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List changed spans and their references (default)
    Spans {
        /// Only analyse this file
        file: Option<String>,

        /// Skip the language analyzers
        #[arg(long)]
        no_refs: bool,
    },

    /// Print the full session as JSON
    Session {
        /// Skip the language analyzers
        #[arg(long)]
        no_refs: bool,
    },

    /// Serve the session over HTTP on 127.0.0.1
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (0 picks a free one)
        #[arg(short, long, default_value_t = crate::server::DEFAULT_PORT)]
        port: u16,
    },
}

impl Cli {
    /// Get the repository path, using current directory as default
    pub fn get_repo_path(&self) -> Result<String, String> {
        if let Some(ref repo) = self.repo {
            return Ok(repo.clone());
        }

        let cwd = std::env::current_dir().map_err(|e| e.to_string())?;

        let mut current = cwd.as_path();
        loop {
            if current.join(".git").exists() {
                return Ok(current.to_string_lossy().to_string());
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Err("Not a git repository. Use --repo to specify a repository path.".to_owned())
    }

    fn load_config(&self) -> Result<Config, AppError> {
        let config = match self.config {
            Some(ref path) => Config::load_from(Path::new(path))?,
            None => Config::load()?,
        };
        Ok(config)
    }
}

/// Everything a command needs to analyse one repository.
pub struct Workspace {
    pub source: LocalGitSource,
    pub config: Config,
    pub resolver: ReferenceResolver,
    /// Fires on Ctrl-C; aborts in-flight analyzer calls.
    pub cancel: CancellationToken,
}

impl Workspace {
    pub fn open(repo_path: PathBuf, base: Option<String>, config: Config) -> Result<Self, AppError> {
        let source = LocalGitSource::new(repo_path)?.with_base(base);
        let cancel = CancellationToken::new();
        let resolver = ReferenceResolver::new(AnalyzerRegistry::with_overrides(&config.analyzers))
            .with_timeout(config.request_timeout())
            .with_cancellation(cancel.clone());
        Ok(Self {
            source,
            config,
            resolver,
            cancel,
        })
    }

    pub fn finder(&self, with_refs: bool) -> &dyn ReferenceFinder {
        if with_refs {
            &self.resolver
        } else {
            &NoReferences
        }
    }

    pub async fn build_session(&self, with_refs: bool) -> Result<Session, AppError> {
        let session =
            session::build_session(&self.source, self.finder(with_refs), &self.config).await?;
        Ok(session)
    }
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<(), String> {
    let repo_path = cli.get_repo_path()?;
    let config = cli.load_config()?;
    let workspace = Workspace::open(PathBuf::from(&repo_path), cli.base.clone(), config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;

    runtime.block_on(async move {
        let cancel = workspace.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, cancelling analyzer calls");
                cancel.cancel();
            }
        });

        match cli.command {
            None => commands::spans::run(&workspace, None, false, cli.format).await,
            Some(Commands::Spans { file, no_refs }) => {
                commands::spans::run(&workspace, file.as_deref(), no_refs, cli.format).await
            }
            Some(Commands::Session { no_refs }) => {
                commands::session::run(&workspace, no_refs).await
            }
            #[cfg(feature = "server")]
            Some(Commands::Serve { port }) => commands::serve::run(workspace, port).await,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "review-refs",
            "spans",
            "src/main.go",
            "--no-refs",
            "--base",
            "origin/develop",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.base.as_deref(), Some("origin/develop"));
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Some(Commands::Spans { file, no_refs }) => {
                assert_eq!(file.as_deref(), Some("src/main.go"));
                assert!(no_refs);
            }
            other => panic!("Wrong command: {other:?}"),
        }
    }

    #[test]
    fn test_no_subcommand_defaults() {
        let cli = Cli::try_parse_from(["review-refs", "--repo", "/tmp/x"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
        assert_eq!(cli.get_repo_path().unwrap(), "/tmp/x");
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let cli = Cli::try_parse_from([
            "review-refs",
            "--config",
            path.to_str().unwrap(),
            "session",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.concurrency, 4);
    }

    #[test]
    fn test_workspace_requires_git_repo() {
        let dir = tempfile::tempdir().unwrap();
        let result = Workspace::open(dir.path().to_path_buf(), None, Config::default());
        assert!(matches!(result, Err(AppError::NotFound { .. })));
    }
}
