use super::traits::{PatchSource, RepoInfo};
use crate::diff::{split_patches, FilePatch, FileStatus};
use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Information about the git remote (org/repo and browse URL)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Display name, e.g. "org/repo"
    pub name: String,
    /// URL to open in a browser, e.g. "https://github.com/org/repo"
    pub browse_url: String,
}

#[derive(Error, Debug)]
pub enum LocalGitError {
    #[error("Git error: {0}")]
    Git(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a git repository")]
    NotARepo,
}

/// Changes in a local working tree, compared against the merge base with a
/// base branch.
#[derive(Debug, Clone)]
pub struct LocalGitSource {
    repo_path: PathBuf,
    base_ref: Option<String>,
}

impl LocalGitSource {
    pub fn new(repo_path: PathBuf) -> Result<Self, LocalGitError> {
        if !repo_path.join(".git").exists() {
            return Err(LocalGitError::NotARepo);
        }
        Ok(Self {
            repo_path,
            base_ref: None,
        })
    }

    /// Compare against `base` instead of the detected default branch.
    #[must_use]
    pub fn with_base(mut self, base: Option<String>) -> Self {
        self.base_ref = base;
        self
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Get the current branch name
    pub fn get_current_branch(&self) -> Result<String, LocalGitError> {
        if let Ok(output) = self.run_git(&["rev-parse", "--abbrev-ref", "HEAD"]) {
            return Ok(output.trim().to_owned());
        }
        // Unborn branch: HEAD is symbolic ref but target has no commits
        let output = self.run_git(&["symbolic-ref", "--short", "HEAD"])?;
        Ok(output.trim().to_owned())
    }

    /// Get remote info (org/repo name and browse URL) from the origin remote
    pub fn get_remote_info(&self) -> Result<RemoteInfo, LocalGitError> {
        let url = self.run_git(&["remote", "get-url", "origin"])?;
        parse_remote_url(url.trim())
    }

    /// The well-known SHA for git's empty tree object.
    const EMPTY_TREE: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";

    /// Resolve a ref to a commit SHA hash, falling back to the empty tree
    /// if the ref doesn't exist (e.g., HEAD in an empty repo with no commits).
    pub fn resolve_ref_or_empty_tree(&self, git_ref: &str) -> String {
        match self.run_git(&["rev-parse", "--verify", git_ref]) {
            Ok(output) => output.trim().to_owned(),
            Err(_) => Self::EMPTY_TREE.to_owned(),
        }
    }

    /// Get the default branch name (origin's HEAD, then main or master)
    pub fn get_default_branch(&self) -> String {
        if let Ok(output) = self.run_git(&["symbolic-ref", "refs/remotes/origin/HEAD"]) {
            if let Some(branch) = output.trim().strip_prefix("refs/remotes/") {
                return branch.to_owned();
            }
        }
        for candidate in ["main", "master"] {
            if self.run_git(&["rev-parse", "--verify", candidate]).is_ok() {
                return candidate.to_owned();
            }
        }
        "HEAD".to_owned()
    }

    fn get_merge_base(&self, ref1: &str, ref2: &str) -> Result<String, LocalGitError> {
        let output = self.run_git(&["merge-base", ref1, ref2])?;
        Ok(output.trim().to_owned())
    }

    fn get_untracked_files(&self) -> Result<Vec<String>, LocalGitError> {
        let output = self.run_git(&["ls-files", "--others", "--exclude-standard"])?;
        Ok(output.lines().map(str::to_owned).collect())
    }

    /// Patches for untracked files, shown as whole-file additions.
    fn untracked_patches(&self) -> Vec<FilePatch> {
        let untracked = match self.get_untracked_files() {
            Ok(files) => files,
            Err(e) => {
                debug!("[LocalGitSource] could not list untracked files: {e}");
                return Vec::new();
            }
        };
        untracked
            .into_iter()
            .filter_map(|path| match std::fs::read(self.repo_path.join(&path)) {
                Ok(content) => added_file_patch(path, &content),
                Err(e) => {
                    debug!("[LocalGitSource] skipping untracked {path}: {e}");
                    None
                }
            })
            .collect()
    }

    fn run_git(&self, args: &[&str]) -> Result<String, LocalGitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(LocalGitError::Git(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }
}

impl PatchSource for LocalGitSource {
    type Error = LocalGitError;

    fn repo_info(&self) -> Result<RepoInfo, LocalGitError> {
        let root = self.run_git(&["rev-parse", "--show-toplevel"])?;
        let branch = self.get_current_branch()?;
        let head = self.resolve_ref_or_empty_tree("HEAD");
        let base_ref = self
            .base_ref
            .clone()
            .unwrap_or_else(|| self.get_default_branch());
        let base = match self.get_merge_base(&base_ref, &head) {
            Ok(base) => base,
            Err(_) => self.resolve_ref_or_empty_tree(&base_ref),
        };

        let remote = self
            .run_git(&["remote", "get-url", "origin"])
            .ok()
            .map(|url| url.trim().to_owned())
            .filter(|url| !url.is_empty());
        let parsed = remote.as_deref().and_then(|url| parse_remote_url(url).ok());

        Ok(RepoInfo {
            root: root.trim().to_owned(),
            branch,
            head,
            base_ref,
            base,
            remote,
            repo_name: parsed.as_ref().map(|r| r.name.clone()),
            repo_link: parsed.map(|r| r.browse_url),
        })
    }

    /// Working tree against the merge base, plus untracked files.
    fn file_patches(&self, repo: &RepoInfo) -> Result<Vec<FilePatch>, LocalGitError> {
        let output = self.run_git(&[
            "-c",
            "core.quotePath=false",
            "diff",
            "--no-color",
            "--no-ext-diff",
            "--src-prefix=a/",
            "--dst-prefix=b/",
            &repo.base,
            "--",
        ])?;

        let mut patches = split_patches(&output);
        patches.extend(self.untracked_patches());
        Ok(patches)
    }
}

/// Build an all-additions patch for a file git does not track yet.
///
/// Binary content (anything with a NUL byte) yields no patch.
fn added_file_patch(path: String, content: &[u8]) -> Option<FilePatch> {
    if content.contains(&0) {
        return None;
    }
    let text = String::from_utf8_lossy(content);
    let lines: Vec<&str> = text.lines().collect();

    let mut patch = String::new();
    if !lines.is_empty() {
        patch.push_str(&format!("@@ -0,0 +1,{} @@\n", lines.len()));
    }
    for line in &lines {
        patch.push('+');
        patch.push_str(line);
        patch.push('\n');
    }

    Some(FilePatch {
        path,
        status: FileStatus::Added,
        patch,
        additions: lines.len() as u32,
        deletions: 0,
    })
}

/// Parse a git remote URL into org/repo name and browse URL.
///
/// Supported formats:
/// - `https://github.com/org/repo.git`
/// - `https://github.com/org/repo`
/// - `git@github.com:org/repo.git`
/// - `ssh://git@github.com/org/repo.git`
pub fn parse_remote_url(url: &str) -> Result<RemoteInfo, LocalGitError> {
    // SSH shorthand: git@host:org/repo.git
    if let Some(rest) = url.strip_prefix("git@") {
        if let Some((host, path)) = rest.split_once(':') {
            let path = path.strip_suffix(".git").unwrap_or(path);
            return Ok(RemoteInfo {
                name: path.to_owned(),
                browse_url: format!("https://{host}/{path}"),
            });
        }
    }

    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| url.strip_prefix("ssh://"));

    if let Some(without_scheme) = without_scheme {
        let without_user = without_scheme
            .split_once('@')
            .map_or(without_scheme, |(_user, rest)| rest);

        if let Some((host, path)) = without_user.split_once('/') {
            let path = path.strip_suffix(".git").unwrap_or(path);
            // Need at least org/repo
            if path.contains('/') {
                return Ok(RemoteInfo {
                    name: path.to_owned(),
                    browse_url: format!("https://{host}/{path}"),
                });
            }
        }
    }

    Err(LocalGitError::Git(format!(
        "Could not parse remote URL: {url}"
    )))
}
