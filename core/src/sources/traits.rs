use crate::diff::FilePatch;
use serde::{Deserialize, Serialize};

/// Repository metadata for one review session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoInfo {
    /// Absolute path of the working tree root.
    pub root: String,
    pub branch: String,
    /// Commit SHA of HEAD.
    pub head: String,
    /// Ref the changes are compared against, e.g. "main".
    pub base_ref: String,
    /// Merge-base commit of `base_ref` and HEAD.
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    /// Display name, e.g. "org/repo"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    /// URL to open in a browser, e.g. "https://github.com/org/repo"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_link: Option<String>,
}

/// Supplies the repository metadata and per-file patches a session is built from.
pub trait PatchSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn repo_info(&self) -> Result<RepoInfo, Self::Error>;

    /// One patch per changed file, in a stable order.
    fn file_patches(&self, repo: &RepoInfo) -> Result<Vec<FilePatch>, Self::Error>;
}
