//! Builds the review session: every changed file with its changed spans and
//! the references to them.
//!
//! Only repository metadata and patch collection can fail the build. Each
//! file is analysed independently; anything that goes wrong for one file is
//! logged and recorded on that file as `analysisError`.

use crate::config::Config;
use crate::diff::{added_lines, new_file_lines, FilePatch, FileStatus};
use crate::sources::{PatchSource, RepoInfo};
use crate::symbols::extractor::extract_changed_spans;
use crate::symbols::languages::language_for_path;
use crate::symbols::ChangedSpan;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to get repo info: {0}")]
    RepoInfo(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Failed to collect patches: {0}")]
    Patches(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Patch collection task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Looks up references to the changed spans of one file.
///
/// Implementations return the spans in the same order, adding references
/// where they can, and never fail.
pub trait ReferenceFinder: Send + Sync {
    fn find_references<'a>(
        &'a self,
        root: &'a Path,
        spans: Vec<ChangedSpan>,
        path: &'a str,
    ) -> BoxFuture<'a, Vec<ChangedSpan>>;
}

/// Skips reference lookup entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl ReferenceFinder for NoReferences {
    fn find_references<'a>(
        &'a self,
        _root: &'a Path,
        spans: Vec<ChangedSpan>,
        _path: &'a str,
    ) -> BoxFuture<'a, Vec<ChangedSpan>> {
        Box::pin(async move { spans })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub path: String,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub patch: String,
    pub additions: u32,
    pub deletions: u32,
    #[serde(default)]
    pub changed_spans: Vec<ChangedSpan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
}

impl FileDiff {
    /// The patch this record was built from, for re-analysis.
    pub fn to_patch(&self) -> FilePatch {
        FilePatch {
            path: self.path.clone(),
            status: self.status,
            patch: self.patch.clone(),
            additions: self.additions,
            deletions: self.deletions,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub files: usize,
    pub add: u32,
    pub del: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub repo: RepoInfo,
    pub files: Vec<FileDiff>,
    pub summary: Summary,
    /// RFC 3339 timestamp.
    pub generated_at: String,
}

/// Repository metadata and per-file patches from `source`.
///
/// Sources shell out synchronously, so the work runs on the blocking pool.
pub async fn collect_patches<S>(source: &S) -> Result<(RepoInfo, Vec<FilePatch>), SessionError>
where
    S: PatchSource + Clone + Send + 'static,
{
    let source = source.clone();
    tokio::task::spawn_blocking(move || {
        let repo = source
            .repo_info()
            .map_err(|e| SessionError::RepoInfo(Box::new(e)))?;
        let patches = source
            .file_patches(&repo)
            .map_err(|e| SessionError::Patches(Box::new(e)))?;
        Ok((repo, patches))
    })
    .await?
}

/// Collect patches from `source` and analyse every file.
pub async fn build_session<S>(
    source: &S,
    finder: &dyn ReferenceFinder,
    config: &Config,
) -> Result<Session, SessionError>
where
    S: PatchSource + Clone + Send + 'static,
{
    let (repo, patches) = collect_patches(source).await?;

    info!(
        "[build_session] {} changed files on {} against {}",
        patches.len(),
        repo.branch,
        repo.base_ref
    );

    let root = PathBuf::from(&repo.root);
    let files: Vec<FileDiff> = stream::iter(patches)
        .map(|patch| analyze_file(&root, patch, finder, config))
        .buffered(config.concurrency.max(1))
        .collect()
        .await;

    let summary = Summary {
        files: files.len(),
        add: files.iter().map(|f| f.additions).sum(),
        del: files.iter().map(|f| f.deletions).sum(),
    };
    let spans: usize = files.iter().map(|f| f.changed_spans.len()).sum();
    info!("[build_session] done: {} files, {spans} changed spans", files.len());

    Ok(Session {
        repo,
        files,
        summary,
        generated_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// Map, extract and resolve one file. Never fails; problems end up in
/// `analysis_error` or simply as fewer spans and references.
pub async fn analyze_file(
    root: &Path,
    patch: FilePatch,
    finder: &dyn ReferenceFinder,
    config: &Config,
) -> FileDiff {
    let mut diff = FileDiff {
        language: language_for_path(&patch.path).map(|spec| spec.id.to_owned()),
        path: patch.path,
        status: patch.status,
        patch: patch.patch,
        additions: patch.additions,
        deletions: patch.deletions,
        changed_spans: Vec::new(),
        analysis_error: None,
    };

    if diff.status == FileStatus::Removed || diff.language.is_none() {
        return diff;
    }

    let lines = if config.added_lines_only {
        added_lines(&diff.patch)
    } else {
        new_file_lines(&diff.patch)
    };
    if lines.is_empty() {
        return diff;
    }

    let content = match tokio::fs::read(root.join(&diff.path)).await {
        Ok(content) => content,
        Err(e) => {
            warn!("[analyze_file] {}: {e}", diff.path);
            diff.analysis_error = Some(format!("Failed to read file: {e}"));
            return diff;
        }
    };

    let path = diff.path.clone();
    let extracted =
        tokio::task::spawn_blocking(move || extract_changed_spans(&path, &content, &lines)).await;
    let spans = match extracted {
        Ok(Ok(spans)) => spans,
        Ok(Err(e)) => {
            warn!("[analyze_file] {}: {e}", diff.path);
            diff.analysis_error = Some(e.to_string());
            return diff;
        }
        Err(e) => {
            warn!("[analyze_file] {}: extraction task failed: {e}", diff.path);
            diff.analysis_error = Some(format!("Extraction failed: {e}"));
            return diff;
        }
    };
    if spans.is_empty() {
        return diff;
    }

    let mut spans = finder.find_references(root, spans, &diff.path).await;
    attach_context(root, &mut spans, config.context_radius).await;
    diff.changed_spans = spans;
    diff
}

/// Fill in `context` / `contextStartLine` for every reference, reading each
/// referenced file once. Unreadable files leave the context empty.
pub async fn attach_context(root: &Path, spans: &mut [ChangedSpan], radius: u32) {
    let mut files: HashMap<String, Option<Vec<String>>> = HashMap::new();

    for reference in spans.iter_mut().flat_map(|s| s.references.iter_mut()) {
        if !files.contains_key(&reference.path) {
            let full = if Path::new(&reference.path).is_absolute() {
                PathBuf::from(&reference.path)
            } else {
                root.join(&reference.path)
            };
            let lines = tokio::fs::read_to_string(&full)
                .await
                .ok()
                .map(|text| text.lines().map(str::to_owned).collect());
            files.insert(reference.path.clone(), lines);
        }

        let Some(Some(lines)) = files.get(&reference.path) else {
            continue;
        };
        if let Some((start, snippet)) = context_window(lines, reference.line, radius) {
            reference.context = Some(snippet);
            reference.context_start_line = Some(start);
        }
    }
}

/// Lines `line - radius ..= line + radius` (1-based, clamped to the file).
fn context_window(lines: &[String], line: u32, radius: u32) -> Option<(u32, String)> {
    let total = lines.len() as u32;
    if line == 0 || line > total {
        return None;
    }
    let start = line.saturating_sub(radius).max(1);
    let end = line.saturating_add(radius).min(total);
    let snippet = lines[(start - 1) as usize..end as usize].join("\n");
    Some((start, snippet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Reference;
    use std::sync::{mpsc, Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Clone)]
    struct FakeSource {
        root: PathBuf,
        patches: Vec<FilePatch>,
    }

    #[derive(Debug, Error)]
    #[error("no repository here")]
    struct FakeError;

    impl PatchSource for FakeSource {
        type Error = FakeError;

        fn repo_info(&self) -> Result<RepoInfo, FakeError> {
            Ok(RepoInfo {
                root: self.root.display().to_string(),
                branch: "feature".to_owned(),
                head: "abc".to_owned(),
                base_ref: "main".to_owned(),
                base: "def".to_owned(),
                remote: None,
                repo_name: None,
                repo_link: None,
            })
        }

        fn file_patches(&self, _repo: &RepoInfo) -> Result<Vec<FilePatch>, FakeError> {
            Ok(self.patches.clone())
        }
    }

    #[derive(Clone)]
    struct BrokenSource;

    impl PatchSource for BrokenSource {
        type Error = FakeError;

        fn repo_info(&self) -> Result<RepoInfo, FakeError> {
            Err(FakeError)
        }

        fn file_patches(&self, _repo: &RepoInfo) -> Result<Vec<FilePatch>, FakeError> {
            Ok(Vec::new())
        }
    }

    /// Blocks in `repo_info` until the async side opens the gate.
    #[derive(Clone)]
    struct GatedSource {
        inner: FakeSource,
        gate: Arc<Mutex<mpsc::Receiver<()>>>,
    }

    impl PatchSource for GatedSource {
        type Error = FakeError;

        fn repo_info(&self) -> Result<RepoInfo, FakeError> {
            let gate = self.gate.lock().unwrap();
            gate.recv_timeout(Duration::from_secs(5))
                .map_err(|_| FakeError)?;
            self.inner.repo_info()
        }

        fn file_patches(&self, repo: &RepoInfo) -> Result<Vec<FilePatch>, FakeError> {
            self.inner.file_patches(repo)
        }
    }

    /// Points every span at line 2 of `other.go` and records what it was asked.
    #[derive(Default)]
    struct RecordingFinder {
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ReferenceFinder for RecordingFinder {
        fn find_references<'a>(
            &'a self,
            _root: &'a Path,
            mut spans: Vec<ChangedSpan>,
            path: &'a str,
        ) -> BoxFuture<'a, Vec<ChangedSpan>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push((
                    path.to_owned(),
                    spans.iter().map(|s| s.name.clone()).collect(),
                ));
                for span in &mut spans {
                    span.references.push(Reference {
                        path: "other.go".to_owned(),
                        line: 2,
                        start_column: 1,
                        end_column: 6,
                        context: None,
                        context_start_line: None,
                    });
                    span.references_checked = true;
                }
                spans
            })
        }
    }

    fn patch(path: &str, status: FileStatus, text: &str, additions: u32, deletions: u32) -> FilePatch {
        FilePatch {
            path: path.to_owned(),
            status,
            patch: text.to_owned(),
            additions,
            deletions,
        }
    }

    #[test]
    fn test_context_window() {
        let lines: Vec<String> = (1..=10).map(|i| format!("line {i}")).collect();
        assert_eq!(
            context_window(&lines, 5, 2),
            Some((3, "line 3\nline 4\nline 5\nline 6\nline 7".to_owned()))
        );
        assert_eq!(context_window(&lines, 1, 2), Some((1, "line 1\nline 2\nline 3".to_owned())));
        assert_eq!(context_window(&lines, 10, 1), Some((9, "line 9\nline 10".to_owned())));
        assert_eq!(context_window(&lines, 11, 2), None);
        assert_eq!(context_window(&lines, 0, 2), None);
    }

    #[tokio::test]
    async fn test_repo_info_failure_is_fatal() {
        let result = build_session(&BrokenSource, &NoReferences, &Config::default()).await;
        assert!(matches!(result, Err(SessionError::RepoInfo(_))));
    }

    // Single-threaded runtime: if the source ran on the runtime thread the
    // gate could never open and repo_info would time out.
    #[tokio::test]
    async fn test_patch_collection_runs_off_the_runtime_thread() {
        let (open, gate) = mpsc::channel();
        let source = GatedSource {
            inner: FakeSource {
                root: PathBuf::from("/repo"),
                patches: vec![patch("a.go", FileStatus::Added, "@@ -0,0 +1 @@\n+package a\n", 1, 0)],
            },
            gate: Arc::new(Mutex::new(gate)),
        };

        let opener = async {
            tokio::task::yield_now().await;
            open.send(()).unwrap();
        };
        let (collected, ()) = tokio::join!(collect_patches(&source), opener);

        let (repo, patches) = collected.unwrap();
        assert_eq!(repo.branch, "feature");
        assert_eq!(patches.len(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_recorded_not_fatal() {
        let dir = TempDir::new().unwrap();
        let source = FakeSource {
            root: dir.path().to_path_buf(),
            patches: vec![patch("missing.go", FileStatus::Modified, "@@ -1 +1 @@\n+x\n", 1, 0)],
        };
        let session = build_session(&source, &NoReferences, &Config::default())
            .await
            .unwrap();
        assert_eq!(session.files.len(), 1);
        assert!(session.files[0].analysis_error.is_some());
        assert!(session.files[0].changed_spans.is_empty());
    }

    #[cfg(feature = "symbols-go")]
    #[tokio::test]
    async fn test_build_session_end_to_end() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("main.go"),
            "package main\n\nfunc hello() {\n\tprintln(1)\n}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("other.go"), "package main\n\thello()\n").unwrap();

        let source = FakeSource {
            root: dir.path().to_path_buf(),
            patches: vec![
                patch("main.go", FileStatus::Modified, "@@ -3,3 +3,3 @@\n func hello() {\n-\tprintln(0)\n+\tprintln(1)\n }\n", 1, 1),
                patch("README.md", FileStatus::Modified, "@@ -1 +1 @@\n-a\n+b\n", 1, 1),
                patch("old.go", FileStatus::Removed, "@@ -1 +0,0 @@\n-package main\n", 0, 1),
            ],
        };
        let finder = RecordingFinder::default();
        let session = build_session(&source, &finder, &Config::default())
            .await
            .unwrap();

        let paths: Vec<&str> = session.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["main.go", "README.md", "old.go"]);
        assert_eq!(session.summary, Summary { files: 3, add: 2, del: 3 });

        let main = &session.files[0];
        assert_eq!(main.language.as_deref(), Some("go"));
        assert_eq!(main.changed_spans.len(), 1);
        let span = &main.changed_spans[0];
        assert_eq!(span.name, "hello");
        assert!(span.references_checked);
        let reference = &span.references[0];
        assert_eq!(reference.context.as_deref(), Some("package main\n\thello()"));
        assert_eq!(reference.context_start_line, Some(1));

        // Only files with spans reach the finder.
        let calls = finder.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("main.go".to_owned(), vec!["hello".to_owned()])]);

        assert!(session.files[1].language.is_none());
        assert!(session.files[2].changed_spans.is_empty());

        let json = serde_json::to_value(&session).unwrap();
        assert!(json["generatedAt"].is_string());
        assert_eq!(json["files"][0]["changedSpans"][0]["referencesChecked"], true);
    }
}
