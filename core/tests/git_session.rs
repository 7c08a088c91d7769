//! Session build against a real git working tree.
//!
//! Skipped when `git` is not on PATH.

#![cfg(feature = "symbols-go")]

use review_refs::config::Config;
use review_refs::diff::FileStatus;
use review_refs::session::{build_session, NoReferences};
use review_refs::sources::{LocalGitSource, PatchSource};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const MAIN_GO: &str = "package main

func hello() int {
\treturn 1
}

// one
// two
// three

func caller() {
\thello()
}
";

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args([
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
        ])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap()
        .status;
    assert!(status.success(), "git {args:?} failed");
}

fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn init_repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    git(root, &["init", "-q"]);
    git(root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(root.join("main.go"), MAIN_GO).unwrap();
    git(root, &["add", "."]);
    git(root, &["commit", "-qm", "init"]);
    dir
}

#[tokio::test]
async fn test_session_from_working_tree() {
    if !git_available() {
        return;
    }
    let dir = init_repo();
    let root = dir.path();
    std::fs::write(root.join("main.go"), MAIN_GO.replace("return 1", "return 2")).unwrap();
    std::fs::write(root.join("helper.go"), "package main\n\nfunc Helper() {}\n").unwrap();

    let source = LocalGitSource::new(root.to_path_buf()).unwrap();
    let session = build_session(&source, &NoReferences, &Config::default())
        .await
        .unwrap();

    assert_eq!(session.repo.branch, "main");
    assert_eq!(session.repo.base_ref, "main");
    assert_eq!(session.summary.files, 2);

    let main = &session.files[0];
    assert_eq!(main.path, "main.go");
    assert_eq!(main.status, FileStatus::Modified);
    assert_eq!(main.language.as_deref(), Some("go"));
    let names: Vec<&str> = main.changed_spans.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["hello"]);
    let hello = &main.changed_spans[0];
    assert_eq!((hello.start_line, hello.end_line), (3, 5));
    assert_eq!((hello.anchor_line, hello.anchor_column), (2, 5));
    assert!(!hello.references_checked);

    let helper = &session.files[1];
    assert_eq!(helper.path, "helper.go");
    assert_eq!(helper.status, FileStatus::Added);
    assert_eq!(helper.changed_spans.len(), 1);
    assert_eq!(helper.changed_spans[0].name, "Helper");

    let json = serde_json::to_value(&session).unwrap();
    assert_eq!(json["files"][0]["changedSpans"][0]["anchorLine"], 2);
    assert_eq!(json["files"][1]["status"], "added");
}

#[tokio::test]
async fn test_added_lines_only_skips_context() {
    if !git_available() {
        return;
    }
    let dir = init_repo();
    let root = dir.path();
    // Only the comment block changes; hello stays in the hunk as context.
    std::fs::write(root.join("main.go"), MAIN_GO.replace("// two", "// 2")).unwrap();

    let source = LocalGitSource::new(root.to_path_buf()).unwrap();

    let with_context = build_session(&source, &NoReferences, &Config::default())
        .await
        .unwrap();
    let names: Vec<&str> = with_context.files[0]
        .changed_spans
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(names, vec!["hello", "caller"]);

    let config = Config {
        added_lines_only: true,
        ..Config::default()
    };
    let added_only = build_session(&source, &NoReferences, &config).await.unwrap();
    assert!(added_only.files[0].changed_spans.is_empty());
}

#[test]
fn test_explicit_base_is_reported() {
    if !git_available() {
        return;
    }
    let dir = init_repo();
    let source = LocalGitSource::new(dir.path().to_path_buf())
        .unwrap()
        .with_base(Some("HEAD".to_owned()));
    let repo = source.repo_info().unwrap();
    assert_eq!(repo.base_ref, "HEAD");
    assert_eq!(repo.base, repo.head);
    assert!(source.file_patches(&repo).unwrap().is_empty());
}
