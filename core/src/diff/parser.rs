//! Unified diff text: new-file line numbers per hunk and per-file splitting.

use serde::{Deserialize, Serialize};

/// Change status of one file in a multi-file diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

/// The patch text for a single file, split out of a multi-file diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePatch {
    pub path: String,
    pub status: FileStatus,
    /// Hunks only (starting at the first `@@` header), without the git file headers.
    pub patch: String,
    pub additions: u32,
    pub deletions: u32,
}

/// Line numbers in the new version of the file for every added or context line.
///
/// Removed lines and the `\ No newline at end of file` marker are skipped.
/// Lines before the first hunk header, and lines after a malformed header,
/// produce nothing.
pub fn new_file_lines(patch: &str) -> Vec<u32> {
    walk_new_lines(patch, true)
}

/// Like [`new_file_lines`], but only for lines the patch added.
pub fn added_lines(patch: &str) -> Vec<u32> {
    walk_new_lines(patch, false)
}

fn walk_new_lines(patch: &str, include_context: bool) -> Vec<u32> {
    let mut lines = Vec::new();
    let mut current_line: Option<u32> = None;

    for line in patch.lines() {
        if line.starts_with("@@") {
            current_line = parse_hunk_header(line).map(|(_, _, new_start, _)| new_start);
            continue;
        }

        let Some(current) = current_line else {
            continue;
        };

        let in_new_file = if line.starts_with('+') && !line.starts_with("+++") {
            lines.push(current);
            true
        } else if line.starts_with(' ') {
            if include_context {
                lines.push(current);
            }
            true
        } else {
            // '-' lines are absent from the new file and '\' lines are markers.
            false
        };
        if in_new_file {
            // A hunk running past u32::MAX ends here.
            current_line = current.checked_add(1);
        }
    }

    lines
}

/// Split a combined `git diff` output into per-file patches.
///
/// Each section starts at a `diff --git` line. The path comes from the
/// `+++ b/` line, or from `--- a/` when the file was deleted.
pub fn split_patches(diff_output: &str) -> Vec<FilePatch> {
    let mut patches = Vec::new();
    let mut current: Option<PatchBuilder> = None;

    for line in diff_output.lines() {
        if let Some(header) = line.strip_prefix("diff --git ") {
            if let Some(builder) = current.take() {
                patches.extend(builder.build());
            }
            current = Some(PatchBuilder::new(header));
            continue;
        }

        let Some(builder) = current.as_mut() else {
            continue;
        };

        if builder.in_hunks {
            builder.push_hunk_line(line);
        } else if line.starts_with("@@") {
            builder.in_hunks = true;
            builder.push_hunk_line(line);
        } else if let Some(path) = line.strip_prefix("+++ b/") {
            builder.new_path = Some(path.to_owned());
        } else if line.starts_with("+++ /dev/null") || line.starts_with("deleted file mode") {
            builder.status = FileStatus::Removed;
        } else if let Some(path) = line.strip_prefix("--- a/") {
            builder.old_path = Some(path.to_owned());
        } else if line.starts_with("new file mode") {
            builder.status = FileStatus::Added;
        } else if let Some(path) = line.strip_prefix("rename to ") {
            builder.status = FileStatus::Renamed;
            builder.new_path = Some(path.to_owned());
        }
    }

    if let Some(builder) = current {
        patches.extend(builder.build());
    }

    patches
}

struct PatchBuilder {
    /// Fallback path from the `diff --git a/x b/x` line, used for mode-only
    /// changes and binary files that have no `+++` line.
    header_path: Option<String>,
    old_path: Option<String>,
    new_path: Option<String>,
    status: FileStatus,
    in_hunks: bool,
    patch: String,
    additions: u32,
    deletions: u32,
}

impl PatchBuilder {
    fn new(header: &str) -> Self {
        let header_path = header
            .split_once(" b/")
            .map(|(_, path)| path.to_owned());
        Self {
            header_path,
            old_path: None,
            new_path: None,
            status: FileStatus::Modified,
            in_hunks: false,
            patch: String::new(),
            additions: 0,
            deletions: 0,
        }
    }

    fn push_hunk_line(&mut self, line: &str) {
        if line.starts_with('+') && !line.starts_with("+++") {
            self.additions += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            self.deletions += 1;
        }
        self.patch.push_str(line);
        self.patch.push('\n');
    }

    fn build(self) -> Option<FilePatch> {
        let path = match self.status {
            FileStatus::Removed => self.old_path.or(self.header_path),
            _ => self.new_path.or(self.header_path),
        }?;
        Some(FilePatch {
            path,
            status: self.status,
            patch: self.patch,
            additions: self.additions,
            deletions: self.deletions,
        })
    }
}

fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32)> {
    // @@ -1,5 +1,7 @@ optional context
    let line = line.strip_prefix("@@ ")?;
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() < 2 {
        return None;
    }

    let old = parts[0].strip_prefix('-')?;
    let new = parts[1].strip_prefix('+')?;

    let (old_start, old_count) = parse_range(old)?;
    let (new_start, new_count) = parse_range(new)?;

    Some((old_start, old_count, new_start, new_count))
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    if let Some((start, count)) = range.split_once(',') {
        Some((start.parse().ok()?, count.parse().ok()?))
    } else {
        // Single line: "5" means line 5, count 1
        Some((range.parse().ok()?, 1))
    }
}
