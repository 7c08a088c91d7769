//! Generated and vendored file detection.
//!
//! Files matching these patterns are skipped before parsing: they are either
//! machine-written (minified bundles, protobuf output) or lock files.

use glob::Pattern;
use std::path::Path;
use std::sync::LazyLock;

const GENERATED_PATTERNS: &[&str] = &[
    "*.min.js",
    "*.min.css",
    "*.bundle.js",
    "*.pb.go",
    "*.pb.gw.go",
    "*_pb2.py",
    "*_pb2_grpc.py",
    "*_pb.js",
    "*_pb.d.ts",
    "*_gen.go",
    "*generated.go",
    "*.generated.ts",
    "*.d.ts.map",
    "package-lock.json",
    "npm-shrinkwrap.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.sum",
    "Cargo.lock",
    "poetry.lock",
    "Gemfile.lock",
];

static PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    GENERATED_PATTERNS
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
});

/// Check whether a file looks generated, based on its file name.
pub fn is_generated(file_path: &str) -> bool {
    let file_name = Path::new(file_path)
        .file_name()
        .map_or(file_path.into(), |n| n.to_string_lossy());
    PATTERNS.iter().any(|p| p.matches(&file_name))
}
