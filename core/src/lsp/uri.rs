//! Conversions between file paths, `file://` URIs and LSP positions.

use super::LspError;
use lsp_types::Uri;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// `file://` URI for an absolute path.
pub fn path_to_uri(path: &Path) -> Result<Uri, LspError> {
    let url = Url::from_file_path(path).map_err(|()| LspError::Uri(path.display().to_string()))?;
    Uri::from_str(url.as_str()).map_err(|_| LspError::Uri(url.to_string()))
}

/// Local path of a `file://` URI.
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    Url::parse(uri).ok()?.to_file_path().ok()
}

/// Path of `uri` relative to `root`, with `/` separators.
///
/// Locations outside the root keep their absolute path, and URIs that are
/// not local files are returned as-is.
pub fn uri_to_relative_path(root: &Path, uri: &str) -> String {
    let Some(path) = uri_to_path(uri) else {
        return uri.to_owned();
    };

    // Analyzers often report canonical paths (e.g. /private/var on macOS)
    // while the root may have been given through a symlink.
    let roots = [Some(root.to_path_buf()), root.canonicalize().ok()];
    let paths = [Some(path.clone()), path.canonicalize().ok()];
    for candidate in paths.iter().flatten() {
        for base in roots.iter().flatten() {
            if let Ok(relative) = candidate.strip_prefix(base) {
                return relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
            }
        }
    }
    path.to_string_lossy().into_owned()
}

/// Convert a byte column within `line` to UTF-16 code units.
///
/// Columns past the end of the line, or inside a multi-byte character, are
/// returned unchanged.
pub fn utf16_column(line: &str, byte_column: usize) -> u32 {
    line.get(..byte_column)
        .map_or(byte_column, |prefix| prefix.encode_utf16().count()) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_path_to_uri_round_trips() {
        let uri = path_to_uri(Path::new("/repo/src/main.go")).unwrap();
        assert_eq!(uri.as_str(), "file:///repo/src/main.go");
        assert_eq!(
            uri_to_path(uri.as_str()).unwrap(),
            PathBuf::from("/repo/src/main.go")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_path_with_spaces_is_escaped() {
        let uri = path_to_uri(Path::new("/my repo/a b.ts")).unwrap();
        assert_eq!(uri.as_str(), "file:///my%20repo/a%20b.ts");
        assert_eq!(
            uri_to_relative_path(Path::new("/my repo"), uri.as_str()),
            "a b.ts"
        );
    }

    #[test]
    fn test_path_to_uri_rejects_relative_path() {
        assert!(path_to_uri(Path::new("src/main.go")).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_relative_path_inside_and_outside_root() {
        let root = Path::new("/work/repo");
        assert_eq!(
            uri_to_relative_path(root, "file:///work/repo/pkg/server.go"),
            "pkg/server.go"
        );
        assert_eq!(
            uri_to_relative_path(root, "file:///usr/lib/go/src/fmt/print.go"),
            "/usr/lib/go/src/fmt/print.go"
        );
        assert_eq!(
            uri_to_relative_path(root, "jdt://contents/rt.jar"),
            "jdt://contents/rt.jar"
        );
    }

    #[test]
    fn test_utf16_column() {
        assert_eq!(utf16_column("func hello()", 5), 5);
        // 'é' is 2 bytes, 1 UTF-16 unit; '😀' is 4 bytes, 2 units.
        assert_eq!(utf16_column("é = x", 3), 2);
        assert_eq!(utf16_column("😀 x", 5), 3);
        assert_eq!(utf16_column("short", 40), 40);
    }
}
