//! Which analyzer to launch for which file extension.

use crate::config::AnalyzerCommand;
use std::collections::HashMap;
use std::path::Path;

/// Built-in analyzers: extension, command, args, LSP language id.
const DEFAULT_ANALYZERS: &[(&str, &str, &[&str], &str)] = &[
    ("go", "gopls", &[], "go"),
    ("ts", "typescript-language-server", &["--stdio"], "typescript"),
    ("tsx", "typescript-language-server", &["--stdio"], "typescriptreact"),
    ("js", "typescript-language-server", &["--stdio"], "javascript"),
    ("jsx", "typescript-language-server", &["--stdio"], "javascriptreact"),
    ("mjs", "typescript-language-server", &["--stdio"], "javascript"),
    ("cjs", "typescript-language-server", &["--stdio"], "javascript"),
    ("rs", "rust-analyzer", &[], "rust"),
    ("py", "pyright-langserver", &["--stdio"], "python"),
];

#[derive(Debug, Clone)]
pub struct AnalyzerRegistry {
    by_extension: HashMap<String, AnalyzerCommand>,
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        let by_extension = DEFAULT_ANALYZERS
            .iter()
            .map(|(ext, command, args, language_id)| {
                (
                    (*ext).to_owned(),
                    AnalyzerCommand::new(command, args, language_id),
                )
            })
            .collect();
        Self { by_extension }
    }
}

impl AnalyzerRegistry {
    /// A registry with no analyzers; every file resolves to "unsupported".
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// The built-in table with configured entries layered on top.
    ///
    /// An entry with an empty command removes the extension. An entry
    /// without a language id keeps the built-in one, or uses the extension.
    pub fn with_overrides(overrides: &HashMap<String, AnalyzerCommand>) -> Self {
        let mut registry = Self::default();
        for (ext, command) in overrides {
            let ext = ext.trim_start_matches('.').to_lowercase();
            if command.command.is_empty() {
                registry.by_extension.remove(&ext);
                continue;
            }
            let mut command = command.clone();
            if command.language_id.is_empty() {
                command.language_id = registry
                    .by_extension
                    .get(&ext)
                    .map_or_else(|| ext.clone(), |existing| existing.language_id.clone());
            }
            registry.by_extension.insert(ext, command);
        }
        registry
    }

    pub fn register(&mut self, ext: &str, command: AnalyzerCommand) {
        self.by_extension.insert(ext.to_lowercase(), command);
    }

    pub fn for_extension(&self, ext: &str) -> Option<&AnalyzerCommand> {
        self.by_extension.get(&ext.to_lowercase())
    }

    pub fn for_path(&self, path: &str) -> Option<&AnalyzerCommand> {
        let ext = Path::new(path).extension()?.to_str()?;
        self.for_extension(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let registry = AnalyzerRegistry::default();
        let go = registry.for_path("cmd/main.go").unwrap();
        assert_eq!(go.command, "gopls");
        assert!(go.args.is_empty());

        let tsx = registry.for_path("web/App.TSX").unwrap();
        assert_eq!(tsx.command, "typescript-language-server");
        assert_eq!(tsx.args, vec!["--stdio"]);
        assert_eq!(tsx.language_id, "typescriptreact");

        assert!(registry.for_path("README.md").is_none());
        assert!(registry.for_path("Makefile").is_none());
    }

    #[test]
    fn test_overrides_replace_disable_and_add() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "go".to_owned(),
            AnalyzerCommand::new("/opt/gopls", &["-remote=auto"], ""),
        );
        overrides.insert("py".to_owned(), AnalyzerCommand::new("", &[], ""));
        overrides.insert(".rb".to_owned(), AnalyzerCommand::new("solargraph", &["stdio"], ""));

        let registry = AnalyzerRegistry::with_overrides(&overrides);

        let go = registry.for_extension("go").unwrap();
        assert_eq!(go.command, "/opt/gopls");
        assert_eq!(go.language_id, "go");
        assert!(registry.for_extension("py").is_none());
        assert_eq!(registry.for_extension("rb").unwrap().language_id, "rb");
        assert!(registry.for_extension("ts").is_some());
    }

    #[test]
    fn test_empty_registry() {
        assert!(AnalyzerRegistry::empty().for_path("main.go").is_none());
    }
}
