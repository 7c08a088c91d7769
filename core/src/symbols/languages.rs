//! Per-language declaration tables.
//!
//! Each supported language maps grammar node types to "this node is a
//! declaration" plus the field holding its name. The extractor walks the
//! tree generically and only consults these tables.

use std::path::Path;
use tree_sitter::Language;

/// A grammar node type that counts as a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclarationRule {
    pub kind: &'static str,
    /// Field of the node that holds the name token.
    pub name_field: &'static str,
    /// Only match when no other declaration encloses the node, e.g. a
    /// module-level `const` but not a local one inside a function body.
    pub top_level_only: bool,
}

const fn decl(kind: &'static str, name_field: &'static str) -> DeclarationRule {
    DeclarationRule {
        kind,
        name_field,
        top_level_only: false,
    }
}

const fn top_level(kind: &'static str, name_field: &'static str) -> DeclarationRule {
    DeclarationRule {
        kind,
        name_field,
        top_level_only: true,
    }
}

/// A language with a registered grammar and declaration table.
pub struct LanguageSpec {
    pub id: &'static str,
    pub extensions: &'static [&'static str],
    grammar: fn() -> Language,
    pub declarations: &'static [DeclarationRule],
}

impl LanguageSpec {
    pub fn grammar(&self) -> Language {
        (self.grammar)()
    }

    /// The declaration rule for a node type, if it is a declaration.
    pub fn rule_for(&self, kind: &str) -> Option<&'static DeclarationRule> {
        self.declarations.iter().find(|rule| rule.kind == kind)
    }

    pub fn is_declaration(&self, kind: &str) -> bool {
        self.rule_for(kind).is_some()
    }
}

impl std::fmt::Debug for LanguageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageSpec")
            .field("id", &self.id)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

// --- Go ---

#[cfg(feature = "symbols-go")]
const GO_DECLARATIONS: &[DeclarationRule] = &[
    decl("function_declaration", "name"),
    decl("method_declaration", "name"),
    decl("type_spec", "name"),
    decl("type_alias", "name"),
    top_level("const_spec", "name"),
    top_level("var_spec", "name"),
];

#[cfg(feature = "symbols-go")]
fn go_grammar() -> Language {
    tree_sitter_go::LANGUAGE.into()
}

// --- JavaScript / TypeScript ---

#[cfg(feature = "symbols-typescript")]
const JS_DECLARATIONS: &[DeclarationRule] = &[
    decl("function_declaration", "name"),
    decl("generator_function_declaration", "name"),
    decl("class_declaration", "name"),
    decl("method_definition", "name"),
    top_level("variable_declarator", "name"),
];

#[cfg(feature = "symbols-typescript")]
const TS_DECLARATIONS: &[DeclarationRule] = &[
    decl("function_declaration", "name"),
    decl("generator_function_declaration", "name"),
    decl("class_declaration", "name"),
    decl("abstract_class_declaration", "name"),
    decl("method_definition", "name"),
    decl("interface_declaration", "name"),
    decl("type_alias_declaration", "name"),
    decl("enum_declaration", "name"),
    top_level("variable_declarator", "name"),
];

#[cfg(feature = "symbols-typescript")]
fn javascript_grammar() -> Language {
    tree_sitter_javascript::LANGUAGE.into()
}

#[cfg(feature = "symbols-typescript")]
fn typescript_grammar() -> Language {
    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
}

#[cfg(feature = "symbols-typescript")]
fn tsx_grammar() -> Language {
    tree_sitter_typescript::LANGUAGE_TSX.into()
}

// --- Rust ---

#[cfg(feature = "symbols-rust-lang")]
const RUST_DECLARATIONS: &[DeclarationRule] = &[
    decl("function_item", "name"),
    decl("function_signature_item", "name"),
    decl("struct_item", "name"),
    decl("enum_item", "name"),
    decl("union_item", "name"),
    decl("trait_item", "name"),
    decl("type_item", "name"),
    decl("impl_item", "type"),
    decl("macro_definition", "name"),
    top_level("const_item", "name"),
    top_level("static_item", "name"),
];

#[cfg(feature = "symbols-rust-lang")]
fn rust_grammar() -> Language {
    tree_sitter_rust::LANGUAGE.into()
}

// --- Python ---

#[cfg(feature = "symbols-python")]
const PYTHON_DECLARATIONS: &[DeclarationRule] = &[
    decl("function_definition", "name"),
    decl("class_definition", "name"),
    top_level("assignment", "left"),
];

#[cfg(feature = "symbols-python")]
fn python_grammar() -> Language {
    tree_sitter_python::LANGUAGE.into()
}

// --- Java ---

#[cfg(feature = "symbols-java")]
const JAVA_DECLARATIONS: &[DeclarationRule] = &[
    decl("class_declaration", "name"),
    decl("interface_declaration", "name"),
    decl("enum_declaration", "name"),
    decl("record_declaration", "name"),
    decl("method_declaration", "name"),
    decl("constructor_declaration", "name"),
];

#[cfg(feature = "symbols-java")]
fn java_grammar() -> Language {
    tree_sitter_java::LANGUAGE.into()
}

// --- Ruby ---

#[cfg(feature = "symbols-ruby")]
const RUBY_DECLARATIONS: &[DeclarationRule] = &[
    decl("method", "name"),
    decl("singleton_method", "name"),
    decl("class", "name"),
    decl("module", "name"),
];

#[cfg(feature = "symbols-ruby")]
fn ruby_grammar() -> Language {
    tree_sitter_ruby::LANGUAGE.into()
}

static LANGUAGES: &[LanguageSpec] = &[
    #[cfg(feature = "symbols-go")]
    LanguageSpec {
        id: "go",
        extensions: &["go"],
        grammar: go_grammar,
        declarations: GO_DECLARATIONS,
    },
    #[cfg(feature = "symbols-typescript")]
    LanguageSpec {
        id: "javascript",
        extensions: &["js", "jsx", "mjs", "cjs"],
        grammar: javascript_grammar,
        declarations: JS_DECLARATIONS,
    },
    #[cfg(feature = "symbols-typescript")]
    LanguageSpec {
        id: "typescript",
        extensions: &["ts", "mts", "cts"],
        grammar: typescript_grammar,
        declarations: TS_DECLARATIONS,
    },
    #[cfg(feature = "symbols-typescript")]
    LanguageSpec {
        id: "tsx",
        extensions: &["tsx"],
        grammar: tsx_grammar,
        declarations: TS_DECLARATIONS,
    },
    #[cfg(feature = "symbols-rust-lang")]
    LanguageSpec {
        id: "rust",
        extensions: &["rs"],
        grammar: rust_grammar,
        declarations: RUST_DECLARATIONS,
    },
    #[cfg(feature = "symbols-python")]
    LanguageSpec {
        id: "python",
        extensions: &["py", "pyi"],
        grammar: python_grammar,
        declarations: PYTHON_DECLARATIONS,
    },
    #[cfg(feature = "symbols-java")]
    LanguageSpec {
        id: "java",
        extensions: &["java"],
        grammar: java_grammar,
        declarations: JAVA_DECLARATIONS,
    },
    #[cfg(feature = "symbols-ruby")]
    LanguageSpec {
        id: "ruby",
        extensions: &["rb"],
        grammar: ruby_grammar,
        declarations: RUBY_DECLARATIONS,
    },
];

/// All languages compiled into this build.
pub fn all() -> &'static [LanguageSpec] {
    LANGUAGES
}

/// Look up the language for a file based on its extension.
pub fn language_for_path(file_path: &str) -> Option<&'static LanguageSpec> {
    let ext = Path::new(file_path).extension()?.to_str()?.to_lowercase();
    LANGUAGES
        .iter()
        .find(|spec| spec.extensions.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_extension_has_no_language() {
        assert!(language_for_path("README.md").is_none());
        assert!(language_for_path("Makefile").is_none());
        assert!(language_for_path("data.json").is_none());
    }

    #[test]
    fn test_extensions_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for spec in all() {
            for ext in spec.extensions {
                assert!(seen.insert(*ext), "extension {ext} registered twice");
            }
        }
    }

    #[cfg(feature = "symbols-go")]
    #[test]
    fn test_go_table() {
        let spec = language_for_path("pkg/server/handler.go").unwrap();
        assert_eq!(spec.id, "go");
        assert!(spec.is_declaration("method_declaration"));
        assert!(spec.rule_for("var_spec").unwrap().top_level_only);
        assert!(!spec.is_declaration("block"));
    }

    #[cfg(feature = "symbols-typescript")]
    #[test]
    fn test_typescript_tables() {
        assert_eq!(language_for_path("app.TSX").unwrap().id, "tsx");
        assert_eq!(language_for_path("index.mjs").unwrap().id, "javascript");
        let ts = language_for_path("types.ts").unwrap();
        assert!(ts.is_declaration("interface_declaration"));
        let js = language_for_path("types.js").unwrap();
        assert!(!js.is_declaration("interface_declaration"));
    }
}
