//! Changed-span extraction from source files using tree-sitter.
//!
//! Maps the lines a diff touched onto the smallest enclosing named
//! declaration (function, method, type, top-level variable) and records the
//! position of the declaration's name so references can be looked up later.

pub mod extractor;
pub mod generated;
pub mod languages;

use serde::{Deserialize, Serialize};

/// A declaration that encloses one or more changed lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedSpan {
    pub name: String,
    /// Grammar node type of the declaration, e.g. `function_declaration`.
    pub kind: String,
    /// 1-based, inclusive.
    #[serde(rename = "startLine")]
    pub start_line: u32,
    /// 1-based, inclusive.
    #[serde(rename = "endLine")]
    pub end_line: u32,
    /// 0-based row of the name token.
    #[serde(rename = "anchorLine")]
    pub anchor_line: u32,
    /// 0-based byte column of the name token.
    #[serde(rename = "anchorColumn")]
    pub anchor_column: u32,
    #[serde(default)]
    pub references: Vec<Reference>,
    /// Set once a reference lookup for this span succeeded, so an empty
    /// `references` list can be told apart from "never checked".
    #[serde(rename = "referencesChecked", default)]
    pub references_checked: bool,
}

impl ChangedSpan {
    /// Whether the span has a usable anchor for reference lookup.
    ///
    /// Spans whose declaration had no name child keep the `(0, 0)` anchor.
    pub fn has_anchor(&self) -> bool {
        self.anchor_line != 0 || self.anchor_column != 0
    }
}

/// A location elsewhere in the codebase that refers to a changed span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Repository-relative path, or absolute when outside the repository.
    pub path: String,
    /// 1-based.
    pub line: u32,
    #[serde(rename = "startColumn")]
    pub start_column: u32,
    #[serde(rename = "endColumn")]
    pub end_column: u32,
    /// Source lines surrounding the reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// 1-based line number of the first line in `context`.
    #[serde(
        rename = "contextStartLine",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub context_start_line: Option<u32>,
}
