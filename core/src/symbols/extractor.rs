//! Tree-sitter based mapping from changed lines to enclosing declarations.

use super::generated::is_generated;
use super::languages::{language_for_path, DeclarationRule, LanguageSpec};
use super::ChangedSpan;
use log::debug;
use std::collections::HashSet;
use thiserror::Error;
use tree_sitter::{Node, Parser, Point};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to load {language} grammar: {source}")]
    Language {
        language: &'static str,
        #[source]
        source: tree_sitter::LanguageError,
    },
    #[error("Failed to parse {path}")]
    Parse { path: String },
}

/// Find the declarations enclosing each changed line of a file.
///
/// `changed_lines` are 1-based line numbers in the new version of the file.
/// Generated files and files without a registered grammar yield no spans.
/// Several lines inside the same declaration collapse into one span; spans
/// are returned in order of the first line that hit them.
pub fn extract_changed_spans(
    file_path: &str,
    content: &[u8],
    changed_lines: &[u32],
) -> Result<Vec<ChangedSpan>, ExtractError> {
    if is_generated(file_path) {
        debug!("[extract_changed_spans] skipping generated file {file_path}");
        return Ok(Vec::new());
    }
    let Some(spec) = language_for_path(file_path) else {
        debug!("[extract_changed_spans] no grammar for {file_path}");
        return Ok(Vec::new());
    };

    let mut parser = Parser::new();
    parser
        .set_language(&spec.grammar())
        .map_err(|source| ExtractError::Language {
            language: spec.id,
            source,
        })?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| ExtractError::Parse {
            path: file_path.to_owned(),
        })?;
    let root = tree.root_node();

    let line_starts = line_start_offsets(content);
    let mut seen: HashSet<(&'static str, usize, usize)> = HashSet::new();
    let mut spans = Vec::new();

    for &line in changed_lines {
        if line == 0 {
            continue;
        }
        let row = (line - 1) as usize;
        let point = Point {
            row,
            column: first_non_blank_column(content, &line_starts, row),
        };
        let Some(node) = root.named_descendant_for_point_range(point, point) else {
            continue;
        };
        let Some((declaration, rule)) = find_enclosing_declaration(spec, node)
            .or_else(|| declaration_starting_on_row(spec, node, row))
        else {
            continue;
        };

        let key = (
            declaration.kind(),
            declaration.start_byte(),
            declaration.end_byte(),
        );
        if !seen.insert(key) {
            continue;
        }

        spans.push(span_for_declaration(declaration, rule, content));
    }

    Ok(spans)
}

/// Byte offset at which each line starts.
fn line_start_offsets(content: &[u8]) -> Vec<usize> {
    std::iter::once(0)
        .chain(
            content
                .iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .map(|(i, _)| i + 1),
        )
        .collect()
}

/// Column of the first non-blank byte on a row, or 0 for blank and out-of-range rows.
fn first_non_blank_column(content: &[u8], line_starts: &[usize], row: usize) -> usize {
    let Some(&start) = line_starts.get(row) else {
        return 0;
    };
    content[start..]
        .iter()
        .take_while(|b| **b != b'\n')
        .position(|b| !matches!(b, b' ' | b'\t' | b'\r'))
        .unwrap_or(0)
}

/// Walk up from `node` to the nearest node in the language's declaration table.
fn find_enclosing_declaration<'tree>(
    spec: &LanguageSpec,
    node: Node<'tree>,
) -> Option<(Node<'tree>, &'static DeclarationRule)> {
    let mut current = Some(node);
    while let Some(candidate) = current {
        if let Some(rule) = spec.rule_for(candidate.kind()) {
            if !rule.top_level_only || !has_declaration_ancestor(spec, candidate) {
                return Some((candidate, rule));
            }
        }
        current = candidate.parent();
    }
    None
}

/// Find a declaration that begins on `row` below `node`.
///
/// Covers lines such as `const X = 1` or `export const x = ...` where the
/// lookup lands on a wrapper node whose declaration child starts after the
/// keyword.
fn declaration_starting_on_row<'tree>(
    spec: &LanguageSpec,
    node: Node<'tree>,
    row: usize,
) -> Option<(Node<'tree>, &'static DeclarationRule)> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.start_position().row > row {
            break;
        }
        if child.end_position().row < row {
            continue;
        }
        if child.start_position().row == row {
            if let Some(rule) = spec.rule_for(child.kind()) {
                if !rule.top_level_only || !has_declaration_ancestor(spec, child) {
                    return Some((child, rule));
                }
            }
        }
        if let Some(found) = declaration_starting_on_row(spec, child, row) {
            return Some(found);
        }
    }
    None
}

fn has_declaration_ancestor(spec: &LanguageSpec, node: Node) -> bool {
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if spec.is_declaration(ancestor.kind()) {
            return true;
        }
        current = ancestor.parent();
    }
    false
}

fn span_for_declaration(node: Node, rule: &DeclarationRule, content: &[u8]) -> ChangedSpan {
    let name_node = node.child_by_field_name(rule.name_field);

    let name = name_node.map_or_else(
        || node.kind().to_owned(),
        |n| String::from_utf8_lossy(&content[n.byte_range()]).into_owned(),
    );
    let (anchor_line, anchor_column) = name_node.map_or((0, 0), |n| {
        let start = n.start_position();
        (start.row as u32, start.column as u32)
    });

    ChangedSpan {
        name,
        kind: node.kind().to_owned(),
        start_line: node.start_position().row as u32 + 1,
        end_line: node.end_position().row as u32 + 1,
        anchor_line,
        anchor_column,
        references: Vec::new(),
        references_checked: false,
    }
}
