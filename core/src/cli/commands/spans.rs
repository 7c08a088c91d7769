use super::{format_line_stats, print_json};
use crate::cli::{OutputFormat, Workspace};
use crate::error::AppError;
use crate::session::{analyze_file, collect_patches, FileDiff};
use crate::symbols::ChangedSpan;
use colored::Colorize;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;

pub async fn run(
    workspace: &Workspace,
    file: Option<&str>,
    no_refs: bool,
    format: OutputFormat,
) -> Result<(), String> {
    let (repo, mut patches) = collect_patches(&workspace.source)
        .await
        .map_err(AppError::from)?;

    if let Some(filter) = file {
        patches.retain(|p| p.path == filter || p.path.ends_with(filter));
        if patches.is_empty() {
            return Err(format!("No matching file found for '{filter}'"));
        }
    }

    let root = PathBuf::from(&repo.root);
    let finder = workspace.finder(!no_refs);
    let mut files: Vec<FileDiff> = stream::iter(patches)
        .map(|patch| analyze_file(&root, patch, finder, &workspace.config))
        .buffered(workspace.config.concurrency.max(1))
        .collect()
        .await;

    files.retain(|f| !f.changed_spans.is_empty() || f.analysis_error.is_some());

    if format == OutputFormat::Json {
        return print_json(&files);
    }

    if files.is_empty() {
        println!("No changed spans found");
        return Ok(());
    }

    let mut total_spans = 0;
    let mut total_refs = 0;
    for file in &files {
        println!(
            "{} {}",
            file.path.bold(),
            format_line_stats(file.additions, file.deletions)
        );
        if let Some(ref error) = file.analysis_error {
            println!("  {}", error.red());
        }
        for span in &file.changed_spans {
            print_span(span, no_refs);
            total_spans += 1;
            total_refs += span.references.len();
        }
        println!();
    }

    println!(
        "{} {} spans, {} references against {}",
        "Total:".bold(),
        total_spans,
        total_refs,
        repo.base_ref
    );
    Ok(())
}

fn print_span(span: &ChangedSpan, no_refs: bool) {
    let lines = if span.start_line == span.end_line {
        format!("L{}", span.start_line)
    } else {
        format!("L{}-{}", span.start_line, span.end_line)
    };
    println!(
        "  {} {} {}",
        span.kind.cyan(),
        span.name.bold(),
        lines.dimmed()
    );

    if no_refs {
        return;
    }
    if !span.references_checked {
        println!("    {}", "references not checked".yellow());
        return;
    }
    if span.references.is_empty() {
        println!("    {}", "no references".dimmed());
        return;
    }
    for reference in &span.references {
        println!(
            "    {}:{}",
            reference.path,
            reference.line.to_string().dimmed()
        );
    }
}
