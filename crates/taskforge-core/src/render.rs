//! Markdown emission: task-list chunks and the traceability matrix.
//!
//! Rendering is a pure function of the batch. Nothing time- or run-dependent
//! reaches the output, so re-emitting an unchanged batch is byte-identical.

use crate::batch::Batch;
use crate::error::Result;
use crate::grouping::TaskGroup;
use crate::paths;
use crate::trace::{self, TraceabilityRow};
use crate::validate::validate_batch;
use regex::Regex;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct WrittenDocuments {
    pub written: Vec<PathBuf>,
    /// Chunks left over from a previous, longer emission.
    pub removed: Vec<PathBuf>,
}

/// Validate `batch` and render every output document, task-list chunks
/// first and the matrix last.
pub fn emit(batch: &Batch, max_lines_per_chunk: usize) -> Result<Vec<RenderedDocument>> {
    validate_batch(batch)?;
    let mut docs = render_task_chunks(batch, max_lines_per_chunk);
    docs.push(render_matrix(batch));
    Ok(docs)
}

// ---------------------------------------------------------------------------
// Architecture overview
// ---------------------------------------------------------------------------

/// First paragraph under an `Overview` heading, or the first paragraph of
/// the document when there is no such heading.
pub fn architecture_overview(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|l| {
            let t = l.trim_start();
            t.starts_with('#') && t.trim_start_matches('#').trim().eq_ignore_ascii_case("overview")
        })
        .map_or(0, |i| i + 1);
    first_paragraph(&lines[start..])
}

fn first_paragraph(lines: &[&str]) -> String {
    let mut para: Vec<&str> = Vec::new();
    for line in lines {
        let t = line.trim();
        if t.starts_with('#') {
            if para.is_empty() {
                continue;
            }
            break;
        }
        if t.is_empty() {
            if para.is_empty() {
                continue;
            }
            break;
        }
        para.push(t);
    }
    para.join(" ")
}

// ---------------------------------------------------------------------------
// Task list
// ---------------------------------------------------------------------------

/// Collapse runs of whitespace so free text stays on one Markdown line.
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cell(text: &str) -> String {
    one_line(text).replace('|', "\\|")
}

fn header_lines(batch: &Batch) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        "## Architecture Overview".to_string(),
        String::new(),
    ];
    if batch.overview.trim().is_empty() {
        lines.push("_No overview provided._".to_string());
    } else {
        lines.push(one_line(&batch.overview));
    }
    lines.extend([
        String::new(),
        "## Component Breakdown".to_string(),
        String::new(),
        "| Group | Component | Requirements | Subtasks |".to_string(),
        "|-------|-----------|--------------|----------|".to_string(),
    ]);
    for group in &batch.groups {
        lines.push(format!(
            "| {} | {} | {} | {} |",
            group.ordinal,
            cell(&group.name),
            group.requirement_ids.join(", "),
            group.subtasks.len()
        ));
    }
    lines.push(String::new());
    lines
}

fn group_lines(group: &TaskGroup) -> Vec<String> {
    let mut lines = vec![format!("### {} {}", group.ordinal, one_line(&group.name)), String::new()];
    if !group.shared_context.trim().is_empty() {
        lines.push(format!("**Shared context:** {}", one_line(&group.shared_context)));
        lines.push(String::new());
    }

    // Live subtasks and removed placeholders, interleaved by index.
    let mut entries: Vec<(u32, Option<usize>)> = group
        .subtasks
        .iter()
        .enumerate()
        .map(|(i, s)| (s.ordinal.index, Some(i)))
        .chain(group.retired.iter().map(|&r| (r, None)))
        .collect();
    entries.sort_by_key(|(index, _)| *index);

    for (index, live) in entries {
        let Some(i) = live else {
            lines.push(format!("- {} _(removed)_", group.ordinal.subtask(index)));
            continue;
        };
        let subtask = &group.subtasks[i];
        lines.push(format!(
            "- [{}] {} {}",
            subtask.status.checkbox(),
            subtask.ordinal,
            one_line(&subtask.name)
        ));
        lines.push(format!("  - Requirements: {}", subtask.requirement_ids.join(", ")));
        if !subtask.specific_context.trim().is_empty() {
            lines.push(format!("  - Context: {}", one_line(&subtask.specific_context)));
        }
        lines.push("  - Testing:".to_string());
        for test in &subtask.testing {
            lines.push(format!("    - {}: {}", test.kind, one_line(&test.description)));
        }
    }
    lines.push(String::new());
    lines
}

/// Pack groups into chunks. A chunk is closed before a group would push it
/// past `max_lines`; a group never spans two chunks, so an oversized group
/// gets a chunk of its own.
fn pack(header_len: usize, blocks: Vec<Vec<String>>, max_lines: usize) -> Vec<Vec<Vec<String>>> {
    let mut chunks: Vec<Vec<Vec<String>>> = Vec::new();
    let mut current: Vec<Vec<String>> = Vec::new();
    let mut len = header_len;
    for block in blocks {
        if !current.is_empty() && len + block.len() > max_lines {
            chunks.push(std::mem::take(&mut current));
            len = header_len;
        }
        len += block.len();
        current.push(block);
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

pub fn render_task_chunks(batch: &Batch, max_lines: usize) -> Vec<RenderedDocument> {
    let header = header_lines(batch);
    // The title line is added per chunk.
    let blocks: Vec<Vec<String>> = batch.groups.iter().map(group_lines).collect();
    let chunks = pack(header.len() + 1, blocks, max_lines);
    let total = chunks.len();

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, blocks)| {
            let n = i + 1;
            let mut lines = vec![format!("# Tasks: {} (part {n} of {total})", batch.feature)];
            lines.extend(header.iter().cloned());
            for block in blocks {
                lines.extend(block);
            }
            while lines.last().is_some_and(|l| l.is_empty()) {
                lines.pop();
            }
            RenderedDocument {
                file_name: paths::tasks_file_name(&batch.feature, n),
                content: lines.join("\n") + "\n",
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Traceability matrix
// ---------------------------------------------------------------------------

pub const MATRIX_HEADER: &str = "| Requirement | TaskGroup | Subtask | ImplementationStatus |";

pub fn render_matrix(batch: &Batch) -> RenderedDocument {
    let rows = trace::build_matrix(batch);
    let mut out = format!("# Traceability Matrix: {}\n\n", batch.feature);
    out.push_str(MATRIX_HEADER);
    out.push('\n');
    out.push_str("|-------------|-----------|---------|----------------------|\n");
    for row in &rows {
        out.push_str(&matrix_line(row));
        out.push('\n');
    }
    out.push_str(&format!(
        "\n{} requirements, {} rows.\n",
        batch.requirements.len(),
        rows.len()
    ));
    RenderedDocument {
        file_name: paths::tracmat_file_name(&batch.feature),
        content: out,
    }
}

fn matrix_line(row: &TraceabilityRow) -> String {
    format!(
        "| {} | {} | {} | {} |",
        row.requirement_id, row.group, row.subtask, row.status
    )
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write `docs` into `dir` and delete `tasks-<feature>-N.md` files beyond
/// the chunks just written.
pub fn write_documents(dir: &Path, feature: &str, docs: &[RenderedDocument]) -> Result<WrittenDocuments> {
    crate::io::ensure_dir(dir)?;
    let mut result = WrittenDocuments::default();
    for doc in docs {
        let path = dir.join(&doc.file_name);
        crate::io::atomic_write(&path, doc.content.as_bytes())?;
        result.written.push(path);
    }

    let chunk_count = docs
        .iter()
        .filter(|d| d.file_name.starts_with(paths::TASKS_PREFIX))
        .count();
    for (n, path) in existing_chunks(dir, feature)? {
        if n > chunk_count && crate::io::remove_optional(&path)? {
            tracing::warn!(path = %path.display(), "removed stale task-list chunk");
            result.removed.push(path);
        }
    }
    Ok(result)
}

/// Task-list chunks for `feature` present in `dir`, sorted by chunk number.
pub fn existing_chunks(dir: &Path, feature: &str) -> Result<Vec<(usize, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let pattern = format!(
        r"^{}-{}-(\d+)\.md$",
        paths::TASKS_PREFIX,
        regex::escape(feature)
    );
    let re = Regex::new(&pattern).map_err(|e| std::io::Error::other(e.to_string()))?;
    let mut chunks = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(n) = re
            .captures(&name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        {
            chunks.push((n, entry.path()));
        }
    }
    chunks.sort();
    Ok(chunks)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
