//! Reading emitted documents back for integrity checks.
//!
//! The parser only understands what `render` writes: group headings,
//! checkbox lines with their requirement and testing bullets, removed
//! placeholders, and matrix table rows. Free text is skipped.

use crate::batch::Batch;
use crate::error::{Result, TaskforgeError};
use crate::ordinal::{GroupOrdinal, SubtaskOrdinal};
use crate::paths;
use crate::render::{existing_chunks, MATRIX_HEADER};
use crate::trace::{self, TraceabilityRow};
use crate::types::SubtaskStatus;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedTaskList {
    pub groups: Vec<ParsedGroup>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedGroup {
    pub ordinal: GroupOrdinal,
    pub name: String,
    pub subtasks: Vec<ParsedSubtask>,
    pub removed: Vec<SubtaskOrdinal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedSubtask {
    pub ordinal: SubtaskOrdinal,
    pub name: String,
    pub status: SubtaskStatus,
    pub requirement_ids: Vec<String>,
    /// Number of testing bullets.
    pub testing: usize,
}

impl ParsedTaskList {
    pub fn subtasks(&self) -> impl Iterator<Item = &ParsedSubtask> {
        self.groups.iter().flat_map(|g| g.subtasks.iter())
    }
}

#[derive(Debug, Clone)]
pub struct EmittedDocuments {
    pub chunks: usize,
    pub tasks: ParsedTaskList,
    pub matrix: Vec<TraceabilityRow>,
}

// ---------------------------------------------------------------------------
// Task list
// ---------------------------------------------------------------------------

static GROUP_RE: OnceLock<Regex> = OnceLock::new();
static SUBTASK_RE: OnceLock<Regex> = OnceLock::new();
static REMOVED_RE: OnceLock<Regex> = OnceLock::new();

fn group_re() -> &'static Regex {
    GROUP_RE.get_or_init(|| Regex::new(r"^### (\d+\.0) (.*)$").unwrap())
}

fn subtask_re() -> &'static Regex {
    SUBTASK_RE.get_or_init(|| Regex::new(r"^- \[([ ~xX])\] (\d+\.\d+) (.*)$").unwrap())
}

fn removed_re() -> &'static Regex {
    REMOVED_RE.get_or_init(|| Regex::new(r"^- (\d+\.\d+) _\(removed\)_$").unwrap())
}

fn mismatch(problem: impl Into<String>) -> TaskforgeError {
    TaskforgeError::DocumentMismatch(vec![problem.into()])
}

/// Parse one task-list chunk.
pub fn parse_task_list(content: &str) -> Result<ParsedTaskList> {
    let mut list = ParsedTaskList::default();
    let mut in_testing = false;

    for (n, line) in content.lines().enumerate() {
        if let Some(caps) = group_re().captures(line) {
            list.groups.push(ParsedGroup {
                ordinal: caps[1].parse()?,
                name: caps[2].trim().to_string(),
                subtasks: Vec::new(),
                removed: Vec::new(),
            });
            in_testing = false;
            continue;
        }

        let Some(group) = list.groups.last_mut() else {
            if subtask_re().is_match(line) || removed_re().is_match(line) {
                return Err(mismatch(format!("line {}: subtask outside any task group", n + 1)));
            }
            continue;
        };

        if let Some(caps) = subtask_re().captures(line) {
            let marker = caps[1].chars().next().unwrap_or(' ');
            group.subtasks.push(ParsedSubtask {
                ordinal: caps[2].parse()?,
                name: caps[3].trim().to_string(),
                status: SubtaskStatus::from_checkbox(marker).unwrap_or_default(),
                requirement_ids: Vec::new(),
                testing: 0,
            });
            in_testing = false;
        } else if let Some(caps) = removed_re().captures(line) {
            group.removed.push(caps[1].parse()?);
            in_testing = false;
        } else if let Some(subtask) = group.subtasks.last_mut() {
            if let Some(ids) = line.strip_prefix("  - Requirements:") {
                subtask.requirement_ids = ids
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect();
                in_testing = false;
            } else if line == "  - Testing:" {
                in_testing = true;
            } else if in_testing && line.starts_with("    - ") {
                subtask.testing += 1;
            } else if line.starts_with("  - ") || line.trim().is_empty() {
                in_testing = false;
            }
        }
    }
    Ok(list)
}

// ---------------------------------------------------------------------------
// Matrix
// ---------------------------------------------------------------------------

pub fn parse_matrix(content: &str) -> Result<Vec<TraceabilityRow>> {
    let mut rows = Vec::new();
    let mut seen_header = false;
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line == MATRIX_HEADER {
            seen_header = true;
            continue;
        }
        if !seen_header || !line.starts_with('|') || line.starts_with("|-") {
            continue;
        }
        let cells: Vec<&str> = line
            .trim_matches('|')
            .split('|')
            .map(str::trim)
            .collect();
        if cells.len() != 4 {
            return Err(mismatch(format!(
                "matrix line {}: expected 4 columns, found {}",
                n + 1,
                cells.len()
            )));
        }
        let status = cells[3]
            .parse::<SubtaskStatus>()
            .map_err(|e| mismatch(format!("matrix line {}: {e}", n + 1)))?;
        rows.push(TraceabilityRow {
            requirement_id: cells[0].to_string(),
            group: cells[1].parse()?,
            subtask: cells[2].parse()?,
            status,
        });
    }
    if !seen_header {
        return Err(mismatch("traceability matrix has no table header"));
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Reading and verification
// ---------------------------------------------------------------------------

/// Read every task-list chunk and the matrix for `feature` from `dir`.
pub fn read_emitted(dir: &Path, feature: &str) -> Result<EmittedDocuments> {
    let chunks = existing_chunks(dir, feature)?;
    if chunks.is_empty() {
        return Err(TaskforgeError::MissingRequiredDocument {
            kind: "task list".to_string(),
            expected: dir
                .join(paths::tasks_file_name(feature, 1))
                .display()
                .to_string(),
        });
    }
    let mut tasks = ParsedTaskList::default();
    for (i, (n, path)) in chunks.iter().enumerate() {
        if *n != i + 1 {
            return Err(mismatch(format!(
                "task-list chunks are not numbered 1..{}: found {}",
                chunks.len(),
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        tasks.groups.extend(parse_task_list(&content)?.groups);
    }

    let matrix_path = dir.join(paths::tracmat_file_name(feature));
    let matrix = match crate::io::read_optional(&matrix_path)? {
        Some(content) => parse_matrix(&content)?,
        None => {
            return Err(TaskforgeError::MissingRequiredDocument {
                kind: "traceability matrix".to_string(),
                expected: matrix_path.display().to_string(),
            })
        }
    };
    Ok(EmittedDocuments {
        chunks: chunks.len(),
        tasks,
        matrix,
    })
}

/// Check that the emitted documents agree with `batch` and with each other.
///
/// A requirement with no matrix row is reported as `OrphanedRequirement`;
/// every other disagreement is collected into one `DocumentMismatch`.
pub fn verify_documents(batch: &Batch, tasks: &ParsedTaskList, matrix: &[TraceabilityRow]) -> Result<()> {
    trace::check_coverage(&batch.requirements, matrix)?;

    let mut problems = Vec::new();

    let mut listed: HashMap<SubtaskOrdinal, &ParsedSubtask> = HashMap::new();
    for group in &tasks.groups {
        for subtask in &group.subtasks {
            if subtask.ordinal.group_ordinal() != group.ordinal {
                problems.push(format!(
                    "subtask {} is listed under group {}",
                    subtask.ordinal, group.ordinal
                ));
            }
            if listed.insert(subtask.ordinal, subtask).is_some() {
                problems.push(format!("subtask {} appears more than once", subtask.ordinal));
            }
            if subtask.testing == 0 {
                problems.push(format!("subtask {} has no testing requirements", subtask.ordinal));
            }
        }
    }

    for expected in batch.subtasks() {
        match listed.get(&expected.ordinal) {
            None => problems.push(format!("subtask {} is missing from the task list", expected.ordinal)),
            Some(found) => {
                if found.status != expected.status {
                    problems.push(format!(
                        "subtask {} is {} in the task list but {} in batch {}",
                        expected.ordinal, found.status, expected.status, batch.number
                    ));
                }
                if found.requirement_ids != expected.requirement_ids {
                    problems.push(format!(
                        "subtask {} references [{}] but batch {} has [{}]",
                        expected.ordinal,
                        found.requirement_ids.join(", "),
                        batch.number,
                        expected.requirement_ids.join(", ")
                    ));
                }
            }
        }
    }
    for ordinal in listed.keys() {
        if batch.subtask(*ordinal).is_err() {
            problems.push(format!("subtask {ordinal} is not in batch {}", batch.number));
        }
    }

    let mut seen_rows = HashSet::new();
    for row in matrix {
        if !seen_rows.insert((row.requirement_id.as_str(), row.subtask)) {
            problems.push(format!(
                "matrix row {} / {} appears more than once",
                row.requirement_id, row.subtask
            ));
        }
        if row.subtask.group_ordinal() != row.group {
            problems.push(format!(
                "matrix row {} / {} names group {}",
                row.requirement_id, row.subtask, row.group
            ));
        }
        match listed.get(&row.subtask) {
            None => problems.push(format!(
                "matrix row {} / {} does not resolve to a task-list subtask",
                row.requirement_id, row.subtask
            )),
            Some(found) => {
                if !found.requirement_ids.contains(&row.requirement_id) {
                    problems.push(format!(
                        "matrix row {} / {} is not referenced by that subtask",
                        row.requirement_id, row.subtask
                    ));
                }
                if found.status != row.status {
                    problems.push(format!(
                        "matrix row {} / {} says {} but the task list says {}",
                        row.requirement_id, row.subtask, row.status, found.status
                    ));
                }
            }
        }
    }

    let expected_rows = trace::build_matrix(batch);
    if problems.is_empty() && expected_rows.as_slice() != matrix {
        problems.push(format!(
            "matrix has {} rows but batch {} derives {}",
            matrix.len(),
            batch.number,
            expected_rows.len()
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        problems.sort();
        Err(TaskforgeError::DocumentMismatch(problems))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
