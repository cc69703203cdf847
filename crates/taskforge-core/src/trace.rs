use crate::batch::Batch;
use crate::error::{Result, TaskforgeError};
use crate::ordinal::{GroupOrdinal, SubtaskOrdinal};
use crate::requirement::Requirement;
use crate::types::SubtaskStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One (requirement, subtask) pairing. Always derived, never authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceabilityRow {
    pub requirement_id: String,
    pub group: GroupOrdinal,
    pub subtask: SubtaskOrdinal,
    pub status: SubtaskStatus,
}

/// Rows in requirement extraction order, then subtask ordinal order.
pub fn build_matrix(batch: &Batch) -> Vec<TraceabilityRow> {
    let mut rows = Vec::new();
    for req in &batch.requirements {
        for group in &batch.groups {
            for subtask in &group.subtasks {
                if subtask.requirement_ids.iter().any(|id| id == &req.id) {
                    rows.push(TraceabilityRow {
                        requirement_id: req.id.clone(),
                        group: group.ordinal,
                        subtask: subtask.ordinal,
                        status: subtask.status,
                    });
                }
            }
        }
    }
    rows
}

/// Requirement ids with no row, in extraction order.
pub fn find_orphans(requirements: &[Requirement], rows: &[TraceabilityRow]) -> Vec<String> {
    let traced: HashSet<&str> = rows.iter().map(|r| r.requirement_id.as_str()).collect();
    requirements
        .iter()
        .filter(|r| !traced.contains(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect()
}

pub fn check_coverage(requirements: &[Requirement], rows: &[TraceabilityRow]) -> Result<()> {
    let orphans = find_orphans(requirements, rows);
    if orphans.is_empty() {
        Ok(())
    } else {
        Err(TaskforgeError::OrphanedRequirement(orphans))
    }
}

/// Share of rows whose subtask is done, as `(done, total)` per requirement.
pub fn requirement_progress(rows: &[TraceabilityRow], requirement_id: &str) -> (usize, usize) {
    let mine: Vec<_> = rows
        .iter()
        .filter(|r| r.requirement_id == requirement_id)
        .collect();
    let done = mine
        .iter()
        .filter(|r| r.status == SubtaskStatus::Done)
        .count();
    (done, mine.len())
}
