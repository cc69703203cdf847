//! Batch validation run before anything is emitted.
//!
//! Checks run in a fixed order and the first failure halts: requirement
//! schema, group coverage, ordinal integrity, subtask references, testing
//! obligations, and finally traceability coverage.

use crate::batch::Batch;
use crate::error::{Result, TaskforgeError};
use crate::grouping::validate_groups;
use crate::ordinal::GroupOrdinal;
use crate::requirement::validate_requirements;
use crate::trace;

pub fn validate_batch(batch: &Batch) -> Result<()> {
    validate_requirements(&batch.requirements)?;
    validate_groups(&batch.requirements, &batch.groups)?;
    check_ordinals(batch)?;
    check_references(batch)?;
    check_testing(batch)?;
    let rows = trace::build_matrix(batch);
    trace::check_coverage(&batch.requirements, &rows)
}

/// Groups are numbered 1.0..n.0 without gaps; subtask indices are strictly
/// increasing within their group and never reuse a retired index.
pub fn check_ordinals(batch: &Batch) -> Result<()> {
    for (i, group) in batch.groups.iter().enumerate() {
        let expected = GroupOrdinal(i as u32 + 1);
        if group.ordinal != expected {
            return Err(TaskforgeError::InvalidOrdinal(format!(
                "group {} found where {expected} was expected",
                group.ordinal
            )));
        }
        let mut last = 0;
        for subtask in &group.subtasks {
            if subtask.ordinal.group_ordinal() != group.ordinal {
                return Err(TaskforgeError::InvalidOrdinal(format!(
                    "subtask {} listed under group {}",
                    subtask.ordinal, group.ordinal
                )));
            }
            if subtask.ordinal.index <= last {
                return Err(TaskforgeError::InvalidOrdinal(format!(
                    "subtask {} is out of order in group {}",
                    subtask.ordinal, group.ordinal
                )));
            }
            if group.retired.contains(&subtask.ordinal.index) {
                return Err(TaskforgeError::InvalidOrdinal(format!(
                    "subtask {} reuses a removed ordinal",
                    subtask.ordinal
                )));
            }
            last = subtask.ordinal.index;
        }
    }
    Ok(())
}

/// Subtask requirement ids must be listed by the owning group.
pub fn check_references(batch: &Batch) -> Result<()> {
    for group in &batch.groups {
        for subtask in &group.subtasks {
            if let Some(id) = subtask.requirement_ids.iter().find(|id| !group.covers(id)) {
                return Err(TaskforgeError::UnknownRequirement {
                    id: id.clone(),
                    owner: format!("subtask {}", subtask.ordinal),
                });
            }
        }
    }
    Ok(())
}

/// Every subtask carries at least one testing requirement.
pub fn check_testing(batch: &Batch) -> Result<()> {
    let missing: Vec<String> = batch
        .subtasks()
        .filter(|s| s.testing.is_empty())
        .map(|s| s.ordinal.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TaskforgeError::IncompleteTestCoverage(missing))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::sample_batch;
    use crate::grouping::{assign_ordinals, ProposedGroup};
    use crate::requirement::Requirement;
    use crate::subtask::{Subtask, TestRequirement};
    use crate::types::{DocumentKind, SubtaskStatus, TestKind};
    use proptest::prelude::*;

    #[test]
    fn sample_is_valid() {
        validate_batch(&sample_batch()).unwrap();
    }

    #[test]
    fn lists_every_subtask_without_tests() {
        let mut batch = sample_batch();
        batch.groups[0].subtasks[1].testing.clear();
        batch.groups[1].subtasks[0].testing.clear();
        let err = validate_batch(&batch).unwrap_err();
        assert!(matches!(err, TaskforgeError::IncompleteTestCoverage(ords) if ords == ["1.2", "2.1"]));
    }

    #[test]
    fn orphan_is_rejected() {
        let mut batch = sample_batch();
        batch.groups[0].subtasks[1].requirement_ids = vec!["REQ-1".to_string()];
        let err = validate_batch(&batch).unwrap_err();
        assert!(err.is_validation());
        assert!(matches!(err, TaskforgeError::OrphanedRequirement(ids) if ids == ["REQ-2"]));
    }

    #[test]
    fn out_of_order_subtasks_are_rejected() {
        let mut batch = sample_batch();
        batch.groups[0].subtasks.swap(0, 1);
        assert!(matches!(
            check_ordinals(&batch).unwrap_err(),
            TaskforgeError::InvalidOrdinal(_)
        ));
    }

    #[test]
    fn retired_index_cannot_come_back() {
        let mut batch = sample_batch();
        batch.groups[1].retired.push(1);
        assert!(matches!(
            check_ordinals(&batch).unwrap_err(),
            TaskforgeError::InvalidOrdinal(msg) if msg.contains("2.1")
        ));
    }

    #[test]
    fn gaps_after_removal_are_allowed() {
        let mut batch = sample_batch();
        batch.groups[0].subtasks[1].ordinal = "1.3".parse().unwrap();
        batch.groups[0].retired.push(2);
        validate_batch(&batch).unwrap();
    }

    #[test]
    fn reference_outside_group_is_rejected() {
        let mut batch = sample_batch();
        batch.groups[1].subtasks[0]
            .requirement_ids
            .push("REQ-1".to_string());
        let err = validate_batch(&batch).unwrap_err();
        assert!(matches!(
            err,
            TaskforgeError::UnknownRequirement { id, owner } if id == "REQ-1" && owner == "subtask 2.1"
        ));
    }

    // -----------------------------------------------------------------------
    // Property: orphans are always caught, complete batches always pass
    // -----------------------------------------------------------------------

    /// `n` requirements in groups of `group_size`, one subtask per
    /// requirement unless its index is in `drop`.
    fn build(n: usize, group_size: usize, drop: &[usize]) -> Batch {
        let requirements: Vec<Requirement> = (0..n)
            .map(|i| Requirement::new(format!("REQ-{i}"), format!("requirement {i}"), DocumentKind::Prd))
            .collect();
        let proposed: Vec<ProposedGroup> = requirements
            .chunks(group_size)
            .enumerate()
            .map(|(g, chunk)| {
                ProposedGroup::new(
                    format!("Group {g}"),
                    chunk.iter().map(|r| r.id.clone()).collect(),
                )
            })
            .collect();
        let mut groups = assign_ordinals(proposed);
        for group in &mut groups {
            let mut index = 1;
            for id in group.requirement_ids.clone() {
                let n: usize = id.trim_start_matches("REQ-").parse().unwrap();
                if drop.contains(&n) {
                    continue;
                }
                group.subtasks.push(Subtask {
                    ordinal: group.ordinal.subtask(index),
                    name: format!("Implement {id}"),
                    specific_context: String::new(),
                    requirement_ids: vec![id.clone()],
                    testing: vec![TestRequirement::new(TestKind::Unit, "covers it")],
                    status: SubtaskStatus::Pending,
                });
                index += 1;
            }
        }
        Batch::new("prop", "", requirements, groups, Vec::new())
    }

    proptest! {
        #[test]
        fn complete_batches_validate(n in 1usize..40, group_size in 1usize..8) {
            let batch = build(n, group_size, &[]);
            prop_assert!(validate_batch(&batch).is_ok());
        }

        #[test]
        fn orphans_never_pass(
            n in 1usize..40,
            group_size in 1usize..8,
            drop in proptest::collection::vec(0usize..40, 1..5),
        ) {
            let drop: Vec<usize> = drop.into_iter().map(|d| d % n).collect();
            let batch = build(n, group_size, &drop);
            match validate_batch(&batch) {
                Err(TaskforgeError::OrphanedRequirement(ids)) => {
                    for d in &drop {
                        let expected = format!("REQ-{d}");
                        prop_assert!(ids.contains(&expected));
                    }
                }
                other => prop_assert!(false, "expected orphan error, got {other:?}"),
            }
        }
    }
}
