use crate::checkpoint::GroupingAttempt;
use crate::error::{Result, TaskforgeError};
use crate::grouping::TaskGroup;
use crate::ordinal::SubtaskOrdinal;
use crate::paths;
use crate::requirement::Requirement;
use crate::subtask::Subtask;
use crate::types::SubtaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Everything one generation run produced. Regenerating a feature writes a
/// new batch; only subtask status changes in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default = "default_version")]
    pub version: u32,
    pub id: Uuid,
    pub feature: String,
    pub number: u32,
    pub created_at: DateTime<Utc>,
    /// Architecture overview captured at generation time.
    #[serde(default)]
    pub overview: String,
    pub requirements: Vec<Requirement>,
    pub groups: Vec<TaskGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grouping_attempts: Vec<GroupingAttempt>,
}

fn default_version() -> u32 {
    1
}

impl Batch {
    pub fn new(
        feature: impl Into<String>,
        overview: impl Into<String>,
        requirements: Vec<Requirement>,
        groups: Vec<TaskGroup>,
        grouping_attempts: Vec<GroupingAttempt>,
    ) -> Self {
        Self {
            version: default_version(),
            id: Uuid::new_v4(),
            feature: feature.into(),
            number: 0,
            created_at: Utc::now(),
            overview: overview.into(),
            requirements,
            groups,
            grouping_attempts,
        }
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    /// Stored batch numbers for `feature`, ascending.
    pub fn numbers(root: &Path, feature: &str) -> Result<Vec<u32>> {
        let dir = paths::batches_dir(root, feature);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut numbers = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(n) = name
                .strip_suffix(".yaml")
                .and_then(|stem| stem.parse::<u32>().ok())
            {
                numbers.push(n);
            }
        }
        numbers.sort_unstable();
        Ok(numbers)
    }

    pub fn load(root: &Path, feature: &str, number: u32) -> Result<Self> {
        let path = paths::batch_path(root, feature, number);
        let data = crate::io::read_optional(&path)?
            .ok_or_else(|| TaskforgeError::NoBatch(feature.to_string()))?;
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn latest(root: &Path, feature: &str) -> Result<Self> {
        match Self::numbers(root, feature)?.last() {
            Some(&n) => Self::load(root, feature, n),
            None => Err(TaskforgeError::NoBatch(feature.to_string())),
        }
    }

    /// Assign the next batch number and write the batch.
    pub fn save_new(&mut self, root: &Path) -> Result<()> {
        self.number = Self::numbers(root, &self.feature)?
            .last()
            .map_or(1, |n| n + 1);
        self.save(root)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::batch_path(root, &self.feature, self.number);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // ---------------------------------------------------------------------------
    // Lookup
    // ---------------------------------------------------------------------------

    pub fn subtasks(&self) -> impl Iterator<Item = &Subtask> {
        self.groups.iter().flat_map(|g| g.subtasks.iter())
    }

    pub fn subtask(&self, ordinal: SubtaskOrdinal) -> Result<&Subtask> {
        self.subtasks()
            .find(|s| s.ordinal == ordinal)
            .ok_or_else(|| TaskforgeError::SubtaskNotFound(ordinal.to_string()))
    }

    fn subtask_mut(&mut self, ordinal: SubtaskOrdinal) -> Result<&mut Subtask> {
        self.groups
            .iter_mut()
            .flat_map(|g| g.subtasks.iter_mut())
            .find(|s| s.ordinal == ordinal)
            .ok_or_else(|| TaskforgeError::SubtaskNotFound(ordinal.to_string()))
    }

    pub fn requirement(&self, id: &str) -> Option<&Requirement> {
        self.requirements.iter().find(|r| r.id == id)
    }

    // ---------------------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------------------

    pub fn set_status(&mut self, ordinal: SubtaskOrdinal, status: SubtaskStatus) -> Result<()> {
        self.subtask_mut(ordinal)?.status = status;
        Ok(())
    }

    /// Remove a subtask, leaving a gap in its group's ordinals. Fails, leaving
    /// the batch unchanged, if that would orphan a requirement.
    pub fn retire_subtask(&mut self, ordinal: SubtaskOrdinal) -> Result<Subtask> {
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.ordinal == ordinal.group_ordinal())
            .ok_or_else(|| TaskforgeError::GroupNotFound(ordinal.group_ordinal().to_string()))?;
        let pos = group
            .subtasks
            .iter()
            .position(|s| s.ordinal == ordinal)
            .ok_or_else(|| TaskforgeError::SubtaskNotFound(ordinal.to_string()))?;
        let removed = group.subtasks.remove(pos);

        let rows = crate::trace::build_matrix(self);
        if let Err(e) = crate::trace::check_coverage(&self.requirements, &rows) {
            let group = self
                .groups
                .iter_mut()
                .find(|g| g.ordinal == ordinal.group_ordinal())
                .ok_or_else(|| TaskforgeError::GroupNotFound(ordinal.group_ordinal().to_string()))?;
            group.subtasks.insert(pos, removed);
            return Err(e);
        }

        if let Some(group) = self
            .groups
            .iter_mut()
            .find(|g| g.ordinal == ordinal.group_ordinal())
        {
            group.retired.push(ordinal.index);
            group.retired.sort_unstable();
        }
        Ok(removed)
    }

    /// Inherit statuses from `previous` for subtasks with the same name and
    /// requirement set. A match inside a group of the same name wins over a
    /// match elsewhere, and each previous subtask is inherited at most once.
    /// Returns warnings for requirements that had started work in `previous`
    /// but are missing now.
    pub fn carry_over(&mut self, previous: &Batch) -> Vec<String> {
        let candidates: Vec<(&str, &Subtask)> = previous
            .groups
            .iter()
            .flat_map(|g| g.subtasks.iter().map(move |s| (g.name.as_str(), s)))
            .collect();
        let mut taken = vec![false; candidates.len()];
        let mut matched = HashSet::new();

        for same_group in [true, false] {
            for (gi, group) in self.groups.iter_mut().enumerate() {
                for (si, subtask) in group.subtasks.iter_mut().enumerate() {
                    if matched.contains(&(gi, si)) {
                        continue;
                    }
                    let found =
                        candidates.iter().zip(&taken).position(|((name, prev), used)| {
                            !used
                                && (!same_group || *name == group.name)
                                && same_work(prev, &*subtask)
                        });
                    if let Some(ci) = found {
                        taken[ci] = true;
                        matched.insert((gi, si));
                        subtask.status = candidates[ci].1.status;
                    }
                }
            }
        }

        let current: HashSet<&str> = self.requirements.iter().map(|r| r.id.as_str()).collect();
        let mut warnings = Vec::new();
        for prev in previous.subtasks() {
            if prev.status == SubtaskStatus::Pending {
                continue;
            }
            for id in &prev.requirement_ids {
                if !current.contains(id.as_str()) {
                    let warning = format!(
                        "requirement {id} (referenced by {} subtask {} in batch {}) is no longer extracted",
                        prev.status, prev.ordinal, previous.number
                    );
                    tracing::warn!("{warning}");
                    warnings.push(warning);
                }
            }
        }
        warnings
    }

    /// "2/5 done, 1 in progress"
    pub fn summary(&self) -> String {
        let total = self.subtasks().count();
        let done = self
            .subtasks()
            .filter(|s| s.status == SubtaskStatus::Done)
            .count();
        let in_progress = self
            .subtasks()
            .filter(|s| s.status == SubtaskStatus::InProgress)
            .count();
        format!("{done}/{total} done, {in_progress} in progress")
    }
}

fn same_work(a: &Subtask, b: &Subtask) -> bool {
    let ids = |s: &Subtask| -> HashSet<String> { s.requirement_ids.iter().cloned().collect() };
    a.name == b.name && ids(a) == ids(b)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
