//! Task grouping: partition requirements into top-level task groups.
//!
//! Groups cluster requirements that cannot be implemented apart without
//! leaving a non-functional intermediate state. The core validates every
//! proposal for full coverage and assigns ordinals from 1.0.

use crate::collaborator::{ExternalCommand, Stage};
use crate::error::{Result, TaskforgeError};
use crate::ordinal::GroupOrdinal;
use crate::requirement::{tag_re, Requirement};
use crate::subtask::Subtask;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

pub const DEFAULT_GROUP_NAME: &str = "General";
pub const CROSS_CUTTING_GROUP_NAME: &str = "Cross-cutting concerns";

// ---------------------------------------------------------------------------
// TaskGroup
// ---------------------------------------------------------------------------

/// A grouping as returned by a collaborator, before ordinals are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedGroup {
    pub name: String,
    pub requirement_ids: Vec<String>,
    #[serde(default)]
    pub shared_context: String,
}

impl ProposedGroup {
    pub fn new(name: impl Into<String>, requirement_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            requirement_ids,
            shared_context: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub ordinal: GroupOrdinal,
    pub name: String,
    pub requirement_ids: Vec<String>,
    #[serde(default)]
    pub shared_context: String,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    /// Indices of removed subtasks. Never reused.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retired: Vec<u32>,
}

impl TaskGroup {
    pub fn covers(&self, requirement_id: &str) -> bool {
        self.requirement_ids.iter().any(|r| r == requirement_id)
    }

    /// Next free subtask index, past every live and retired index.
    pub fn next_subtask_index(&self) -> u32 {
        let live = self.subtasks.iter().map(|s| s.ordinal.index);
        live.chain(self.retired.iter().copied()).max().unwrap_or(0) + 1
    }
}

/// Assign ordinals 1.0, 2.0, ... in proposal order. Duplicate ids within a
/// group collapse to their first occurrence.
pub fn assign_ordinals(proposed: Vec<ProposedGroup>) -> Vec<TaskGroup> {
    proposed
        .into_iter()
        .enumerate()
        .map(|(i, g)| {
            let mut seen = HashSet::new();
            let requirement_ids = g
                .requirement_ids
                .into_iter()
                .filter(|id| seen.insert(id.clone()))
                .collect();
            TaskGroup {
                ordinal: GroupOrdinal(i as u32 + 1),
                name: g.name.trim().to_string(),
                requirement_ids,
                shared_context: g.shared_context.trim().to_string(),
                subtasks: Vec::new(),
                retired: Vec::new(),
            }
        })
        .collect()
}

/// Check that `groups` cover `requirements` exactly: no unknown ids, no
/// uncovered requirement, and multi-group listing only for cross-cutting ones.
pub fn validate_groups(requirements: &[Requirement], groups: &[TaskGroup]) -> Result<()> {
    let by_id: HashMap<&str, &Requirement> =
        requirements.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut owners: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for group in groups {
        if group.requirement_ids.is_empty() {
            return Err(TaskforgeError::EmptyGroup(group.ordinal.to_string()));
        }
        for id in &group.requirement_ids {
            if !by_id.contains_key(id.as_str()) {
                return Err(TaskforgeError::UnknownRequirement {
                    id: id.clone(),
                    owner: format!("group {}", group.ordinal),
                });
            }
            owners
                .entry(id.as_str())
                .or_default()
                .push(group.ordinal.to_string());
        }
    }

    for (id, groups) in &owners {
        if groups.len() > 1 && !by_id[id].cross_cutting {
            return Err(TaskforgeError::DuplicateCoverage {
                id: id.to_string(),
                groups: groups.clone(),
            });
        }
    }

    let uncovered: Vec<String> = requirements
        .iter()
        .filter(|r| !owners.contains_key(r.id.as_str()))
        .map(|r| r.id.clone())
        .collect();
    if !uncovered.is_empty() {
        return Err(TaskforgeError::UncoveredRequirement(uncovered));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Grouper
// ---------------------------------------------------------------------------

pub trait Grouper {
    /// Propose groups for `requirements`. `feedback` holds every rejection
    /// message so far, oldest first.
    fn propose(&self, requirements: &[Requirement], feedback: &[String])
        -> Result<Vec<ProposedGroup>>;
}

/// Run `grouper`, assign ordinals, and validate coverage.
pub fn propose_groups(
    grouper: &dyn Grouper,
    requirements: &[Requirement],
    feedback: &[String],
) -> Result<Vec<TaskGroup>> {
    let groups = assign_ordinals(grouper.propose(requirements, feedback)?);
    validate_groups(requirements, &groups)?;
    Ok(groups)
}

// ---------------------------------------------------------------------------
// RuleGrouper
// ---------------------------------------------------------------------------

/// Deterministic grouper.
///
/// Requirements that mention each other's ids are interdependent and share a
/// group; the rest cluster by source section. Cross-cutting requirements are
/// listed under every group. Feedback directives are applied afterwards.
#[derive(Debug, Default, Clone)]
pub struct RuleGrouper;

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// The smaller root wins so clusters stay anchored to their first member.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

impl RuleGrouper {
    fn cluster(&self, requirements: &[Requirement]) -> Vec<ProposedGroup> {
        let index: HashMap<&str, usize> = requirements
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.as_str(), i))
            .collect();
        let mut sets = DisjointSet::new(requirements.len());
        let mut first_in_section: HashMap<Option<&str>, usize> = HashMap::new();

        for (i, req) in requirements.iter().enumerate() {
            if req.cross_cutting {
                continue;
            }
            for m in tag_re().find_iter(&req.text) {
                if let Some(&j) = index.get(m.as_str()) {
                    if !requirements[j].cross_cutting {
                        sets.union(i, j);
                    }
                }
            }
            match first_in_section.get(&req.section()) {
                Some(&j) => sets.union(i, j),
                None => {
                    first_in_section.insert(req.section(), i);
                }
            }
        }

        let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, req) in requirements.iter().enumerate() {
            if !req.cross_cutting {
                clusters.entry(sets.find(i)).or_default().push(i);
            }
        }

        let shared: Vec<String> = requirements
            .iter()
            .filter(|r| r.cross_cutting)
            .map(|r| r.id.clone())
            .collect();

        if clusters.is_empty() {
            if shared.is_empty() {
                return Vec::new();
            }
            return vec![ProposedGroup::new(CROSS_CUTTING_GROUP_NAME, shared)];
        }

        clusters
            .into_values()
            .map(|members| {
                let name = requirements[members[0]]
                    .section()
                    .unwrap_or(DEFAULT_GROUP_NAME)
                    .to_string();
                let mut ids: Vec<String> =
                    members.iter().map(|&i| requirements[i].id.clone()).collect();
                ids.extend(shared.iter().cloned());
                ProposedGroup::new(name, ids)
            })
            .collect()
    }
}

impl Grouper for RuleGrouper {
    fn propose(
        &self,
        requirements: &[Requirement],
        feedback: &[String],
    ) -> Result<Vec<ProposedGroup>> {
        let mut groups = self.cluster(requirements);
        for message in feedback {
            for directive in parse_feedback(message) {
                apply_directive(&mut groups, &directive);
            }
        }
        Ok(groups)
    }
}

// ---------------------------------------------------------------------------
// Feedback directives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// 1-based group numbers as shown in the proposal.
    Merge(Vec<usize>),
    Move { requirement: String, to: usize },
    Rename { group: usize, name: String },
    Unrecognized(String),
}

static MERGE_RE: OnceLock<Regex> = OnceLock::new();
static MOVE_RE: OnceLock<Regex> = OnceLock::new();
static RENAME_RE: OnceLock<Regex> = OnceLock::new();
static NUM_RE: OnceLock<Regex> = OnceLock::new();

fn merge_re() -> &'static Regex {
    MERGE_RE.get_or_init(|| {
        Regex::new(r"(?i)^merge\s+groups?\s+(\d+(?:\.0)?(?:\s*(?:,|&|and)\s*\d+(?:\.0)?)+)$").unwrap()
    })
}

fn move_re() -> &'static Regex {
    MOVE_RE.get_or_init(|| {
        Regex::new(r"(?i)^move\s+(REQ-[A-Za-z0-9_\-]+)\s+(?:in)?to\s+group\s+(\d+)(?:\.0)?$").unwrap()
    })
}

fn rename_re() -> &'static Regex {
    RENAME_RE.get_or_init(|| {
        Regex::new(r"(?i)^rename\s+group\s+(\d+)(?:\.0)?\s+(?:to|as)\s+(.+)$").unwrap()
    })
}

fn num_re() -> &'static Regex {
    NUM_RE.get_or_init(|| Regex::new(r"\d+(?:\.0)?").unwrap())
}

fn group_number(s: &str) -> Option<usize> {
    s.trim_end_matches(".0").parse().ok()
}

/// Split free-text feedback into directives. Segments are separated by
/// newlines or semicolons.
pub fn parse_feedback(message: &str) -> Vec<Directive> {
    message
        .split(['\n', ';'])
        .map(|s| s.trim().trim_end_matches('.').trim())
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if let Some(caps) = merge_re().captures(segment) {
                let groups = num_re()
                    .find_iter(&caps[1])
                    .filter_map(|m| group_number(m.as_str()))
                    .collect();
                Directive::Merge(groups)
            } else if let Some(caps) = move_re().captures(segment) {
                Directive::Move {
                    requirement: caps[1].to_string(),
                    to: caps[2].parse().unwrap_or(0),
                }
            } else if let Some(caps) = rename_re().captures(segment) {
                Directive::Rename {
                    group: caps[1].parse().unwrap_or(0),
                    name: caps[2].trim().trim_matches('"').to_string(),
                }
            } else {
                Directive::Unrecognized(segment.to_string())
            }
        })
        .collect()
}

fn in_range(groups: &[ProposedGroup], n: usize) -> bool {
    n >= 1 && n <= groups.len()
}

pub fn apply_directive(groups: &mut Vec<ProposedGroup>, directive: &Directive) {
    match directive {
        Directive::Merge(numbers) => {
            let mut numbers: Vec<usize> = numbers.clone();
            numbers.sort_unstable();
            numbers.dedup();
            if numbers.len() < 2 || !numbers.iter().all(|&n| in_range(groups, n)) {
                tracing::warn!(?numbers, "ignoring merge: group numbers out of range");
                return;
            }
            let target = numbers[0] - 1;
            // Remove from the back so earlier indices stay valid.
            for &n in numbers[1..].iter().rev() {
                let absorbed = groups.remove(n - 1);
                let into = &mut groups[target];
                for id in absorbed.requirement_ids {
                    if !into.requirement_ids.contains(&id) {
                        into.requirement_ids.push(id);
                    }
                }
                if !absorbed.shared_context.is_empty() {
                    if !into.shared_context.is_empty() {
                        into.shared_context.push('\n');
                    }
                    into.shared_context.push_str(&absorbed.shared_context);
                }
            }
        }
        Directive::Move { requirement, to } => {
            if !in_range(groups, *to) {
                tracing::warn!(group = to, "ignoring move: group number out of range");
                return;
            }
            if !groups.iter().any(|g| g.requirement_ids.contains(requirement)) {
                tracing::warn!(requirement = %requirement, "ignoring move: requirement not grouped");
                return;
            }
            for g in groups.iter_mut() {
                g.requirement_ids.retain(|id| id != requirement);
            }
            groups[to - 1].requirement_ids.push(requirement.clone());
            groups.retain(|g| !g.requirement_ids.is_empty());
        }
        Directive::Rename { group, name } => {
            if !in_range(groups, *group) || name.is_empty() {
                tracing::warn!(group, "ignoring rename: group number out of range");
                return;
            }
            groups[group - 1].name = name.clone();
        }
        Directive::Unrecognized(text) => {
            tracing::warn!(feedback = %text, "unrecognized grouping feedback ignored");
        }
    }
}

// ---------------------------------------------------------------------------
// CommandGrouper
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GroupRequest<'a> {
    requirements: &'a [Requirement],
    feedback: &'a [String],
}

#[derive(Deserialize)]
struct GroupResponse {
    groups: Vec<ProposedGroup>,
}

/// Delegates grouping to an external program.
pub struct CommandGrouper {
    command: ExternalCommand,
}

impl CommandGrouper {
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }
}

impl Grouper for CommandGrouper {
    fn propose(
        &self,
        requirements: &[Requirement],
        feedback: &[String],
    ) -> Result<Vec<ProposedGroup>> {
        let response: GroupResponse = self.command.call(
            Stage::Group,
            &GroupRequest {
                requirements,
                feedback,
            },
        )?;
        Ok(response.groups)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
