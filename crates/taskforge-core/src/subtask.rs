//! Subtask expansion: decompose an approved task group into independently
//! completable subtasks.
//!
//! Whatever the expander returns, the core hoists context shared by two or
//! more siblings into the group, assigns ordinals, and checks that subtasks
//! only reference their group's requirements.

use crate::collaborator::{ExternalCommand, Stage};
use crate::error::{Result, TaskforgeError};
use crate::grouping::TaskGroup;
use crate::ordinal::SubtaskOrdinal;
use crate::requirement::Requirement;
use crate::types::{SubtaskStatus, TestKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Subtask
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRequirement {
    pub kind: TestKind,
    pub description: String,
}

impl TestRequirement {
    pub fn new(kind: TestKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub ordinal: SubtaskOrdinal,
    pub name: String,
    #[serde(default)]
    pub specific_context: String,
    pub requirement_ids: Vec<String>,
    #[serde(default)]
    pub testing: Vec<TestRequirement>,
    #[serde(default)]
    pub status: SubtaskStatus,
}

/// A subtask as authored by an expander, before ordinals are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskDraft {
    pub name: String,
    #[serde(default)]
    pub specific_context: String,
    pub requirement_ids: Vec<String>,
    #[serde(default)]
    pub testing: Vec<TestRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedGroup {
    #[serde(default)]
    pub shared_context: String,
    pub subtasks: Vec<SubtaskDraft>,
}

// ---------------------------------------------------------------------------
// Expander
// ---------------------------------------------------------------------------

pub trait Expander {
    /// `requirements` holds only the requirements listed by `group`.
    fn expand(&self, group: &TaskGroup, requirements: &[Requirement]) -> Result<ExpandedGroup>;
}

/// Expand `group` in place: run `expander`, hoist shared context, assign
/// ordinals, and check requirement references.
pub fn expand_group(
    expander: &dyn Expander,
    group: &mut TaskGroup,
    all_requirements: &[Requirement],
) -> Result<()> {
    let members: Vec<Requirement> = group
        .requirement_ids
        .iter()
        .filter_map(|id| all_requirements.iter().find(|r| &r.id == id).cloned())
        .collect();
    let expanded = expander.expand(group, &members)?;

    let mut shared = group.shared_context.clone();
    append_paragraph(&mut shared, expanded.shared_context.trim());
    let mut drafts = expanded.subtasks;
    hoist_shared_context(&mut shared, &mut drafts);
    group.shared_context = shared;

    let mut index = group.next_subtask_index();
    for draft in drafts {
        let ordinal = group.ordinal.subtask(index);
        for id in &draft.requirement_ids {
            if !group.covers(id) {
                return Err(TaskforgeError::UnknownRequirement {
                    id: id.clone(),
                    owner: format!("subtask {ordinal}"),
                });
            }
        }
        group.subtasks.push(Subtask {
            ordinal,
            name: draft.name.trim().to_string(),
            specific_context: draft.specific_context.trim().to_string(),
            requirement_ids: draft.requirement_ids,
            testing: draft.testing,
            status: SubtaskStatus::Pending,
        });
        index += 1;
    }
    tracing::debug!(group = %group.ordinal, subtasks = group.subtasks.len(), "expanded group");
    Ok(())
}

// ---------------------------------------------------------------------------
// Context hoisting
// ---------------------------------------------------------------------------

/// Split on terminal punctuation followed by whitespace or end of text, and
/// on line breaks. Dots inside tokens (`v1.2`, `api.example.com`) stay put.
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut push = |span: &str| {
        let sentence = span.split_whitespace().collect::<Vec<_>>().join(" ");
        if !sentence.is_empty() {
            out.push(sentence);
        }
    };

    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\n' => Some(i),
            '.' | '!' | '?' => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, next)) = chars.peek() {
                    if !matches!(next, '.' | '!' | '?') {
                        break;
                    }
                    end = j + next.len_utf8();
                    chars.next();
                }
                match chars.peek() {
                    Some(&(_, next)) if !next.is_whitespace() => None,
                    _ => Some(end),
                }
            }
            _ => None,
        };
        if let Some(end) = end {
            push(&text[start..end]);
            start = end;
        }
    }
    push(&text[start..]);
    out
}

fn append_paragraph(target: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

/// Move every sentence that appears in two or more sibling contexts (or is
/// already in `shared`) out of the siblings and into `shared`, once.
pub fn hoist_shared_context(shared: &mut String, drafts: &mut [SubtaskDraft]) {
    let already: HashSet<String> = sentences(shared).into_iter().collect();
    let per_draft: Vec<Vec<String>> = drafts
        .iter()
        .map(|d| sentences(&d.specific_context))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for list in &per_draft {
        for s in list {
            if !order.contains(&s.as_str()) {
                order.push(s.as_str());
            }
        }
        let unique: HashSet<&str> = list.iter().map(String::as_str).collect();
        for s in unique {
            *counts.entry(s).or_default() += 1;
        }
    }

    let hoisted: HashSet<&str> = order
        .iter()
        .copied()
        .filter(|s| counts[s] >= 2 || already.contains(*s))
        .collect();
    if hoisted.is_empty() {
        return;
    }

    for s in order.iter().filter(|s| hoisted.contains(**s)) {
        if !already.contains(*s) {
            tracing::debug!(sentence = %s, "hoisting shared context into group");
            append_paragraph(shared, s);
        }
    }

    for (draft, list) in drafts.iter_mut().zip(&per_draft) {
        if list.iter().any(|s| hoisted.contains(s.as_str())) {
            draft.specific_context = list
                .iter()
                .filter(|s| !hoisted.contains(s.as_str()))
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");
        }
    }
}

// ---------------------------------------------------------------------------
// RuleExpander
// ---------------------------------------------------------------------------

/// Deterministic expander: one subtask per requirement, with testing
/// obligations inferred from keywords in the requirement text.
#[derive(Debug, Default, Clone)]
pub struct RuleExpander;

const NAME_LIMIT: usize = 80;

static KEYWORD_RES: OnceLock<Vec<(TestKind, Regex)>> = OnceLock::new();

fn keyword_res() -> &'static [(TestKind, Regex)] {
    KEYWORD_RES.get_or_init(|| {
        [
            (
                TestKind::Integration,
                r"(?i)\b(api|endpoint|route|database|db|service|webhook|queue)s?\b",
            ),
            (
                TestKind::E2e,
                r"(?i)\b(ui|page|screen|form|button|component|view)s?\b|\busers? can\b",
            ),
            (
                TestKind::Security,
                r"(?i)\b(auth\w*|login|sign[- ]in|permissions?|roles?|tokens?|passwords?|secrets?|encrypt\w*)\b",
            ),
            (
                TestKind::Performance,
                r"(?i)\b(latency|performance|fast|load|throughput|\d+\s?ms)\b",
            ),
            (
                TestKind::ErrorHandling,
                r"(?i)\b(errors?|fail\w*|invalid|retry|retries|timeouts?)\b",
            ),
        ]
        .into_iter()
        .map(|(kind, pattern)| (kind, Regex::new(pattern).unwrap()))
        .collect()
    })
}

/// First sentence of `text`, cut at a word boundary.
pub fn subtask_name(text: &str) -> String {
    let first = sentences(text).into_iter().next().unwrap_or_default();
    let first = first.trim_end_matches(['.', '!', '?']);
    if first.chars().count() <= NAME_LIMIT {
        return first.to_string();
    }
    let mut name = String::new();
    for word in first.split_whitespace() {
        if name.chars().count() + word.chars().count() + 1 > NAME_LIMIT {
            break;
        }
        if !name.is_empty() {
            name.push(' ');
        }
        name.push_str(word);
    }
    name
}

pub fn infer_testing(text: &str, name: &str) -> Vec<TestRequirement> {
    let mut testing = vec![TestRequirement::new(
        TestKind::Unit,
        format!("Unit tests cover: {name}"),
    )];
    for (kind, re) in keyword_res() {
        if re.is_match(text) {
            let description = match kind {
                TestKind::Integration => "Exercise the service boundary end to end",
                TestKind::E2e => "Drive the user flow through the interface",
                TestKind::Security => "Verify access control and credential handling",
                TestKind::Performance => "Measure against the stated performance target",
                TestKind::ErrorHandling => "Cover failure and invalid-input paths",
                TestKind::Unit => continue,
            };
            testing.push(TestRequirement::new(*kind, description));
        }
    }
    testing
}

impl Expander for RuleExpander {
    fn expand(&self, group: &TaskGroup, requirements: &[Requirement]) -> Result<ExpandedGroup> {
        let subtasks = requirements
            .iter()
            .map(|req| {
                let name = subtask_name(&req.text);
                let mut context = format!("{}: {}", req.id, req.text);
                if !context.ends_with(['.', '!', '?']) {
                    context.push('.');
                }
                if req.cross_cutting {
                    context.push_str(&format!(" Apply within {}.", group.name));
                }
                SubtaskDraft {
                    testing: infer_testing(&req.text, &name),
                    name,
                    specific_context: context,
                    requirement_ids: vec![req.id.clone()],
                }
            })
            .collect();
        Ok(ExpandedGroup {
            shared_context: String::new(),
            subtasks,
        })
    }
}

// ---------------------------------------------------------------------------
// PlanExpander
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtaskPlan {
    pub groups: Vec<GroupPlan>,
}

/// Authored subtasks for one group, matched by ordinal (`"1.0"` or `"1"`)
/// or by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPlan {
    pub group: String,
    #[serde(default)]
    pub shared_context: String,
    pub subtasks: Vec<SubtaskDraft>,
}

/// Expander backed by a human-authored YAML plan.
pub struct PlanExpander {
    path: PathBuf,
    plan: SubtaskPlan,
}

impl PlanExpander {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let plan: SubtaskPlan = serde_yaml::from_str(&data)?;
        Ok(Self::from_plan(path, plan))
    }

    pub fn from_plan(path: &Path, plan: SubtaskPlan) -> Self {
        Self {
            path: path.to_path_buf(),
            plan,
        }
    }
}

impl Expander for PlanExpander {
    fn expand(&self, group: &TaskGroup, _requirements: &[Requirement]) -> Result<ExpandedGroup> {
        let entry = self
            .plan
            .groups
            .iter()
            .find(|p| {
                p.group
                    .parse::<crate::ordinal::GroupOrdinal>()
                    .map(|o| o == group.ordinal)
                    .unwrap_or(false)
                    || p.group.eq_ignore_ascii_case(&group.name)
            })
            .ok_or_else(|| {
                TaskforgeError::GroupNotFound(format!(
                    "{} '{}' in plan {}",
                    group.ordinal,
                    group.name,
                    self.path.display()
                ))
            })?;
        Ok(ExpandedGroup {
            shared_context: entry.shared_context.clone(),
            subtasks: entry.subtasks.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// CommandExpander
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ExpandRequest<'a> {
    group: &'a TaskGroup,
    requirements: &'a [Requirement],
}

/// Delegates expansion to an external program.
pub struct CommandExpander {
    command: ExternalCommand,
}

impl CommandExpander {
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }
}

impl Expander for CommandExpander {
    fn expand(&self, group: &TaskGroup, requirements: &[Requirement]) -> Result<ExpandedGroup> {
        self.command.call(
            Stage::Expand,
            &ExpandRequest {
                group,
                requirements,
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
