//! The grouping approval checkpoint.
//!
//! Proposed groups are shown to an operator and the run blocks until an
//! explicit decision arrives: `Go` freezes the groups, a rejection re-runs the
//! grouper with the feedback appended, and `Abandon` ends the run. There is no
//! retry limit; every attempt is logged and kept in the batch audit trail.

use crate::error::{Result, TaskforgeError};
use crate::grouping::{propose_groups, Grouper, TaskGroup};
use crate::requirement::Requirement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Go,
    Reject(String),
    Abandon,
}

pub struct Proposal<'a> {
    /// 1-based attempt counter.
    pub attempt: u32,
    pub groups: &'a [TaskGroup],
    pub requirements: &'a [Requirement],
}

pub trait ApprovalGate {
    /// Block until the operator decides on `proposal`.
    fn decide(&mut self, proposal: &Proposal<'_>) -> Result<Decision>;
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Approved,
    Rejected { feedback: String },
    Abandoned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupingAttempt {
    pub attempt: u32,
    /// One line per proposed group: `1.0 Cart [REQ-1, REQ-2]`.
    pub groups: Vec<String>,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub decided_at: DateTime<Utc>,
}

fn summarize(groups: &[TaskGroup]) -> Vec<String> {
    groups
        .iter()
        .map(|g| format!("{} {} [{}]", g.ordinal, g.name, g.requirement_ids.join(", ")))
        .collect()
}

/// Human-readable rendering of a proposal for terminal review.
pub fn render_proposal(proposal: &Proposal<'_>) -> String {
    let mut out = format!("Proposed task groups (attempt {}):\n", proposal.attempt);
    for group in proposal.groups {
        out.push_str(&format!("\n{} {}\n", group.ordinal, group.name));
        for id in &group.requirement_ids {
            let text = proposal
                .requirements
                .iter()
                .find(|r| &r.id == id)
                .map(|r| r.text.as_str())
                .unwrap_or("");
            out.push_str(&format!("  - {id}: {text}\n"));
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct ApprovedGroups {
    pub groups: Vec<TaskGroup>,
    pub attempts: Vec<GroupingAttempt>,
}

/// Propose groups and loop on the approval gate until `Go` or `Abandon`.
pub fn approve_groups(
    grouper: &dyn Grouper,
    requirements: &[Requirement],
    gate: &mut dyn ApprovalGate,
) -> Result<ApprovedGroups> {
    let mut feedback: Vec<String> = Vec::new();
    let mut attempts = Vec::new();

    loop {
        let attempt = attempts.len() as u32 + 1;
        let groups = propose_groups(grouper, requirements, &feedback)?;
        let decision = gate.decide(&Proposal {
            attempt,
            groups: &groups,
            requirements,
        })?;

        let outcome = match &decision {
            Decision::Go => AttemptOutcome::Approved,
            Decision::Reject(text) => AttemptOutcome::Rejected {
                feedback: text.clone(),
            },
            Decision::Abandon => AttemptOutcome::Abandoned,
        };
        tracing::info!(attempt, groups = groups.len(), outcome = ?outcome, "grouping decision");
        attempts.push(GroupingAttempt {
            attempt,
            groups: summarize(&groups),
            outcome,
            decided_at: Utc::now(),
        });

        match decision {
            Decision::Go => return Ok(ApprovedGroups { groups, attempts }),
            Decision::Reject(text) => feedback.push(text),
            Decision::Abandon => return Err(TaskforgeError::Abandoned { attempts: attempt }),
        }
    }
}

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

/// Approves the first proposal. Used for `--non-interactive` regeneration.
#[derive(Debug, Default, Clone)]
pub struct AutoApprove;

impl ApprovalGate for AutoApprove {
    fn decide(&mut self, _proposal: &Proposal<'_>) -> Result<Decision> {
        Ok(Decision::Go)
    }
}

/// Line-oriented prompt over any reader/writer pair (normally stdin/stderr).
///
/// `go` approves, `abandon` cancels, any other non-empty line is rejection
/// feedback. End of input counts as abandonment.
pub struct PromptGate<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptGate<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

pub fn parse_decision(line: &str) -> Option<Decision> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.to_lowercase().as_str() {
        "go" | "\"go\"" => Some(Decision::Go),
        "abandon" | "cancel" | "quit" => Some(Decision::Abandon),
        _ => Some(Decision::Reject(line.to_string())),
    }
}

impl<R: BufRead, W: Write> ApprovalGate for PromptGate<R, W> {
    fn decide(&mut self, proposal: &Proposal<'_>) -> Result<Decision> {
        writeln!(self.output, "{}", render_proposal(proposal))?;
        loop {
            write!(
                self.output,
                "Type 'go' to approve, 'abandon' to cancel, or describe changes: "
            )?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(Decision::Abandon);
            }
            if let Some(decision) = parse_decision(&line) {
                return Ok(decision);
            }
        }
    }
}

/// Proposal forwarded to a remote reviewer.
#[derive(Debug, Clone)]
pub struct ProposalNotice {
    pub attempt: u32,
    pub groups: Vec<TaskGroup>,
    /// `render_proposal` output, ready for display.
    pub rendered: String,
}

/// Blocks on a channel for the decision. A closed channel, or an elapsed
/// timeout when one is configured, is treated as abandonment.
pub struct ChannelGate {
    proposals: Sender<ProposalNotice>,
    decisions: Receiver<Decision>,
    timeout: Option<Duration>,
}

impl ChannelGate {
    pub fn new(
        proposals: Sender<ProposalNotice>,
        decisions: Receiver<Decision>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            proposals,
            decisions,
            timeout,
        }
    }
}

impl ApprovalGate for ChannelGate {
    fn decide(&mut self, proposal: &Proposal<'_>) -> Result<Decision> {
        let notice = ProposalNotice {
            attempt: proposal.attempt,
            groups: proposal.groups.to_vec(),
            rendered: render_proposal(proposal),
        };
        if self.proposals.send(notice).is_err() {
            tracing::warn!("approval reviewer disconnected before the proposal was delivered");
            return Ok(Decision::Abandon);
        }
        let decision = match self.timeout {
            Some(timeout) => match self.decisions.recv_timeout(timeout) {
                Ok(d) => d,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(?timeout, "no approval decision before timeout");
                    Decision::Abandon
                }
                Err(RecvTimeoutError::Disconnected) => Decision::Abandon,
            },
            None => self.decisions.recv().unwrap_or(Decision::Abandon),
        };
        Ok(decision)
    }
}

/// Replays pre-recorded decisions, then abandons.
#[derive(Debug, Default)]
pub struct ScriptedGate {
    decisions: VecDeque<Decision>,
}

impl ScriptedGate {
    pub fn new(decisions: impl IntoIterator<Item = Decision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
        }
    }
}

impl ApprovalGate for ScriptedGate {
    fn decide(&mut self, _proposal: &Proposal<'_>) -> Result<Decision> {
        Ok(self.decisions.pop_front().unwrap_or(Decision::Abandon))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
