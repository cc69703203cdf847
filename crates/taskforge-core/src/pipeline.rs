//! End-to-end runs: generation and in-place subtask updates.
//!
//! Every mutating entry point holds the feature's run lock for its whole
//! duration. Nothing reaches disk until the batch has passed validation.

use crate::batch::Batch;
use crate::checkpoint::{approve_groups, ApprovalGate};
use crate::config::Config;
use crate::error::{Result, TaskforgeError};
use crate::grouping::{Grouper, RuleGrouper};
use crate::loader::{self, LoadedDocuments};
use crate::lock::RunLock;
use crate::ordinal::SubtaskOrdinal;
use crate::parse;
use crate::render::{self, architecture_overview};
use crate::requirement::{extract_requirements, Extractor, Requirement, RuleExtractor};
use crate::subtask::{expand_group, Expander, RuleExpander};
use crate::trace;
use crate::types::{DocumentKind, SubtaskStatus};
use crate::validate::validate_batch;
use serde::Serialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

pub struct Collaborators {
    pub extractor: Box<dyn Extractor>,
    pub grouper: Box<dyn Grouper>,
    pub expander: Box<dyn Expander>,
}

impl Collaborators {
    pub fn from_config(config: &Config, root: &Path) -> Result<Self> {
        Ok(Self {
            extractor: config.collaborators.extractor(root)?,
            grouper: config.collaborators.grouper(root)?,
            expander: config.collaborators.expander(root)?,
        })
    }

    /// The deterministic rule-based set.
    pub fn rules() -> Self {
        Self {
            extractor: Box::new(RuleExtractor),
            grouper: Box::new(RuleGrouper),
            expander: Box::new(RuleExpander),
        }
    }
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Render in memory only: no documents, no batch record, no lock file.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub feature: String,
    /// Batch number, unset on a dry run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<u32>,
    pub requirements: usize,
    pub groups: usize,
    pub subtasks: usize,
    pub attempts: usize,
    pub documents: Vec<String>,
    pub written: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
}

/// Run the full pipeline for `feature`.
pub fn generate(
    root: &Path,
    config: &Config,
    feature: &str,
    collaborators: &Collaborators,
    gate: &mut dyn ApprovalGate,
    options: &RunOptions,
) -> Result<RunReport> {
    crate::paths::validate_feature(feature)?;
    let _lock = if options.dry_run {
        RunLock::check(root, feature)?;
        None
    } else {
        Some(RunLock::acquire(root, feature)?)
    };

    let docs = loader::load(&config.inputs_dir(root), feature)?;
    let mut warnings = docs.warnings.clone();
    let requirements = extract_requirements(collaborators.extractor.as_ref(), &docs)?;

    let approved = approve_groups(collaborators.grouper.as_ref(), &requirements, gate)?;
    let mut groups = approved.groups;
    for group in &mut groups {
        expand_group(collaborators.expander.as_ref(), group, &requirements)?;
    }

    let overview = docs
        .get(DocumentKind::Architecture)
        .map(|d| architecture_overview(&d.raw_text))
        .unwrap_or_default();
    let mut batch = Batch::new(feature, overview, requirements, groups, approved.attempts);

    match Batch::latest(root, feature) {
        Ok(previous) => warnings.extend(batch.carry_over(&previous)),
        Err(TaskforgeError::NoBatch(_)) => {}
        Err(e) => return Err(e),
    }

    let rendered = render::emit(&batch, config.outputs.max_lines_per_chunk)?;
    let mut report = RunReport {
        feature: feature.to_string(),
        batch: None,
        requirements: batch.requirements.len(),
        groups: batch.groups.len(),
        subtasks: batch.subtasks().count(),
        attempts: batch.grouping_attempts.len(),
        documents: rendered.iter().map(|d| d.file_name.clone()).collect(),
        written: Vec::new(),
        removed: Vec::new(),
        warnings,
        dry_run: options.dry_run,
    };
    if options.dry_run {
        tracing::info!(feature, documents = report.documents.len(), "dry run; nothing written");
        return Ok(report);
    }

    let written = render::write_documents(&config.outputs_dir(root), feature, &rendered)?;
    batch.save_new(root)?;
    tracing::info!(feature, batch = batch.number, "generation complete");

    report.batch = Some(batch.number);
    report.written = written.written;
    report.removed = written.removed;
    Ok(report)
}

/// Load and extract only, for reviewing what a run would start from.
pub fn preview_requirements(
    root: &Path,
    config: &Config,
    feature: &str,
    extractor: &dyn Extractor,
) -> Result<(LoadedDocuments, Vec<Requirement>)> {
    let docs = loader::load(&config.inputs_dir(root), feature)?;
    let requirements = extract_requirements(extractor, &docs)?;
    Ok((docs, requirements))
}

// ---------------------------------------------------------------------------
// Subtask updates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtaskAction {
    Start,
    Done,
    Reset,
    Remove,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub feature: String,
    pub batch: u32,
    pub subtask: SubtaskOrdinal,
    /// New status, unset when the subtask was removed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubtaskStatus>,
    pub summary: String,
    pub written: Vec<PathBuf>,
}

/// Apply `action` to one subtask of the latest batch and re-emit the
/// documents. The batch record is rewritten in place.
pub fn update_subtask(
    root: &Path,
    config: &Config,
    feature: &str,
    ordinal: SubtaskOrdinal,
    action: SubtaskAction,
) -> Result<UpdateReport> {
    crate::paths::validate_feature(feature)?;
    let _lock = RunLock::acquire(root, feature)?;
    let mut batch = Batch::latest(root, feature)?;

    let status = match action {
        SubtaskAction::Start => Some(SubtaskStatus::InProgress),
        SubtaskAction::Done => Some(SubtaskStatus::Done),
        SubtaskAction::Reset => Some(SubtaskStatus::Pending),
        SubtaskAction::Remove => None,
    };
    match status {
        Some(status) => batch.set_status(ordinal, status)?,
        None => {
            let removed = batch.retire_subtask(ordinal)?;
            tracing::info!(subtask = %removed.ordinal, name = %removed.name, "removed subtask");
        }
    }

    let rendered = render::emit(&batch, config.outputs.max_lines_per_chunk)?;
    let written = render::write_documents(&config.outputs_dir(root), feature, &rendered)?;
    batch.save(root)?;

    Ok(UpdateReport {
        feature: feature.to_string(),
        batch: batch.number,
        subtask: ordinal,
        status,
        summary: batch.summary(),
        written: written.written,
    })
}

// ---------------------------------------------------------------------------
// Verification of emitted documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub feature: String,
    pub batch: u32,
    pub chunks: usize,
    pub requirements: usize,
    pub subtasks: usize,
    pub rows: usize,
}

/// Re-parse the emitted documents and check them against the latest batch.
pub fn verify(root: &Path, config: &Config, feature: &str) -> Result<VerifyReport> {
    crate::paths::validate_feature(feature)?;
    let batch = Batch::latest(root, feature)?;
    validate_batch(&batch)?;
    let emitted = parse::read_emitted(&config.outputs_dir(root), feature)?;
    parse::verify_documents(&batch, &emitted.tasks, &emitted.matrix)?;
    Ok(VerifyReport {
        feature: feature.to_string(),
        batch: batch.number,
        chunks: emitted.chunks,
        requirements: batch.requirements.len(),
        subtasks: batch.subtasks().count(),
        rows: trace::build_matrix(&batch).len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
