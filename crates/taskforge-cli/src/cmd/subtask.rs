use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;
use taskforge_core::config::Config;
use taskforge_core::ordinal::SubtaskOrdinal;
use taskforge_core::pipeline::{self, SubtaskAction};

#[derive(Subcommand)]
pub enum SubtaskSubcommand {
    /// Mark a subtask in progress
    Start { feature: String, ordinal: SubtaskOrdinal },
    /// Mark a subtask done
    Done { feature: String, ordinal: SubtaskOrdinal },
    /// Return a subtask to pending
    Reset { feature: String, ordinal: SubtaskOrdinal },
    /// Remove a subtask; its ordinal is never reused
    Remove { feature: String, ordinal: SubtaskOrdinal },
}

pub fn run(root: &Path, subcmd: SubtaskSubcommand, json: bool) -> anyhow::Result<()> {
    let (feature, ordinal, action) = match subcmd {
        SubtaskSubcommand::Start { feature, ordinal } => (feature, ordinal, SubtaskAction::Start),
        SubtaskSubcommand::Done { feature, ordinal } => (feature, ordinal, SubtaskAction::Done),
        SubtaskSubcommand::Reset { feature, ordinal } => (feature, ordinal, SubtaskAction::Reset),
        SubtaskSubcommand::Remove { feature, ordinal } => (feature, ordinal, SubtaskAction::Remove),
    };
    let config = Config::load(root).context("failed to load config")?;
    let report = pipeline::update_subtask(root, &config, &feature, ordinal, action)
        .with_context(|| format!("failed to update subtask {ordinal} of '{feature}'"))?;

    if json {
        return print_json(&report);
    }
    match report.status {
        Some(status) => println!("Subtask {ordinal} is now {status}."),
        None => println!("Removed subtask {ordinal}."),
    }
    println!("Batch {}: {}.", report.batch, report.summary);
    Ok(())
}
