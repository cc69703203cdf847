use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use taskforge_core::config::Config;
use taskforge_core::pipeline;

pub fn run(root: &Path, feature: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let report = pipeline::verify(root, &config, feature)
        .with_context(|| format!("emitted documents for '{feature}' failed verification"))?;

    if json {
        return print_json(&report);
    }
    println!(
        "OK: batch {}: {} chunk(s), {} requirements, {} subtasks, {} matrix rows.",
        report.batch, report.chunks, report.requirements, report.subtasks, report.rows
    );
    Ok(())
}
