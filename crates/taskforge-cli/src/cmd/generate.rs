use crate::output::print_json;
use anyhow::Context;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;
use taskforge_core::checkpoint::{
    parse_decision, ApprovalGate, AutoApprove, ChannelGate, Decision, PromptGate, ProposalNotice,
};
use taskforge_core::config::Config;
use taskforge_core::pipeline::{self, Collaborators, RunOptions, RunReport};

pub fn run(
    root: &Path,
    feature: &str,
    non_interactive: bool,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let collaborators =
        Collaborators::from_config(&config, root).context("failed to set up collaborators")?;
    let options = RunOptions { dry_run };

    let report = if non_interactive {
        execute(root, &config, feature, &collaborators, &mut AutoApprove, &options)?
    } else if let Some(timeout) = config.approval.timeout() {
        let mut gate = stdin_channel_gate(timeout);
        execute(root, &config, feature, &collaborators, &mut gate, &options)?
    } else {
        let stdin = std::io::stdin();
        let mut gate = PromptGate::new(stdin.lock(), std::io::stderr());
        execute(root, &config, feature, &collaborators, &mut gate, &options)?
    };

    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn execute(
    root: &Path,
    config: &Config,
    feature: &str,
    collaborators: &Collaborators,
    gate: &mut dyn ApprovalGate,
    options: &RunOptions,
) -> anyhow::Result<RunReport> {
    pipeline::generate(root, config, feature, collaborators, gate, options)
        .with_context(|| format!("generation failed for feature '{feature}'"))
}

/// Review over stdin on a helper thread so the wait can time out. The
/// thread exits when the gate drops its receiver.
fn stdin_channel_gate(timeout: Duration) -> ChannelGate {
    let (proposal_tx, proposal_rx) = mpsc::channel::<ProposalNotice>();
    let (decision_tx, decision_rx) = mpsc::channel::<Decision>();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut stderr = std::io::stderr();
        for notice in proposal_rx {
            let _ = writeln!(stderr, "{}", notice.rendered);
            let decision = loop {
                let _ = write!(
                    stderr,
                    "Type 'go' to approve, 'abandon' to cancel, or describe changes ({}s): ",
                    timeout.as_secs()
                );
                let _ = stderr.flush();
                let mut line = String::new();
                match input.read_line(&mut line) {
                    Ok(0) | Err(_) => break Decision::Abandon,
                    Ok(_) => {
                        if let Some(d) = parse_decision(&line) {
                            break d;
                        }
                    }
                }
            };
            if decision_tx.send(decision).is_err() {
                break;
            }
        }
    });

    ChannelGate::new(proposal_tx, decision_rx, Some(timeout))
}

fn print_report(report: &RunReport) {
    if report.dry_run {
        println!(
            "Dry run for '{}': {} requirements, {} groups, {} subtasks.",
            report.feature, report.requirements, report.groups, report.subtasks
        );
        for doc in &report.documents {
            println!("  would write: {doc}");
        }
        return;
    }

    println!(
        "Generated batch {} for '{}': {} requirements, {} groups, {} subtasks ({} grouping attempt(s)).",
        report.batch.unwrap_or_default(),
        report.feature,
        report.requirements,
        report.groups,
        report.subtasks,
        report.attempts
    );
    for path in &report.written {
        println!("  wrote:   {}", path.display());
    }
    for path in &report.removed {
        println!("  removed: {}", path.display());
    }
}
