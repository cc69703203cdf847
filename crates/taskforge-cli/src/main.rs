mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, subtask::SubtaskSubcommand};
use std::path::PathBuf;
use taskforge_core::TaskforgeError;

#[derive(Parser)]
#[command(
    name = "taskforge",
    about = "Compile PRD and architecture documents into numbered task lists and a traceability matrix",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .taskforge/ or .git/)
    #[arg(long, global = true, env = "TASKFORGE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize taskforge in the current project
    Init,

    /// Generate task lists and the traceability matrix for a feature
    Generate {
        feature: String,
        /// Approve the first grouping proposal without prompting
        #[arg(long)]
        non_interactive: bool,
        /// Render in memory and report, without writing any file
        #[arg(long)]
        dry_run: bool,
    },

    /// Extract and list requirements without generating anything
    Requirements { feature: String },

    /// Re-read emitted documents and check them against the latest batch
    Validate { feature: String },

    /// Show subtasks and their status for a feature
    Status { feature: String },

    /// Update or remove a subtask in the latest batch
    Subtask {
        #[command(subcommand)]
        subcommand: SubtaskSubcommand,
    },

    /// Clear a run lock left behind by a crashed run
    Unlock { feature: String },

    /// Show or validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// 1 for missing inputs and general failures, 2 for validation failures,
/// 3 when the operator abandoned the grouping checkpoint.
fn exit_code(e: &anyhow::Error) -> i32 {
    match e.chain().find_map(|c| c.downcast_ref::<TaskforgeError>()) {
        Some(TaskforgeError::Abandoned { .. }) => 3,
        Some(err) if err.is_validation() => 2,
        _ => 1,
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // Usage errors are general failures; 2 is reserved for validation.
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Generate {
            feature,
            non_interactive,
            dry_run,
        } => cmd::generate::run(&root, &feature, non_interactive, dry_run, cli.json),
        Commands::Requirements { feature } => cmd::requirements::run(&root, &feature, cli.json),
        Commands::Validate { feature } => cmd::validate::run(&root, &feature, cli.json),
        Commands::Status { feature } => cmd::status::run(&root, &feature, cli.json),
        Commands::Subtask { subcommand } => cmd::subtask::run(&root, subcommand, cli.json),
        Commands::Unlock { feature } => cmd::unlock::run(&root, &feature, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(exit_code(&e));
    }
}
