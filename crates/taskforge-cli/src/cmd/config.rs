use crate::output::print_json;
use anyhow::Context;
use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use taskforge_core::config::{Backend, Config, WarnLevel};

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Route one pipeline stage to a collaborator backend
    SetBackend {
        stage: StageArg,
        #[arg(long = "type", value_name = "TYPE")]
        backend_type: BackendArg,
        /// Program to run (command backend)
        #[arg(long)]
        program: Option<String>,
        /// Extra argument for the program; repeatable
        #[arg(long = "arg", value_name = "ARG")]
        args: Vec<String>,
        /// Plan file, relative to the project root (plan backend)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StageArg {
    Extractor,
    Grouper,
    Expander,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    /// Deterministic built-in rules
    Rules,
    /// External program over JSON stdin/stdout
    Command,
    /// YAML plan file (expander only)
    Plan,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(root, json),
        ConfigSubcommand::Validate => validate(root, json),
        ConfigSubcommand::SetBackend {
            stage,
            backend_type,
            program,
            args,
            path,
        } => set_backend(root, stage, backend_type, program, args, path, json),
    }
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }

    println!("Inputs:           {}", config.inputs_dir(root).display());
    println!("Outputs:          {}", config.outputs_dir(root).display());
    println!("Chunk limit:      {} lines", config.outputs.max_lines_per_chunk);
    println!("Extractor:        {}", backend_display(&config.collaborators.extractor));
    println!("Grouper:          {}", backend_display(&config.collaborators.grouper));
    println!("Expander:         {}", backend_display(&config.collaborators.expander));
    match config.approval.timeout_seconds {
        Some(secs) => println!("Approval timeout: {secs}s"),
        None => println!("Approval timeout: (none)"),
    }
    Ok(())
}

fn backend_display(backend: &Backend) -> String {
    match backend {
        Backend::Rules => "rules".to_string(),
        Backend::Command { program, args } if args.is_empty() => format!("command ({program})"),
        Backend::Command { program, args } => format!("command ({program} {})", args.join(" ")),
        Backend::Plan { path } => format!("plan ({})", path.display()),
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// set-backend
// ---------------------------------------------------------------------------

fn parse_backend(
    backend_type: BackendArg,
    program: Option<String>,
    args: Vec<String>,
    path: Option<PathBuf>,
) -> anyhow::Result<Backend> {
    match backend_type {
        BackendArg::Rules => Ok(Backend::Rules),
        BackendArg::Command => {
            let program =
                program.ok_or_else(|| anyhow::anyhow!("--program is required for command backend"))?;
            Ok(Backend::Command { program, args })
        }
        BackendArg::Plan => {
            let path = path.ok_or_else(|| anyhow::anyhow!("--path is required for plan backend"))?;
            Ok(Backend::Plan { path })
        }
    }
}

fn set_backend(
    root: &Path,
    stage: StageArg,
    backend_type: BackendArg,
    program: Option<String>,
    args: Vec<String>,
    path: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load(root).context("failed to load config")?;
    let backend = parse_backend(backend_type, program, args, path)?;
    let (name, slot) = match stage {
        StageArg::Extractor => ("extractor", &mut config.collaborators.extractor),
        StageArg::Grouper => ("grouper", &mut config.collaborators.grouper),
        StageArg::Expander => ("expander", &mut config.collaborators.expander),
    };
    *slot = backend.clone();

    if let Some(err) = config
        .validate()
        .into_iter()
        .find(|w| w.level == WarnLevel::Error)
    {
        anyhow::bail!("refusing to save config: {}", err.message);
    }
    config.save(root).context("failed to save config")?;

    if json {
        return print_json(&serde_json::json!({
            "stage": name,
            "backend": backend,
        }));
    }
    println!(
        "Stage '{name}' now uses {}.",
        backend_display(&backend)
    );
    Ok(())
}
