use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use taskforge_core::{config::Config, io, paths};

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let mut created = Vec::new();

    for dir in [paths::TASKFORGE_DIR, paths::FEATURES_DIR, paths::LOCKS_DIR] {
        let p = root.join(dir);
        if !p.is_dir() {
            io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
            created.push(dir.to_string());
        }
    }

    let config_path = paths::config_path(root);
    let config_created = !config_path.exists();
    if config_created {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        created.push(paths::CONFIG_FILE.to_string());
    }

    if json {
        return print_json(&serde_json::json!({
            "root": root,
            "created": created,
        }));
    }

    println!("Initializing taskforge in: {}", root.display());
    if config_created {
        println!("  created: {}", paths::CONFIG_FILE);
    } else {
        println!("  exists:  {}", paths::CONFIG_FILE);
    }
    println!("\nNext: add prd-<feature>.md and architecture-<feature>.md, then run");
    println!("  taskforge generate <feature>");
    Ok(())
}
