use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use taskforge_core::{lock::RunLock, paths};

pub fn run(root: &Path, feature: &str, json: bool) -> anyhow::Result<()> {
    paths::validate_feature(feature)?;
    let holder = RunLock::holder(root, feature).context("failed to read run lock")?;
    let cleared = RunLock::clear(root, feature).context("failed to remove run lock")?;

    if json {
        return print_json(&serde_json::json!({
            "feature": feature,
            "cleared": cleared,
            "holder": holder,
        }));
    }

    match (cleared, holder) {
        (true, Some(info)) => println!(
            "Cleared lock for '{feature}' (pid {}, started {}).",
            info.pid,
            info.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        (true, None) => println!("Cleared lock for '{feature}'."),
        (false, _) => println!("No lock held for '{feature}'."),
    }
    Ok(())
}
