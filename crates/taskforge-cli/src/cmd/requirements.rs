use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use taskforge_core::config::Config;
use taskforge_core::pipeline;

pub fn run(root: &Path, feature: &str, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let extractor = config
        .collaborators
        .extractor(root)
        .context("failed to set up extractor")?;
    let (docs, requirements) =
        pipeline::preview_requirements(root, &config, feature, extractor.as_ref())
            .with_context(|| format!("requirement extraction failed for feature '{feature}'"))?;

    if json {
        return print_json(&serde_json::json!({
            "feature": feature,
            "warnings": docs.warnings,
            "requirements": requirements,
        }));
    }

    let rows: Vec<Vec<String>> = requirements
        .iter()
        .map(|r| {
            let mut text = r.text.clone();
            if text.chars().count() > 70 {
                text = text.chars().take(67).collect::<String>() + "...";
            }
            vec![
                r.id.clone(),
                r.source.prefix().to_string(),
                r.section().unwrap_or("-").to_string(),
                if r.cross_cutting { "yes" } else { "" }.to_string(),
                text,
            ]
        })
        .collect();
    print_table(&["ID", "SOURCE", "SECTION", "CROSS", "TEXT"], &rows);
    println!("\n{} requirement(s).", requirements.len());
    Ok(())
}
