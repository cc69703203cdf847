use crate::output::{print_json, print_table};
use anyhow::Context;
use std::path::Path;
use taskforge_core::batch::Batch;
use taskforge_core::{paths, trace};

pub fn run(root: &Path, feature: &str, json: bool) -> anyhow::Result<()> {
    paths::validate_feature(feature)?;
    let batch = Batch::latest(root, feature)
        .with_context(|| format!("failed to load batch for feature '{feature}'"))?;
    let rows = trace::build_matrix(&batch);

    if json {
        let requirements: Vec<_> = batch
            .requirements
            .iter()
            .map(|r| {
                let (done, total) = trace::requirement_progress(&rows, &r.id);
                serde_json::json!({ "id": r.id, "done": done, "subtasks": total })
            })
            .collect();
        return print_json(&serde_json::json!({
            "feature": feature,
            "batch": batch.number,
            "summary": batch.summary(),
            "groups": batch.groups,
            "requirements": requirements,
        }));
    }

    println!(
        "Feature '{feature}', batch {} (generated {})",
        batch.number,
        batch.created_at.format("%Y-%m-%d %H:%M UTC")
    );
    for group in &batch.groups {
        println!("\n{} {}", group.ordinal, group.name);
        let table: Vec<Vec<String>> = group
            .subtasks
            .iter()
            .map(|s| {
                vec![
                    s.ordinal.to_string(),
                    s.status.to_string(),
                    s.name.clone(),
                    s.requirement_ids.join(", "),
                ]
            })
            .collect();
        if table.is_empty() {
            println!("  (no subtasks)");
        } else {
            print_table(&["SUBTASK", "STATUS", "NAME", "REQUIREMENTS"], &table);
        }
    }

    let complete = batch
        .requirements
        .iter()
        .filter(|r| {
            let (done, total) = trace::requirement_progress(&rows, &r.id);
            total > 0 && done == total
        })
        .count();
    println!(
        "\n{}; {complete}/{} requirements fully implemented.",
        batch.summary(),
        batch.requirements.len()
    );
    Ok(())
}
