use anyhow::Result;
use colored::*;
use trellis_core::workspace_manager::WorkspaceManager;

pub fn execute(manager: &WorkspaceManager, json: bool) -> Result<()> {
    let specs = manager.resolved_plugin_specs();

    if json {
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }

    println!("{}", "Plugins (load order):".bold().underline());

    for (position, spec) in specs.iter().enumerate() {
        let mut markers = Vec::new();
        if spec.options.is_some() {
            markers.push("configured");
        }
        if spec.include.is_some() || spec.exclude.is_some() {
            markers.push("filtered");
        }

        if markers.is_empty() {
            println!("{}. {}", position + 1, spec.plugin.blue().bold());
        } else {
            println!(
                "{}. {} {}",
                position + 1,
                spec.plugin.blue().bold(),
                format!("[{}]", markers.join(", ")).dimmed()
            );
        }
    }

    Ok(())
}
