use anyhow::Result;
use colored::*;
use trellis_core::workspace_manager::WorkspaceManager;

pub async fn execute(manager: &WorkspaceManager, json: bool) -> Result<()> {
    let graph = manager
        .construct_graph()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to construct project graph: {}", e))?;

    let mut entries: Vec<_> = graph.nodes.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    if json {
        let names: Vec<&str> = entries
            .iter()
            .map(|(root, project)| project.name.as_deref().unwrap_or(root.as_str()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    println!("{}", "Projects".bold().underline());

    if entries.is_empty() {
        println!("  {}", "No projects found".dimmed());
        return Ok(());
    }

    for (root, project) in entries {
        let name = match project.name.as_deref() {
            Some(name) => format!("{} {}", name.blue().bold(), format!("({})", root).dimmed()),
            None => root.cyan().to_string(),
        };

        if project.tags.is_empty() {
            println!("{}", name);
        } else {
            println!(
                "{} {}",
                name,
                format!("[{}]", project.tags.join(", ")).green()
            );
        }
    }

    Ok(())
}
