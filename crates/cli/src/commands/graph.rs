use anyhow::Result;
use colored::*;
use trellis_core::workspace_manager::WorkspaceManager;

pub async fn execute(manager: &WorkspaceManager, json: bool) -> Result<()> {
    let graph = manager
        .construct_graph()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to construct project graph: {}", e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&graph)?);
        return Ok(());
    }

    println!("{}", "Project Dependency Graph:".bold().underline());

    if graph.nodes.is_empty() {
        println!("No projects found");
        return Ok(());
    }

    if !graph.cycles.is_empty() {
        let cycles_description = graph
            .cycles
            .iter()
            .map(|cycle| {
                let mut path = cycle.clone();
                if let Some(first) = path.first().cloned() {
                    path.push(first);
                }
                path.join(" -> ")
            })
            .collect::<Vec<_>>()
            .join("; ");

        println!(
            "{} {}",
            "Warning:".yellow().bold(),
            format!("Circular dependencies detected: {}", cycles_description).yellow()
        );
    }

    for (root, project) in &graph.nodes {
        let display_name = project.name.as_deref().unwrap_or(root.as_str());
        println!(
            "{} {}",
            display_name.blue().bold(),
            format!("({})", root).dimmed()
        );

        if !project.targets.is_empty() {
            let targets: Vec<&str> = project.targets.keys().map(String::as_str).collect();
            println!("  {} {}", "targets:".dimmed(), targets.join(", "));
        }

        let deps = graph.dependencies_of_node(root);
        if !deps.is_empty() {
            let names: Vec<&str> = deps.iter().map(|dep| dep.target.as_str()).collect();
            println!("  {} {}", "depends on:".dimmed(), names.join(", "));
        } else {
            println!("  {}", "no dependencies".dimmed());
        }
        println!();
    }

    Ok(())
}
