//! Project setup and inspection: `swarm init`, `swarm agents`, `swarm config`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use swarm::config::{CONFIG_FILE, SwarmConfig, init_config};
use swarm::worker::Role;

pub fn cmd_init(project_dir: &Path, force: bool) -> Result<()> {
    let path = init_config(project_dir, force)?;
    let config = SwarmConfig::load(project_dir);

    println!();
    println!("{} Created {}", style("✓").green(), path.display());
    println!(
        "{} Workspace at {}",
        style("✓").green(),
        config.workspace(project_dir).display()
    );
    println!();
    println!("Next: swarm run \"<task>\"");
    Ok(())
}

pub fn cmd_agents(project_dir: &Path) -> Result<()> {
    let config = SwarmConfig::load(project_dir);

    println!();
    println!("{}", style("Agents").bold().cyan());
    println!("──────");
    println!("{:<11} {:<8} {:<6} Description", "Name", "Enabled", "Turns");

    for role in Role::ALL {
        let overrides = config.agents.get(role.name());
        let enabled = config.agent_enabled(role.name());
        let turns = overrides
            .and_then(|o| o.max_turns)
            .unwrap_or_else(|| role.max_turns());
        let marker = if enabled {
            style("yes").green()
        } else {
            style("no").dim()
        };
        println!(
            "{:<11} {:<8} {:<6} {}",
            role.name(),
            marker,
            turns,
            role.description()
        );
    }

    if !config.custom_agents.is_empty() {
        println!();
        println!("{}", style("Custom agents").bold());
        for (name, custom) in &config.custom_agents {
            let first_line = custom.system_prompt.lines().next().unwrap_or("");
            println!("{:<20} {}", name, style(first_line).dim());
        }
    }
    println!();
    Ok(())
}

pub fn cmd_config(project_dir: &Path) -> Result<()> {
    let config = SwarmConfig::load(project_dir);
    let path = project_dir.join(CONFIG_FILE);

    println!();
    println!("{}", style("Swarm Configuration").bold().cyan());
    println!("───────────────────");
    if path.exists() {
        println!("Config file: {}", path.display());
    } else {
        println!(
            "Config file: {} (not found, using defaults)",
            style(path.display()).dim()
        );
    }
    println!();

    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    print!("{}", yaml);
    Ok(())
}
