use super::load_registry;
use crate::Context;
use crate::cli::ConnectionArgs;
use crate::config::AppConfig;
use crate::ui;
use anyhow::Result;
use colored::Colorize;

/// List every kind with its aliases. Needs no controller connection.
pub fn list(ctx: &Context, connection: &ConnectionArgs) -> Result<()> {
    let config = AppConfig::load(connection.config.as_deref())?.with_overrides(connection);
    let registry = load_registry(&config)?;

    if !ctx.quiet {
        ui::header("Resource kinds");
        for path in config.descriptor_paths() {
            ui::dim(&format!("descriptors from {}", path.display()));
        }
    }
    for kind in registry.kinds() {
        let descriptor = registry.get(kind)?;
        let aliases = registry.aliases_of(kind);
        let label = if descriptor.is_workflow() {
            format!("{kind} (workflow, {} steps)", descriptor.workflow.len())
        } else {
            kind.to_string()
        };
        if aliases.is_empty() {
            println!("  {}", label.bold());
        } else {
            println!("  {} {}", label.bold(), format!("= {}", aliases.join(", ")).dimmed());
        }
    }
    Ok(())
}

/// Print a descriptor as JSON.
pub fn describe(connection: &ConnectionArgs, kind: &str) -> Result<()> {
    let config = AppConfig::load(connection.config.as_deref())?.with_overrides(connection);
    let registry = load_registry(&config)?;
    let descriptor = registry.get(kind)?;
    println!("{}", serde_json::to_string_pretty(descriptor.as_ref())?);
    Ok(())
}
