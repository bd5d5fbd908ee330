//! `pingcord status` — show configuration and template status.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;

use pingcord_core::config::{get_config_path, Config};

use crate::helpers::mark;

/// Run the status command.
pub fn run(config: &Config, config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(get_config_path);

    println!();
    println!("{}", "PingCord Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found)".red().to_string()
        }
    );

    let discord = &config.discord;
    println!(
        "  {:<18} {}",
        "Bot token:".bold(),
        mark(discord.is_configured(), "set", "not configured")
    );
    println!("  {:<18} {}", "API:".bold(), discord.api_url());
    println!(
        "  {:<18} {} | max_message_len: {}",
        "Delivery:".bold(),
        config.delivery.mode,
        format!("{}", discord.max_message_len).dimmed(),
    );

    println!();
    println!("  {}", "Templates:".bold());
    if config.templates.is_empty() {
        println!("    {}", "· none configured".dimmed());
    }

    let mut keys: Vec<&String> = config.templates.keys().collect();
    keys.sort();
    for key in keys {
        let tpl = &config.templates[key];
        let status = match tpl.to_template() {
            Ok(_) => format!(
                "{} {} recipient(s)  {}",
                "✓".green(),
                tpl.recipients.len(),
                tpl.template.dimmed()
            ),
            Err(e) => format!("{} {}", "✗".red(), e),
        };
        println!("    {:<20} {}", key, status);
    }

    println!();

    Ok(())
}
