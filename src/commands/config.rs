use anyhow::Result;
use colored::Colorize;
use debug_hub::config::{self, Config};
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the current configuration with the auth token masked
pub fn show(path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config_from(path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration file");

    let cfg = config::load_config_from(path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Listen: {}:{}", cfg.server.host, cfg.server.port);
    println!("  Log Level: {}", cfg.core.log_level);
    println!("  Log History: {}", cfg.core.max_log_history);
    println!(
        "  Health Monitor: {}",
        if cfg.monitor.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "  Dashboard Auth: {}",
        if cfg.dashboard.auth_token.is_some() { "token" } else { "open" }
    );

    info!("Configuration validation successful");
    Ok(())
}

fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    if let Some(token) = &mut sanitized.dashboard.auth_token {
        *token = mask_token(token);
    }
    sanitized
}

/// Shows the first and last 4 characters of tokens long enough to keep a secret
fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 11 {
        return "***".to_string();
    }

    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", prefix, suffix)
}
