//! Configuration view and validation commands: `copri config`.

use std::path::Path;

use anyhow::{Context, Result};

use super::super::ConfigCommands;
use copri::config::{CONFIG_FILE_NAME, CopriConfig};

/// Show or validate the effective configuration.
pub fn cmd_config(
    config: &CopriConfig,
    config_path: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let path = config_path.unwrap_or(Path::new(CONFIG_FILE_NAME));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("CoPri Configuration");
            println!("===================");
            println!();
            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("No {} found; using defaults.", path.display());
            }
            println!("Effective values (with env/CLI overrides):");
            println!();
            let rendered =
                toml::to_string_pretty(config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init { force }) => cmd_config_init(path, force)?,
    }

    Ok(())
}

/// Write a default `copri.toml`. Runs before any config is loaded.
pub fn cmd_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("{} already exists.", path.display());
        println!("Pass --force to overwrite it.");
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    CopriConfig::default().save(path)?;

    println!("Created {}", path.display());
    println!();
    println!("You can now customize:");
    println!("  - [repository] path, remote, branch, auth_mode");
    println!("  - [secret] path");
    println!("  - [server] host, port");
    println!();
    Ok(())
}
