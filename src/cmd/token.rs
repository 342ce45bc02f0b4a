//! Token staging commands: `copri token`.

use anyhow::{Context, Result};
use console::style;

use super::super::TokenCommands;
use copri::config::CopriConfig;
use copri::connectors::is_valid_github_token;
use copri::secret::SecretStore;

pub async fn cmd_token(config: &CopriConfig, command: TokenCommands) -> Result<()> {
    let store = super::secret_store(config);

    match command {
        TokenCommands::Stage { value } => {
            let raw = match value {
                Some(v) => v,
                None => dialoguer::Password::new()
                    .with_prompt("GitHub personal access token")
                    .interact()
                    .context("Failed to read token from terminal")?,
            };
            let raw = raw.trim();
            if !raw.is_empty() && !is_valid_github_token(raw) {
                println!(
                    "{} this does not look like a GitHub token; staging it anyway.",
                    style("Warning:").yellow().bold()
                );
            }
            let ack = store.stage(raw).await?;
            println!(
                "{} {} at {}",
                style("Staged").green().bold(),
                ack.masked,
                ack.location
            );
        }
        TokenCommands::Status => match store.consume().await {
            Ok(secret) => {
                println!("Token staged: {}", style(secret.masked()).cyan());
                println!("Location: {}", store.location());
            }
            Err(e) if e.is_missing() => {
                println!("No token staged.");
                println!("Stage one with 'copri token stage' or the /input-secure-token form.");
            }
            Err(e) => return Err(e.into()),
        },
        TokenCommands::Clear => {
            store.clear().await?;
            println!("Staged token cleared.");
        }
    }

    Ok(())
}
