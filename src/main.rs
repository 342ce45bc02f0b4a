use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use copri::config::CopriConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "copri")]
#[command(version, about = "Stage a GitHub token and push local changes with it")]
pub struct Cli {
    /// Debug logging (RUST_LOG still wins)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to copri.toml (defaults to ./copri.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Working copy to push from. Overrides [repository].path
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    /// Where the staged token is stored. Overrides [secret].path
    #[arg(long, global = true)]
    pub secret_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (token form and push endpoint)
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Permissive CORS, bind 0.0.0.0
        #[arg(long)]
        dev: bool,
        /// Open the token form in a browser once listening
        #[arg(long)]
        open: bool,
    },
    /// Commit and push pending changes using the staged token
    Push,
    /// Manage the staged token
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// View and manage copri.toml
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum TokenCommands {
    /// Stage a token; prompts without echo when --value is absent
    Stage {
        #[arg(long)]
        value: Option<String>,
    },
    /// Show whether a token is staged (masked)
    Status,
    /// Delete the staged token
    Clear,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default copri.toml
    Init {
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// CLI flags are the last configuration layer.
    fn apply_overrides(&self, config: &mut CopriConfig) {
        if let Some(repo) = &self.repo {
            config.repository.path = repo.clone();
        }
        if let Some(path) = &self.secret_path {
            config.secret.path = path.clone();
        }
        if let Commands::Serve {
            host, port, dev, ..
        } = &self.command
        {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            if *dev {
                config.server.dev_mode = true;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // `config init` must work before any config file exists.
    if let Commands::Config {
        command: Some(ConfigCommands::Init { force }),
    } = &cli.command
    {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(copri::config::CONFIG_FILE_NAME));
        return cmd::config::cmd_config_init(&path, *force);
    }

    let mut config = CopriConfig::load_or_default(cli.config.as_deref())?;
    config.apply_env()?;
    cli.apply_overrides(&mut config);

    let _log_guard = copri::logging::init(&config.logging, cli.verbose)?;

    match &cli.command {
        Commands::Serve { open, .. } => cmd::cmd_serve(&config, *open).await?,
        Commands::Push => cmd::cmd_push(&config).await?,
        Commands::Token { command } => cmd::cmd_token(&config, command.clone()).await?,
        Commands::Config { command } => {
            cmd::cmd_config(&config, cli.config.as_deref(), command.clone())?
        }
    }

    Ok(())
}
