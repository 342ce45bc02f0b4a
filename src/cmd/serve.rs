//! HTTP server command: `copri serve`.

use anyhow::Result;
use console::style;

use copri::config::CopriConfig;
use copri::server::{ServerConfig, start_server};

pub async fn cmd_serve(config: &CopriConfig, open: bool) -> Result<()> {
    let server = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        dev_mode: config.server.dev_mode,
        github_api_base: config.github.api_base_url.clone(),
    };
    let dev = server.dev_mode;

    tracing::info!(
        repo = %config.repository.path.display(),
        secret = %config.secret.path.display(),
        auth_mode = %config.repository.auth_mode,
        "Starting CoPri"
    );

    start_server(server, super::orchestrator(config), move |addr| {
        let form_url = format!("http://localhost:{}/input-secure-token", addr.port());
        println!(
            "{} {}",
            style("CoPri running at").bold(),
            style(format!("http://{}", addr)).cyan()
        );
        println!("Submit a token at {}", form_url);

        // No browser inside containers.
        if open && !dev {
            tokio::spawn(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
                if let Err(e) = open::that(&form_url) {
                    eprintln!("Failed to open browser: {}", e);
                }
            });
        }
    })
    .await?;

    println!("Server shut down gracefully.");
    Ok(())
}
