//! One-shot push from the terminal: `copri push`.

use anyhow::Result;
use console::style;

use copri::config::CopriConfig;
use copri::push::PushOutcome;

pub async fn cmd_push(config: &CopriConfig) -> Result<()> {
    let orchestrator = super::orchestrator(config);

    // Ctrl+C stops the attempt at the next step boundary.
    let canceller = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{}",
                    style("Cancelling after the current git command...").yellow()
                );
                orchestrator.cancel();
            }
        })
    };
    let result = orchestrator.push().await;
    canceller.abort();

    match result {
        Ok(PushOutcome::NoChanges) => {
            println!("{}", style(PushOutcome::NoChanges.message()).yellow());
            println!("The staged token was kept for the next push.");
            Ok(())
        }
        Ok(PushOutcome::Pushed(summary)) => {
            println!(
                "{}",
                style("Updates pushed to GitHub successfully.").green().bold()
            );
            println!("  remote:  {}", summary.remote);
            println!("  branch:  {}", summary.branch);
            if let Some(repo) = &summary.repository {
                println!("  repo:    {}", repo);
            }
            if let Some(sha) = &summary.commit_sha {
                println!("  commit:  {}", sha);
            }
            println!("  files:   {}", summary.changed_files);
            println!("  message: {}", summary.commit_message);
            Ok(())
        }
        Err(err) => {
            eprintln!("{} {}", style("Error:").red().bold(), err.message());
            eprintln!("  {}", err);
            if let Some(failure) = err.command_failure() {
                if !failure.stdout.trim().is_empty() {
                    eprintln!("  stdout: {}", failure.stdout.trim());
                }
                if !failure.stderr.trim().is_empty() {
                    eprintln!("  stderr: {}", failure.stderr.trim());
                }
            }
            if err.retryable() {
                eprintln!("  The staged token was kept; run 'copri push' again to retry.");
            } else {
                eprintln!("  Stage a token with 'copri token stage' first.");
            }
            anyhow::bail!("push failed at {}", err.step())
        }
    }
}
