//! CLI command implementations.
//!
//! | Module   | Commands handled              |
//! |----------|-------------------------------|
//! | `serve`  | `Serve`                       |
//! | `push`   | `Push`                        |
//! | `token`  | `Token stage/status/clear`    |
//! | `config` | `Config show/validate/init`   |

pub mod config;
pub mod push;
pub mod serve;
pub mod token;

pub use config::cmd_config;
pub use push::cmd_push;
pub use serve::cmd_serve;
pub use token::cmd_token;

use std::sync::Arc;

use copri::config::CopriConfig;
use copri::git::GitCli;
use copri::push::PushOrchestrator;
use copri::secret::FileSecretStore;

fn secret_store(config: &CopriConfig) -> Arc<FileSecretStore> {
    Arc::new(FileSecretStore::new(config.secret.path.clone()))
}

fn orchestrator(config: &CopriConfig) -> Arc<PushOrchestrator> {
    let git = GitCli::new(config.repository.path.clone(), config.repository.command_timeout());
    Arc::new(PushOrchestrator::new(
        secret_store(config),
        Arc::new(git),
        config.repository.push_settings(),
    ))
}
