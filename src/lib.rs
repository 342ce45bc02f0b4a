pub mod config;
pub mod connectors;
pub mod errors;
pub mod git;
pub mod logging;
pub mod push;
pub mod secret;
pub mod server;
