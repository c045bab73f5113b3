//! CLI error types.

use lr_config::ConfigError;
use lr_server::ServerError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Server(#[from] ServerError),

    #[error("Failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}
