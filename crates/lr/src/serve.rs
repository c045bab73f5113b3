//! Serve command implementation.

use std::path::PathBuf;

use clap::Args;
use lr_config::{CliSettings, Config};
use lr_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for serving a directory.
#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// HTTP port (default: 8000).
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (default: localhost).
    #[arg(long)]
    host: Option<String>,

    /// Directory to serve (default: current directory).
    #[arg(short, long)]
    directory: Option<PathBuf>,

    /// WebSocket port (default: HTTP port + 1).
    #[arg(long)]
    ws_port: Option<u16>,

    /// Path to configuration file (default: ./lr.toml if present).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output (request and watcher debug logs).
    #[arg(short, long)]
    pub verbose: bool,
}

impl ServeArgs {
    /// Load configuration, print the banner and run until interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let config = Config::load(self.config.as_deref(), Some(&self.cli_settings()))?;
        tracing::debug!(?config, "Loaded configuration");
        let directory =
            std::fs::canonicalize(&config.directory).unwrap_or_else(|_| config.directory.clone());

        output.separator();
        output.highlight("  Live Reload Server");
        output.separator();
        output.info(&format!("  Serving:    {}", directory.display()));
        output.info(&format!(
            "  HTTP:       http://{}:{}",
            config.server.host, config.server.port
        ));
        output.info(&format!(
            "  WebSocket:  ws://{}:{}",
            config.server.host,
            config.ws_port()
        ));
        if let Some(path) = &config.config_path {
            output.info(&format!("  Config:     {}", path.display()));
        }
        output.separator();
        output.info("  Press Ctrl+C to stop");
        output.info("");

        run_server(server_config_from_config(&config)).await?;

        output.info("Goodbye!");
        Ok(())
    }

    /// CLI overrides for the loaded configuration.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            port: self.port,
            ws_port: self.ws_port,
            directory: self.directory.clone(),
        }
    }
}
