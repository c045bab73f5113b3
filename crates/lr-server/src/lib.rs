//! Static file server with WebSocket live reload.
//!
//! Serves a directory over HTTP, injects a small reload client into HTML
//! responses, watches the directory for changes, and tells every connected
//! browser to reload when a watched file changes.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use lr_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         port: 9000,
//!         ws_port: 9001,
//!         directory: PathBuf::from("site"),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► content server (port)
//!    │                   └─► static files, HTML + injected reload client
//!    │
//!    └────WS─────► notifier (ws_port) ◄── broadcast_reload ◄── watcher
//!                                                                 │
//!                                              notify ──► debouncer
//! ```

mod app;
mod error;
mod inject;
mod live_reload;
mod middleware;
mod state;
mod static_files;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;

pub use error::ServerError;
use inject::ReloadScript;
use live_reload::{ChangeWatcher, Notifier};
use state::AppState;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address both listeners bind to.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// WebSocket port.
    pub ws_port: u16,
    /// Directory to serve and watch.
    pub directory: PathBuf,
    /// Extensions (without dot) that trigger a reload.
    pub watch_extensions: Vec<String>,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: lr_config::DEFAULT_HOST.to_owned(),
            port: lr_config::DEFAULT_PORT,
            ws_port: lr_config::DEFAULT_PORT + 1,
            directory: PathBuf::from("."),
            watch_extensions: lr_config::DEFAULT_WATCH_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_owned())
                .collect(),
            debounce_ms: lr_config::DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Create server configuration from a loaded [`lr_config::Config`].
#[must_use]
pub fn server_config_from_config(config: &lr_config::Config) -> ServerConfig {
    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        ws_port: config.ws_port(),
        directory: config.directory.clone(),
        watch_extensions: config.watch.extensions.clone(),
        debounce_ms: config.watch.debounce_ms,
    }
}

/// A server with both listeners bound, ready to run.
///
/// Binding is separate from running so that startup failures (bad
/// directory, port in use) surface before anything is spawned.
pub struct Server {
    host: String,
    root: PathBuf,
    watch_extensions: Vec<String>,
    debounce: Duration,
    http_listener: TcpListener,
    ws_listener: TcpListener,
}

impl Server {
    /// Resolve the directory and bind both listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be resolved or either port
    /// cannot be bound.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let root = tokio::fs::canonicalize(&config.directory)
            .await
            .map_err(|source| ServerError::Directory {
                path: config.directory.clone(),
                source,
            })?;

        let http_listener = bind_listener(&config.host, config.port).await?;
        let ws_listener = bind_listener(&config.host, config.ws_port).await?;

        Ok(Self {
            host: config.host,
            root,
            watch_extensions: config.watch_extensions,
            debounce: Duration::from_millis(config.debounce_ms),
            http_listener,
            ws_listener,
        })
    }

    /// Address the content server is listening on.
    pub fn http_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.http_listener.local_addr()?)
    }

    /// Address the notifier is listening on.
    pub fn ws_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.ws_listener.local_addr()?)
    }

    /// Run until `shutdown` completes, then stop everything.
    ///
    /// On shutdown both listeners stop accepting, every WebSocket client is
    /// sent a close frame, and the filesystem watcher is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher cannot be started or a listener fails.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        let ws_port = self.ws_listener.local_addr()?.port();
        let notifier = Arc::new(Notifier::new());

        let mut watcher = ChangeWatcher::new(
            self.root.clone(),
            self.watch_extensions,
            Arc::clone(&notifier),
            self.debounce,
        );
        watcher.start()?;

        let state = Arc::new(AppState {
            root: self.root,
            script: ReloadScript::new(&self.host, ws_port),
        });

        let (stop_tx, stop_rx) = watch::channel(false);

        let http = axum::serve(self.http_listener, app::create_router(state))
            .with_graceful_shutdown(stopped(stop_rx.clone()));
        let ws = axum::serve(
            self.ws_listener,
            app::create_notifier_router(Arc::clone(&notifier)),
        )
        .with_graceful_shutdown(stopped(stop_rx));

        let supervisor = async {
            shutdown.await;
            tracing::info!("Shutdown signal received, stopping server...");
            let _ = stop_tx.send(true);
            notifier.close_all();
            watcher.stop();
        };

        let ((), http_result, ws_result) =
            tokio::join!(supervisor, http.into_future(), ws.into_future());
        http_result?;
        ws_result?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

/// Run the server until Ctrl-C (or SIGTERM on Unix).
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let server = Server::bind(config).await?;
    tracing::info!(
        http = %server.http_addr()?,
        ws = %server.ws_addr()?,
        directory = %server.root.display(),
        "Starting server"
    );
    server.run_until(shutdown_signal()).await
}

/// Bind a listener, resolving host names such as `localhost`.
async fn bind_listener(host: &str, port: u16) -> Result<TcpListener, ServerError> {
    let bare_host = host.trim_start_matches('[').trim_end_matches(']');
    TcpListener::bind((bare_host, port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })
}

/// Resolve once the stop flag is raised.
async fn stopped(mut stop_rx: watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

/// Wait for shutdown signal (Ctrl-C, or SIGTERM on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
