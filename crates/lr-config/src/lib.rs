//! Configuration management for the lr live-reload server.
//!
//! Configuration is layered: built-in defaults, then an optional `lr.toml`
//! file, then command-line settings ([`CliSettings`]). The result is validated
//! once, after every layer has been applied.
//!
//! ```toml
//! [server]
//! host = "localhost"
//! port = 8000
//! ws_port = 8001
//!
//! [serve]
//! directory = "site"
//!
//! [watch]
//! extensions = ["html", "htm", "css", "js", "json"]
//! debounce_ms = 200
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `server.host` and `serve.directory` support `${VAR}` and
//! `${VAR:-default}`. `serve.directory` additionally expands a leading `~`.

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration filename looked up in the current directory.
pub const CONFIG_FILENAME: &str = "lr.toml";

/// Default host to bind both listeners to.
pub const DEFAULT_HOST: &str = "localhost";

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default debounce window for filesystem events, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

/// File extensions that trigger a reload by default.
pub const DEFAULT_WATCH_EXTENSIONS: [&str; 5] = ["html", "htm", "css", "js", "json"];

/// Upper bound for `watch.debounce_ms`.
const MAX_DEBOUNCE_MS: u64 = 10_000;

/// CLI settings that override configuration file values.
///
/// Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override HTTP port.
    pub port: Option<u16>,
    /// Override WebSocket port.
    pub ws_port: Option<u16>,
    /// Override served directory.
    pub directory: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerConfig,
    /// Served directory as written in TOML.
    serve: ServeConfigRaw,
    /// File watching configuration.
    pub watch: WatchConfig,

    /// Resolved directory to serve and watch (set after loading).
    #[serde(skip)]
    pub directory: PathBuf,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address for both listeners.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// WebSocket port (`None` means HTTP port + 1).
    pub ws_port: Option<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            ws_port: None,
        }
    }
}

/// Raw `[serve]` section (directory as a string).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ServeConfigRaw {
    directory: Option<String>,
}

/// File watching configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Extensions (without the dot, lowercase) that trigger a reload.
    pub extensions: Vec<String>,
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_WATCH_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_owned())
                .collect(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Explicit config file not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Served directory is missing or unusable.
    #[error("{reason}: {}", .path.display())]
    Directory {
        /// Directory as configured.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.host`").
        field: String,
        /// Error message (e.g., "${`LR_HOST`} not set").
        message: String,
    },
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise uses
    /// `lr.toml` from the current directory when present, or defaults.
    /// CLI settings are applied last and the merged result is validated.
    ///
    /// # Errors
    ///
    /// Returns error if the explicit file doesn't exist, parsing fails, or
    /// the merged configuration is invalid.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Effective WebSocket port: explicit value or HTTP port + 1.
    #[must_use]
    pub fn ws_port(&self) -> u16 {
        self.server
            .ws_port
            .unwrap_or_else(|| self.server.port.saturating_add(1))
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(ws_port) = settings.ws_port {
            self.server.ws_port = Some(ws_port);
        }
        if let Some(directory) = &settings.directory {
            self.directory.clone_from(directory);
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` for invalid listener or watch
    /// settings and `ConfigError::Directory` for an unusable directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_watch()?;
        self.validate_directory()?;
        Ok(())
    }

    /// Validate listener configuration.
    fn validate_server(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.host cannot be empty".to_owned(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        match self.server.ws_port {
            Some(0) => {
                return Err(ConfigError::Validation(
                    "server.ws_port cannot be 0".to_owned(),
                ));
            }
            None if self.server.port == u16::MAX => {
                return Err(ConfigError::Validation(format!(
                    "server.ws_port must be set explicitly when server.port is {}",
                    u16::MAX
                )));
            }
            _ => {}
        }

        if self.ws_port() == self.server.port {
            return Err(ConfigError::Validation(format!(
                "server.ws_port must differ from server.port ({})",
                self.server.port
            )));
        }

        Ok(())
    }

    /// Validate watch configuration.
    fn validate_watch(&self) -> Result<(), ConfigError> {
        if self.watch.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "watch.extensions cannot be empty".to_owned(),
            ));
        }
        if self.watch.extensions.iter().any(String::is_empty) {
            return Err(ConfigError::Validation(
                "watch.extensions cannot contain empty entries".to_owned(),
            ));
        }
        if self.watch.debounce_ms == 0 || self.watch.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Validation(format!(
                "watch.debounce_ms must be between 1 and {MAX_DEBOUNCE_MS}"
            )));
        }
        Ok(())
    }

    /// Check that the directory exists, is a directory and can be listed.
    fn validate_directory(&self) -> Result<(), ConfigError> {
        let directory_error = |reason: String| ConfigError::Directory {
            path: self.directory.clone(),
            reason,
        };

        let metadata = std::fs::metadata(&self.directory)
            .map_err(|_| directory_error("Directory not found".to_owned()))?;
        if !metadata.is_dir() {
            return Err(directory_error("Not a directory".to_owned()));
        }
        std::fs::read_dir(&self.directory)
            .map_err(|e| directory_error(format!("Directory not readable ({e})")))?;

        Ok(())
    }

    /// Look for `lr.toml` in the current directory.
    fn discover_config() -> Option<PathBuf> {
        let candidate = std::env::current_dir().ok()?.join(CONFIG_FILENAME);
        candidate.is_file().then_some(candidate)
    }

    /// Create default config serving the current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config serving the given directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            serve: ServeConfigRaw::default(),
            watch: WatchConfig::default(),
            directory: base.to_path_buf(),
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.normalize_extensions();
        config.config_path = Some(path.to_path_buf());

        Ok(config)
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;

        if let Some(ref directory) = self.serve.directory {
            self.serve.directory = Some(expand::expand_path(directory, "serve.directory")?);
        }

        Ok(())
    }

    /// Resolve the served directory relative to the config file's directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.directory = match self.serve.directory.as_deref() {
            Some(directory) => config_dir.join(directory),
            None => config_dir.to_path_buf(),
        };
    }

    /// Strip leading dots and lowercase watch extensions.
    fn normalize_extensions(&mut self) {
        for ext in &mut self.watch.extensions {
            *ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        }
    }
}
