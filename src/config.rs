//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILJOT_CONFIG` (environment variable)
//! 2. `~/.config/mailjot/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailjot\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! `JOPLIN_*` environment variables are applied on top (see [`Config::apply_env`]).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Joplin Data API connection.
    pub joplin: JoplinConfig,
    /// Import limits.
    pub import: ImportConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Joplin Data API connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoplinConfig {
    /// Scheme and host of the clipper service.
    pub url: String,
    /// Clipper service port.
    pub port: u16,
    /// API token (Web Clipper options in Joplin).
    pub token: String,
    /// Parent notebook, by id or title. Empty means Joplin's default notebook.
    pub folder: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Import limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Maximum message size in bytes (default: 268435456 = 256 MB).
    pub max_message_size: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for JoplinConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost".to_string(),
            port: 41184,
            token: String::new(),
            folder: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_message_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

impl JoplinConfig {
    /// `url:port`, unless `url` already names a port.
    pub fn base_url(&self) -> String {
        let url = self.url.trim().trim_end_matches('/');
        let host_part = url.split_once("://").map_or(url, |(_, rest)| rest);
        if host_part.contains(':') {
            url.to_string()
        } else {
            format!("{url}:{}", self.port)
        }
    }

    /// Configured folder, if any.
    pub fn folder(&self) -> Option<&str> {
        Some(self.folder.trim()).filter(|f| !f.is_empty())
    }
}

impl Config {
    /// Apply `JOPLIN_TOKEN`, `JOPLIN_PORT`, `JOPLIN_URL` and `JOPLIN_FOLDER`.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any variable source (the process environment in
    /// production, a map in tests). Empty values are ignored.
    pub fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get("JOPLIN_TOKEN") {
            self.joplin.token = token;
        }
        if let Some(port) = get("JOPLIN_PORT") {
            match port.trim().parse() {
                Ok(port) => self.joplin.port = port,
                Err(e) => tracing::warn!(value = %port, error = %e, "Ignoring invalid JOPLIN_PORT"),
            }
        }
        if let Some(url) = get("JOPLIN_URL") {
            self.joplin.url = url;
        }
        if let Some(folder) = get("JOPLIN_FOLDER") {
            self.joplin.folder = folder;
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILJOT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailjot").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailjot")
}
