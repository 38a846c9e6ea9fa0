//! Configuration management for the virtual filesystem runtime.
//!
//! Parses `vfr.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`], and take
//! precedence over both the config file and environment variables.
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `server.bundle_origin`
//!
//! ## Direct Environment Overrides
//!
//! Two fields can also be overridden wholesale by environment variables,
//! independent of `${}` expansion inside the TOML file, mirroring the way
//! `vfr-cli`'s flags carry a `clap` `env` fallback:
//!
//! - `VFR_BUNDLE_ORIGIN` overrides `server.bundle_origin`
//! - `VFR_DEV_PROXY` overrides `server.dev_proxy` (`"true"`/`"false"`)

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI settings that override configuration file and environment values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override the relay origin the engine connects to.
    pub bundle_origin: Option<String>,
    /// Override dev-proxy mode.
    pub dev_proxy: Option<bool>,
    /// Override the persistent cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override the persistent cache directory.
    pub cache_dir: Option<PathBuf>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "vfr.toml";

const ENV_BUNDLE_ORIGIN: &str = "VFR_BUNDLE_ORIGIN";
const ENV_DEV_PROXY: &str = "VFR_DEV_PROXY";

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Persistent cache configuration (paths are relative strings from TOML).
    #[serde(default)]
    cache: CacheConfigRaw,

    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    #[allow(clippy::derivable_impls)]
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Origin the engine relay connects to, e.g. `https://relay.example.com`.
    /// Left unset, the runtime only auto-boots from the persistent cache.
    pub bundle_origin: Option<String>,
    /// When true, unresolved fetch requests are forwarded to `bundle_origin`
    /// instead of returning a 404 (used for local development against a
    /// live bundle server).
    pub dev_proxy: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 7979,
            bundle_origin: None,
            dev_proxy: false,
        }
    }
}

/// Raw cache configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CacheConfigRaw {
    dir: Option<String>,
    enabled: Option<bool>,
}

/// Resolved persistent cache configuration with an absolute path.
#[derive(Debug)]
pub struct CacheConfig {
    /// Directory the `FileCache` is rooted at.
    pub dir: PathBuf,
    /// Whether the persistent cache is used at all.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".vfr/cache"),
            enabled: true,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
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
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`server.bundle_origin`").
        field: String,
        /// Error message (e.g., "${`VFR_RELAY`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise,
    /// searches for `vfr.toml` in current directory and parents.
    ///
    /// Precedence, highest first: `cli_settings`, then the two direct
    /// `VFR_*` environment overrides, then the config file, then defaults.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
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

        config.apply_env_overrides();

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Apply the direct `VFR_BUNDLE_ORIGIN` / `VFR_DEV_PROXY` overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(origin) = std::env::var(ENV_BUNDLE_ORIGIN) {
            self.server.bundle_origin = Some(origin);
        }
        if let Ok(raw) = std::env::var(ENV_DEV_PROXY) {
            match raw.parse::<bool>() {
                Ok(value) => self.server.dev_proxy = value,
                Err(_) => tracing::warn!(
                    value = %raw,
                    "VFR_DEV_PROXY must be \"true\" or \"false\", ignoring"
                ),
            }
        }
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(bundle_origin) = &settings.bundle_origin {
            self.server.bundle_origin = Some(bundle_origin.clone());
        }
        if let Some(dev_proxy) = settings.dev_proxy {
            self.server.dev_proxy = dev_proxy;
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            self.cache_resolved.enabled = cache_enabled;
        }
        if let Some(cache_dir) = &settings.cache_dir {
            self.cache_resolved.dir.clone_from(cache_dir);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            cache: CacheConfigRaw::default(),
            cache_resolved: CacheConfig {
                dir: base.join(".vfr/cache"),
                enabled: true,
            },
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
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }
        if let Some(origin) = &self.server.bundle_origin {
            require_non_empty(origin, "server.bundle_origin")?;
            require_http_url(origin, "server.bundle_origin")?;
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        if let Some(origin) = &self.server.bundle_origin {
            self.server.bundle_origin = Some(expand::expand_env(origin, "server.bundle_origin")?);
        }
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.cache_resolved = CacheConfig {
            dir: config_dir.join(self.cache.dir.as_deref().unwrap_or(".vfr/cache")),
            enabled: self.cache.enabled.unwrap_or(true),
        };
    }
}
