//! `vfr serve` command implementation.

use std::path::PathBuf;

use clap::Args;
use vfr_config::{CliSettings, Config};
use vfr_server::run_server;

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the serve command.
#[derive(Args)]
pub(crate) struct ServeArgs {
    /// Path to configuration file (default: auto-discover vfr.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Relay origin the engine connects to (overrides config).
    #[arg(long, env = "VFR_BUNDLE_ORIGIN")]
    bundle_origin: Option<String>,

    /// Forward unresolved requests to `bundle_origin` instead of 404ing.
    #[arg(long, env = "VFR_DEV_PROXY")]
    dev_proxy: Option<bool>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable the persistent cache (default: enabled).
    #[arg(long)]
    cache: Option<bool>,

    /// Disable the persistent cache.
    #[arg(long, conflicts_with = "cache")]
    no_cache: bool,

    /// Persistent cache directory (overrides config).
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cache_enabled = self.resolve_cache_enabled();
        let cli_settings = CliSettings {
            host: self.host,
            port: self.port,
            bundle_origin: self.bundle_origin,
            dev_proxy: self.dev_proxy,
            cache_enabled,
            cache_dir: self.cache_dir,
        };

        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        config.validate()?;

        output.success(&format!(
            "Starting server on {}:{}",
            config.server.host, config.server.port
        ));
        if config.cache_resolved.enabled {
            output.info(&format!(
                "Cache directory: {}",
                config.cache_resolved.dir.display()
            ));
        } else {
            output.warning("Cache: disabled");
        }
        match &config.server.bundle_origin {
            Some(origin) => output.info(&format!("Bundle origin: {origin}")),
            None => output.info("Bundle origin: none (auto-boot from cache only)"),
        }
        if config.server.dev_proxy {
            output.info("Dev proxy: enabled");
        }

        run_server(config)
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }

    /// Resolve `cache_enabled` from --cache/--no-cache flags.
    fn resolve_cache_enabled(&self) -> Option<bool> {
        self.no_cache.then_some(false).or(self.cache)
    }
}
