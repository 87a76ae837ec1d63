use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

/// Tuning for the hub's delivery pass.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HubConfig {
    /// Upper bound for a single per-recipient write. `0` leaves writes unbounded.
    pub write_timeout_ms: u64,
}

impl HubConfig {
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PageConfig {
    pub template: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub hub: HubConfig,
    pub page: PageConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        Self::builder_with_defaults()?
            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only; no files and no environment.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder_with_defaults()?.build()?.try_deserialize()
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", "development")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("hub.write_timeout_ms", 0)?
            .set_default("page.template", "templates/index.html")
    }

    /// Applies a `host:port` listen address given on the command line.
    /// An empty host (`:9000`) binds every interface.
    pub fn override_addr(&mut self, addr: &str) -> Result<(), AppError> {
        let (host, port) = addr.rsplit_once(':').ok_or_else(|| {
            AppError::ValidationError(format!("listen address `{}` is not host:port", addr))
        })?;
        let port = port.parse::<u16>().map_err(|e| {
            AppError::ValidationError(format!("listen address `{}` has a bad port: {}", addr, e))
        })?;

        self.server.host = if host.is_empty() { "0.0.0.0".to_string() } else { host.to_string() };
        self.server.port = port;
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
