use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

/// Hub behavior and per-connection liveness checks.
#[derive(Debug, Deserialize, Clone)]
pub struct HubConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    /// Drop `send-message` and `typing` from connections that have not registered yet.
    pub require_registration: bool,
}

impl HubConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            client_timeout_secs: 10,
            require_registration: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub hub: HubConfig,
    pub cors: CorsConfig,
}

fn with_defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let hub = HubConfig::default();

    Config::builder()
        .set_default("environment", environment)?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("hub.heartbeat_interval_secs", hub.heartbeat_interval_secs as i64)?
        .set_default("hub.client_timeout_secs", hub.client_timeout_secs as i64)?
        .set_default("hub.require_registration", hub.require_registration)?
        .set_default("cors.enabled", true)?
        .set_default("cors.allow_any_origin", false)?
        .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
        .set_default("cors.max_age", 3600)
}

fn env_source() -> Environment {
    // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
    env_source_with_prefix("app")
}

fn env_source_with_prefix(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = with_defaults("development")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(env_source())
            .build()?;

        s.try_deserialize()
    }

    /// Built-in defaults plus environment overrides, no config files.
    pub fn new_for_test() -> Result<Self, ConfigError> {
        with_defaults("test")?
            .set_override("server.port", 0)?
            .set_override("server.workers", 1)?
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }
}
