use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

const CONFIG_FILE: &str = "config/default.toml";
const ENV_PREFIX: &str = "IPF__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub weather: WeatherConfig,
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Empty allows any origin
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub bundle_path: PathBuf,
    /// Synthetic corpus size for (re)training
    pub training_rows: usize,
    pub seed: u64,
    /// Ignore a saved bundle and train at startup
    pub retrain_on_start: bool,
    /// Fixed seed for rollout perturbations; unset in production
    pub rollout_seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            bundle_path: PathBuf::from("models/ensemble.bin"),
            training_rows: 10_000,
            seed: 42,
            retrain_on_start: false,
            rollout_seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherProvider {
    OpenMeteo,
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub provider: WeatherProvider,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// IANA zone used for "now" and for the upstream query
    pub timezone: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: WeatherProvider::OpenMeteo,
            base_url: "https://api.open-meteo.com/v1".to_string(),
            timeout_secs: 10,
            max_retries: 2,
            timezone: "Asia/Kolkata".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file for served predictions; unset keeps them in memory only
    pub database_path: Option<PathBuf>,
    pub max_connections: u32,
    /// Predictions older than this are deleted at startup; unset keeps everything
    pub retention_days: Option<u32>,
    pub history_limit: usize,
    pub history_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_connections: 5,
            retention_days: None,
            history_limit: 100,
            history_days: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file(CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.model.training_rows < 2 {
            anyhow::bail!("model.training_rows must be at least 2");
        }
        if self.storage.history_limit == 0 {
            anyhow::bail!("storage.history_limit must be positive");
        }
        if self.storage.max_connections == 0 {
            anyhow::bail!("storage.max_connections must be positive");
        }
        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.weather
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid weather.timezone: {}", e))
    }
}
