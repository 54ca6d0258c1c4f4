use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub booking: BookingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Catalog rows loaded by the memory backend
    #[serde(default)]
    pub trains: Vec<TrainSeed>,
    #[serde(default)]
    pub schedules: Vec<ScheduleSeed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainSeed {
    pub id: i64,
    pub name: String,
    pub capacity: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleSeed {
    pub id: i64,
    pub train_id: i64,
    pub origin: String,
    pub destination: String,
    /// Per-seat price in minor units
    pub price: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Requests allowed per client per window
    #[serde(default = "default_rate_limit")]
    pub rate_limit: i64,
    #[serde(default = "default_rate_window")]
    pub rate_window_seconds: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    #[serde(default = "default_hold_seconds")]
    pub hold_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
    #[serde(default = "default_code_attempts")]
    pub code_attempts: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            hold_seconds: default_hold_seconds(),
            sweep_interval_seconds: default_sweep_interval(),
            sweep_batch: default_sweep_batch(),
            max_page_size: default_max_page_size(),
            code_attempts: default_code_attempts(),
        }
    }
}

impl BookingConfig {
    pub fn hold_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.hold_seconds).unwrap_or(i64::MAX / 1000))
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_max_connections() -> u32 { 5 }
fn default_rate_limit() -> i64 { 120 }
fn default_rate_window() -> i64 { 60 }
fn default_hold_seconds() -> u64 { 600 }
fn default_sweep_interval() -> u64 { 30 }
fn default_sweep_batch() -> u32 { 100 }
fn default_max_page_size() -> u32 { 100 }
fn default_code_attempts() -> u32 { 8 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        Self::load_from("config", &run_mode)
    }

    /// Layer `default`, then `{run_mode}`, then `local` from `dir`, then the environment.
    pub fn load_from(dir: &str, run_mode: &str) -> Result<Self, config::ConfigError> {
        let s = config::Config::builder()
            .add_source(config::File::with_name(&format!("{}/default", dir)))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("{}/{}", dir, run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name(&format!("{}/local", dir)).required(false))
            // e.g. `RAIL__BOOKING__HOLD_SECONDS=300`
            .add_source(config::Environment::with_prefix("RAIL").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let booking = &self.booking;
        if booking.hold_seconds == 0 {
            return Err(config::ConfigError::Message(
                "booking.hold_seconds must be positive".into(),
            ));
        }
        if booking.sweep_interval_seconds == 0 || booking.sweep_interval_seconds >= booking.hold_seconds {
            return Err(config::ConfigError::Message(format!(
                "booking.sweep_interval_seconds ({}) must be between 1 and hold_seconds ({})",
                booking.sweep_interval_seconds, booking.hold_seconds
            )));
        }
        if booking.max_page_size == 0 || booking.code_attempts == 0 || booking.sweep_batch == 0 {
            return Err(config::ConfigError::Message(
                "booking.max_page_size, code_attempts and sweep_batch must be positive".into(),
            ));
        }
        Ok(())
    }
}
