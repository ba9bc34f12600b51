use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::{
    ScoreAggregator, WeightValidator, DEFAULT_MIN_CHUNK_LEN, DEFAULT_QUANTITATIVE_THRESHOLD,
    DEFAULT_WEIGHT_TOLERANCE,
};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let data_dir = env::var("APP_DATA_DIR").unwrap_or_else(|_| "data".to_string());

        let quantitative_threshold =
            parse_var("APP_QUANT_THRESHOLD")?.unwrap_or(DEFAULT_QUANTITATIVE_THRESHOLD);
        if !(0.0..1.0).contains(&quantitative_threshold) {
            return Err(ConfigError::OutOfRange {
                key: "APP_QUANT_THRESHOLD",
                expected: "a ratio in [0, 1)",
            });
        }

        let weight_tolerance =
            parse_var("APP_WEIGHT_TOLERANCE")?.unwrap_or(DEFAULT_WEIGHT_TOLERANCE);
        if !(weight_tolerance > 0.0 && weight_tolerance.is_finite()) {
            return Err(ConfigError::OutOfRange {
                key: "APP_WEIGHT_TOLERANCE",
                expected: "a positive number",
            });
        }

        let worker_threads = parse_var::<usize>("APP_WORKER_THREADS")?;
        if worker_threads == Some(0) {
            return Err(ConfigError::OutOfRange {
                key: "APP_WORKER_THREADS",
                expected: "at least one thread",
            });
        }
        let min_chunk_len = parse_var("APP_MIN_CHUNK_LEN")?.unwrap_or(DEFAULT_MIN_CHUNK_LEN);

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineConfig {
                quantitative_threshold,
                weight_tolerance,
                worker_threads,
                min_chunk_len,
            },
            storage: StorageConfig {
                data_dir: PathBuf::from(data_dir),
            },
        })
    }
}

fn parse_var<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        _ => Ok(None),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Classification and scoring knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub quantitative_threshold: f64,
    pub weight_tolerance: f64,
    pub worker_threads: Option<usize>,
    pub min_chunk_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quantitative_threshold: DEFAULT_QUANTITATIVE_THRESHOLD,
            weight_tolerance: DEFAULT_WEIGHT_TOLERANCE,
            worker_threads: None,
            min_chunk_len: DEFAULT_MIN_CHUNK_LEN,
        }
    }
}

impl EngineConfig {
    pub fn validator(&self) -> WeightValidator {
        WeightValidator::new(self.weight_tolerance)
    }

    pub fn aggregator(&self) -> Result<ScoreAggregator, ConfigError> {
        let aggregator = ScoreAggregator::new().with_min_chunk_len(self.min_chunk_len);
        match self.worker_threads {
            Some(threads) => aggregator
                .with_threads(threads)
                .map_err(|source| ConfigError::WorkerPool { source }),
            None => Ok(aggregator),
        }
    }
}

/// Where file-backed repositories keep their collections.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    OutOfRange { key: &'static str, expected: &'static str },
    WorkerPool { source: rayon::ThreadPoolBuildError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be numeric, got '{value}'")
            }
            ConfigError::OutOfRange { key, expected } => write!(f, "{key} must be {expected}"),
            ConfigError::WorkerPool { source } => {
                write!(f, "unable to start scoring worker pool: {source}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::WorkerPool { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::OutOfRange { .. } => None,
        }
    }
}

/// Serializes every test that reads or mutates process environment variables.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    static GUARD: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD.get_or_init(|| std::sync::Mutex::new(()))
}
