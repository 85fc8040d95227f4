//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honoured for local runs.

use crate::models::Activity;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// Activity used for the initial session
    pub default_activity: Activity,
    /// How long `GET /api/devices/{metric}` scans before answering
    pub scan_window: Duration,
    /// Per-subscriber buffer of the live sample feed
    pub sample_channel_capacity: usize,
    /// Tick interval of the simulated sensor feed
    pub simulated_feed_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            frontend_url: "http://localhost:5173".to_string(),
            default_activity: Activity::IndoorRide,
            scan_window: Duration::from_millis(2000),
            sample_channel_capacity: 256,
            simulated_feed_interval: Duration::from_millis(1000),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = Self::default();
        Ok(Self {
            port: parse_var("PORT")?.unwrap_or(defaults.port),
            frontend_url: env::var("FRONTEND_URL").unwrap_or(defaults.frontend_url),
            default_activity: parse_var("DEFAULT_ACTIVITY")?
                .unwrap_or(defaults.default_activity),
            scan_window: parse_var("SCAN_WINDOW_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.scan_window),
            sample_channel_capacity: match parse_var::<usize>("SAMPLE_CHANNEL_CAPACITY")? {
                Some(0) => {
                    return Err(ConfigError::Invalid(
                        "SAMPLE_CHANNEL_CAPACITY",
                        "must be greater than zero".to_string(),
                    ))
                }
                Some(capacity) => capacity,
                None => defaults.sample_channel_capacity,
            },
            simulated_feed_interval: match parse_var::<u64>("SIMULATED_FEED_INTERVAL_MS")? {
                Some(0) => {
                    return Err(ConfigError::Invalid(
                        "SIMULATED_FEED_INTERVAL_MS",
                        "must be greater than zero".to_string(),
                    ))
                }
                Some(ms) => Duration::from_millis(ms),
                None => defaults.simulated_feed_interval,
            },
        })
    }

    /// Config for tests: short scan window, fast feed.
    pub fn test_default() -> Self {
        Self {
            scan_window: Duration::from_millis(50),
            simulated_feed_interval: Duration::from_millis(10),
            ..Self::default()
        }
    }
}

/// Parse an optional variable; unset means `None`, unparseable is an error.
fn parse_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid(name, e.to_string())),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
