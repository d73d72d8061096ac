//! Environment-driven configuration.
//!
//! Every knob has a default so the monitor can run with nothing but the
//! store credentials set. Invalid values fall back to the default.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Monitoring engine configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between polling rounds.
    pub loop_interval: Duration,
    /// Per-attempt navigation timeout.
    pub navigation_timeout: Duration,
    /// Consecutive failures before a target is considered offline.
    pub max_fails: u32,
    /// How long an offline target is skipped.
    pub offline_block: Duration,
    /// Maximum polls in flight at once.
    pub max_concurrency: usize,
    /// Pool-level retries for a failed poll task.
    pub retry_limit: u32,
    /// Minimum interval between persisted observations for a static stream.
    pub min_update_interval: Duration,
    /// Relative viewer-count change considered significant.
    pub change_threshold: f64,
    /// Period of the target list refresh timer.
    pub target_refresh_interval: Duration,
    /// Delay before restarting the loop after a fatal round error.
    pub restart_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            loop_interval: Duration::from_millis(40_000),
            navigation_timeout: Duration::from_millis(60_000),
            max_fails: 2,
            offline_block: Duration::from_millis(600_000),
            max_concurrency: 3,
            retry_limit: 2,
            min_update_interval: Duration::from_millis(30_000),
            change_threshold: 0.0,
            target_refresh_interval: Duration::from_millis(60_000),
            restart_delay: Duration::from_millis(40_000),
        }
    }
}

impl MonitorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            loop_interval: env_ms("LOOP_INTERVAL_MS", defaults.loop_interval),
            navigation_timeout: env_ms("TIMEOUT_MS", defaults.navigation_timeout),
            max_fails: env_parse("MAX_FAILS", defaults.max_fails),
            offline_block: env_ms("BLOCK_OFFLINE_MS", defaults.offline_block),
            max_concurrency: env_parse("MAX_CONCURRENCY", defaults.max_concurrency),
            retry_limit: env_parse("RETRY_LIMIT", defaults.retry_limit),
            min_update_interval: env_ms("MIN_UPDATE_INTERVAL_MS", defaults.min_update_interval),
            change_threshold: env_parse("VIEWERS_CHANGE_THRESHOLD", defaults.change_threshold),
            target_refresh_interval: env_ms(
                "TARGET_REFRESH_INTERVAL_MS",
                defaults.target_refresh_interval,
            ),
            restart_delay: env_ms("RESTART_DELAY_MS", defaults.restart_delay),
        }
    }
}

/// History batching configuration.
#[derive(Debug, Clone)]
pub struct BatcherConfig {
    /// Records per store insert.
    pub max_batch_size: usize,
    /// Hard cap on buffered records; oldest excess is discarded.
    pub max_batch_buffer: usize,
    /// Period of the background flush timer.
    pub flush_interval: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 50,
            max_batch_buffer: 200,
            flush_interval: Duration::from_millis(15_000),
        }
    }
}

impl BatcherConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_batch_size: env_parse("MAX_BATCH_SIZE", defaults.max_batch_size),
            max_batch_buffer: env_parse("MAX_BATCH_BUFFER", defaults.max_batch_buffer),
            flush_interval: env_ms("FLUSH_INTERVAL_MS", defaults.flush_interval),
        }
    }
}

/// Remote store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Supabase project base URL.
    pub supabase_url: String,
    /// Supabase API key (anon or service role).
    pub supabase_key: String,
    /// Platform tag written into peak records.
    pub platform: String,
    /// Target list cache TTL.
    pub cache_ttl: Duration,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        let supabase_url = std::env::var("SUPABASE_URL")
            .map_err(|_| Error::config("SUPABASE_URL is not set"))?;
        let supabase_key = std::env::var("SUPABASE_KEY")
            .map_err(|_| Error::config("SUPABASE_KEY is not set"))?;

        Ok(Self {
            supabase_url,
            supabase_key,
            platform: std::env::var("PLATFORM").unwrap_or_else(|_| "youtube".to_string()),
            cache_ttl: env_ms("CACHE_TTL_MS", Duration::from_millis(30_000)),
        })
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: String,
    pub port: u16,
    /// Shared secret for the control endpoints; unset leaves them open.
    pub control_token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
            control_token: None,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: std::env::var("API_BIND_ADDRESS")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.bind_address),
            port: env_parse("PORT", defaults.port),
            control_token: std::env::var("CONTROL_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

/// Full application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub monitor: MonitorConfig,
    pub batcher: BatcherConfig,
    pub store: StoreConfig,
    pub api: ApiConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            monitor: MonitorConfig::from_env(),
            batcher: BatcherConfig::from_env(),
            store: StoreConfig::from_env()?,
            api: ApiConfig::from_env(),
        })
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_ms(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}
