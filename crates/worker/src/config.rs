use std::time::Duration;

use meetscribe_common::ids::WorkerId;
use meetscribe_common::types::WorkerMode;

/// Complete worker configuration, loaded once at startup from environment
/// variables. Fails loudly — a worker that can't resolve its configuration
/// refuses to start rather than run with guessed defaults for anything
/// that touches ownership semantics.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub store_url: String,
    pub store_service_key: String,
    pub store_direct_url: Option<String>,

    pub mode: WorkerMode,
    pub worker_id: WorkerId,

    pub polling_interval: Duration,
    pub heartbeat_interval: Duration,
    pub realtime_timeout: Duration,
    pub realtime_retry_interval: Duration,
    pub room_claim_cache_duration: Duration,

    pub enable_polling_fallback: bool,
    pub enable_database_notify: bool,

    pub log_level: String,
    pub port: Option<u16>,
}

impl WorkerConfig {
    /// Load configuration from the environment. Required variables with
    /// no sane default cause a `ConfigError::Missing`; everything else
    /// falls back to the defaults documented alongside each field.
    pub fn load() -> Result<Self, ConfigError> {
        let store_url = require_env("STORE_URL")?;
        let store_service_key = require_env("STORE_SERVICE_KEY")?;
        let store_direct_url = optional_env("STORE_DIRECT_URL");

        let mode = match cli_mode_override() {
            Some(raw) => WorkerMode::parse(&raw)
                .ok_or_else(|| ConfigError::Invalid("--mode".into(), raw.clone()))?,
            None => match optional_env("MODE") {
                Some(raw) => WorkerMode::parse(&raw)
                    .ok_or_else(|| ConfigError::Invalid("MODE".into(), raw.clone()))?,
                None => WorkerMode::Both,
            },
        };

        let worker_id = match optional_env("WORKER_ID") {
            Some(raw) => WorkerId::from_uuid(
                uuid::Uuid::parse_str(&raw)
                    .map_err(|_| ConfigError::Invalid("WORKER_ID".into(), raw.clone()))?,
            ),
            None => WorkerId::new(),
        };

        let polling_interval =
            duration_ms_env("POLLING_INTERVAL_MS", 5_000)?;
        let heartbeat_interval =
            duration_ms_env("HEARTBEAT_INTERVAL_MS", 15_000)?;
        let realtime_timeout =
            duration_ms_env("REALTIME_TIMEOUT_MS", 30_000)?;
        let realtime_retry_interval =
            duration_ms_env("REALTIME_RETRY_INTERVAL_MS", 120_000)?;
        let room_claim_cache_duration =
            duration_ms_env("ROOM_CLAIM_CACHE_DURATION_MS", 30_000)?;

        let enable_polling_fallback = bool_env("ENABLE_POLLING_FALLBACK", true)?;
        let enable_database_notify = bool_env("ENABLE_DATABASE_NOTIFY", true)?;

        let log_level = optional_env("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let port: Option<u16> = match optional_env("PORT") {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| ConfigError::Invalid("PORT".into(), raw.clone()))?,
            ),
            None => None,
        };

        Ok(Self {
            store_url,
            store_service_key,
            store_direct_url,
            mode,
            worker_id,
            polling_interval,
            heartbeat_interval,
            realtime_timeout,
            realtime_retry_interval,
            room_claim_cache_duration,
            enable_polling_fallback,
            enable_database_notify,
            log_level,
            port,
        })
    }
}

/// `--mode=<mode>` on the command line takes precedence over the `MODE`
/// environment variable, matching the teacher's "most specific source wins"
/// convention without pulling in a CLI-parsing dependency the teacher
/// doesn't carry.
fn cli_mode_override() -> Option<String> {
    std::env::args().find_map(|arg| arg.strip_prefix("--mode=").map(str::to_string))
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key.to_string()))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn duration_ms_env(key: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    match optional_env(key) {
        Some(raw) => {
            let ms: u64 = raw
                .parse()
                .map_err(|_| ConfigError::Invalid(key.to_string(), raw.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}

fn bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional_env(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid(key.to_string(), raw.clone())),
        },
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(String),

    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

impl From<ConfigError> for meetscribe_common::WorkerError {
    fn from(e: ConfigError) -> Self {
        meetscribe_common::WorkerError::Config(e.to_string())
    }
}
