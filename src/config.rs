use chrono::FixedOffset;
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_HOST: &str = "https://kubernetes.default.svc.cluster.local";
pub const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Convergence thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceConfig {
    /// Suppressed occurrences that force a re-notification
    pub times: u32,
    /// Seconds after which an ongoing problem is re-notified
    pub interval_secs: i64,
    /// Fingerprints idle for `eviction_multiplier * interval_secs` are dropped (0 = never)
    pub eviction_multiplier: i64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            times: 10,
            interval_secs: 180,
            eviction_multiplier: 10,
        }
    }
}

/// Connection settings for the cluster API
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub token: Option<String>,
    pub token_file: String,
    pub verify_ssl: bool,
    pub watch_timeout: Duration,
}

/// Configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub cluster_name: String,
    pub ding_robot: String,
    pub level: String,
    pub api: ApiConfig,
    pub convergence: ConvergenceConfig,
    pub event_at_all: bool,
    pub node_at_all: bool,
    /// Events older than this are not alerted on (0 = no limit)
    pub event_max_age_secs: i64,
    pub timestamp_offset: FixedOffset,
    pub es_url: Option<String>,
    pub es_index_prefix: String,
    pub audit_log_path: Option<String>,
    pub console_output: bool,
    pub intake_buffer: usize,
    pub sink_timeout: Duration,
    pub rust_log: String,
}

impl MonitorConfig {
    /// Load configuration from environment variables
    ///
    /// `CLUSTER_NAME` and `DING_ROBOT` are required; everything else has a
    /// default matching the in-cluster deployment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
        };

        let cluster_name = required("CLUSTER_NAME")?;
        let ding_robot = required("DING_ROBOT")?;
        validate_url("DING_ROBOT", &ding_robot)?;

        let host = lookup("API_HOST").unwrap_or_else(|| DEFAULT_API_HOST.to_string());
        validate_url("API_HOST", &host)?;

        let es_url = lookup("ES_URL").filter(|v| !v.trim().is_empty());
        if let Some(url) = &es_url {
            validate_url("ES_URL", url)?;
        }

        let offset_hours: i32 = parse_or(&lookup, "TIMESTAMP_OFFSET_HOURS", 8)?;
        let timestamp_offset = FixedOffset::east_opt(offset_hours * 3600).ok_or_else(|| {
            ConfigError::InvalidValue(format!(
                "TIMESTAMP_OFFSET_HOURS out of range: {}",
                offset_hours
            ))
        })?;

        let convergence = ConvergenceConfig {
            times: parse_or(&lookup, "CONVERGENCE_TIMES", 10)?,
            interval_secs: parse_or(&lookup, "CONVERGENCE_INTERVAL_SECS", 180)?,
            eviction_multiplier: parse_or(&lookup, "CONVERGENCE_EVICTION_MULTIPLIER", 10)?,
        };
        if convergence.times == 0 {
            return Err(ConfigError::InvalidValue(
                "CONVERGENCE_TIMES must be at least 1".to_string(),
            ));
        }
        if convergence.interval_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "CONVERGENCE_INTERVAL_SECS must be positive".to_string(),
            ));
        }

        let watch_timeout_secs: u64 = parse_or(&lookup, "WATCH_TIMEOUT_SECS", 60)?;
        if watch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "WATCH_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        let intake_buffer: usize = parse_or(&lookup, "INTAKE_BUFFER", 10_000)?;
        if intake_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "INTAKE_BUFFER must be positive".to_string(),
            ));
        }

        let sink_timeout_secs: u64 = parse_or(&lookup, "SINK_TIMEOUT_SECS", 10)?;
        if sink_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SINK_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        Ok(Self {
            cluster_name,
            ding_robot,
            level: lookup("LEVEL").unwrap_or_else(|| "Warning".to_string()),
            api: ApiConfig {
                host: host.trim_end_matches('/').to_string(),
                token: lookup("API_TOKEN").filter(|v| !v.trim().is_empty()),
                token_file: lookup("API_TOKEN_FILE")
                    .unwrap_or_else(|| DEFAULT_TOKEN_FILE.to_string()),
                verify_ssl: parse_bool_or(&lookup, "VERIFY_SSL", false)?,
                watch_timeout: Duration::from_secs(watch_timeout_secs),
            },
            convergence,
            event_at_all: parse_bool_or(&lookup, "EVENT_AT_ALL", false)?,
            node_at_all: parse_bool_or(&lookup, "NODE_AT_ALL", false)?,
            event_max_age_secs: parse_or(&lookup, "EVENT_MAX_AGE_SECS", 30)?,
            timestamp_offset,
            es_url: es_url.map(|url| url.trim_end_matches('/').to_string()),
            es_index_prefix: lookup("ES_INDEX_PREFIX")
                .unwrap_or_else(|| "kube-events".to_string()),
            audit_log_path: lookup("AUDIT_LOG_PATH").filter(|v| !v.trim().is_empty()),
            console_output: parse_bool_or(&lookup, "CONSOLE_OUTPUT", true)?,
            intake_buffer,
            sink_timeout: Duration::from_secs(sink_timeout_secs),
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{} must start with http:// or https://",
            key
        )));
    }
    Ok(())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", key, raw))),
        None => Ok(default),
    }
}

fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(format!("{}={}", key, raw))),
        },
        None => Ok(default),
    }
}
