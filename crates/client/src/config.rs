use reqwest::Url;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all client configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub ws_url: Url,
    pub api_base: Url,
    pub reconnect_base: Duration,
    pub max_reconnect_attempts: u32,
    pub research_poll_interval: Duration,
    pub push_to_talk_key: String,
    pub log_level: Level,
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let ws_url_str = std::env::var("ADVISORY_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:8000/ws".to_string());
        let ws_url = Url::parse(&ws_url_str)
            .map_err(|e| ConfigError::InvalidValue("ADVISORY_WS_URL".to_string(), e.to_string()))?;
        if !matches!(ws_url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue(
                "ADVISORY_WS_URL".to_string(),
                format!("scheme must be ws or wss, got '{}'", ws_url.scheme()),
            ));
        }

        let api_base = match std::env::var("ADVISORY_API_URL") {
            Ok(raw) if !raw.trim().is_empty() => Url::parse(&raw).map_err(|e| {
                ConfigError::InvalidValue("ADVISORY_API_URL".to_string(), e.to_string())
            })?,
            _ => origin_of(&ws_url)?,
        };

        let reconnect_base =
            Duration::from_millis(parse_var("ADVISORY_RECONNECT_BASE_MS", 1000u64)?);
        let max_reconnect_attempts = parse_var("ADVISORY_RECONNECT_MAX_ATTEMPTS", 5u32)?;
        let poll_secs = parse_var("ADVISORY_RESEARCH_POLL_SECS", 5u64)?;
        if poll_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "ADVISORY_RESEARCH_POLL_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let push_to_talk_key =
            std::env::var("ADVISORY_PUSH_TO_TALK_KEY").unwrap_or_else(|_| "space".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            ws_url,
            api_base,
            reconnect_base,
            max_reconnect_attempts,
            research_poll_interval: Duration::from_secs(poll_secs),
            push_to_talk_key,
            log_level,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// The HTTP origin serving the WebSocket endpoint (`ws` → `http`, `wss` → `https`).
fn origin_of(ws_url: &Url) -> Result<Url, ConfigError> {
    let scheme = if ws_url.scheme() == "wss" { "https" } else { "http" };
    let host = ws_url.host_str().ok_or_else(|| {
        ConfigError::InvalidValue("ADVISORY_WS_URL".to_string(), "missing host".to_string())
    })?;
    let origin = match ws_url.port() {
        Some(port) => format!("{scheme}://{host}:{port}/"),
        None => format!("{scheme}://{host}/"),
    };
    Url::parse(&origin)
        .map_err(|e| ConfigError::InvalidValue("ADVISORY_WS_URL".to_string(), e.to_string()))
}
