//! Server configuration from the environment

use axum::http::HeaderValue;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::middleware::RateLimitConfig;
use crate::DEFAULT_PORT;
use tap_db::OperationTimeout;

pub const DEFAULT_FRONTEND_URL: &str = "https://t.me";
pub const DEFAULT_DATA_DIR: &str = "./tap_data";
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 15 * 60 * 1000;
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 5000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    Missing(&'static str),

    #[error("Environment variable {0} must not be empty")]
    Empty(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Configuration for the API server
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    /// Allowed cross-origin caller
    pub frontend_url: String,
    /// Shared secret for launch-data verification
    pub bot_token: String,
    /// Token signing secret
    pub jwt_secret: String,
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u32,
    /// Peers whose `X-Forwarded-For` is believed
    pub trusted_proxies: Vec<IpAddr>,
    /// sled directory, or `mem://` for the in-memory store
    pub data_dir: String,
    pub operation_timeout_ms: u64,
    /// Accept launch data with a bad signature (logged on every use)
    pub dev_mode: bool,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("port", &self.port)
            .field("frontend_url", &self.frontend_url)
            .field("bot_token", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .field("rate_limit_window_ms", &self.rate_limit_window_ms)
            .field("rate_limit_max_requests", &self.rate_limit_max_requests)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("data_dir", &self.data_dir)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .field("dev_mode", &self.dev_mode)
            .finish()
    }
}

impl ServerConfig {
    /// Config with defaults for everything but the two secrets
    pub fn new(bot_token: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            frontend_url: DEFAULT_FRONTEND_URL.to_string(),
            bot_token: bot_token.into(),
            jwt_secret: jwt_secret.into(),
            rate_limit_window_ms: DEFAULT_RATE_LIMIT_WINDOW_MS,
            rate_limit_max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
            trusted_proxies: Vec::new(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            dev_mode: false,
        }
    }

    /// Create config from environment variables.
    ///
    /// `BOT_TOKEN` and `JWT_SECRET` are required; everything else has a default.
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = required(&lookup, "BOT_TOKEN")?;
        let jwt_secret = required(&lookup, "JWT_SECRET")?;

        let mut config = Self::new(bot_token, jwt_secret);
        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr;
        }
        config.port = parsed(&lookup, "PORT", DEFAULT_PORT)?;
        if let Some(url) = lookup("FRONTEND_URL").filter(|u| !u.trim().is_empty()) {
            config.frontend_url = url;
        }
        config.rate_limit_window_ms =
            parsed(&lookup, "RATE_LIMIT_WINDOW_MS", DEFAULT_RATE_LIMIT_WINDOW_MS)?;
        config.rate_limit_max_requests =
            parsed(&lookup, "RATE_LIMIT_MAX_REQUESTS", DEFAULT_RATE_LIMIT_MAX_REQUESTS)?;
        if let Some(raw) = lookup("TRUSTED_PROXIES") {
            config.trusted_proxies = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| {
                    p.parse().map_err(|_| ConfigError::Invalid {
                        name: "TRUSTED_PROXIES",
                        value: p.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(dir) = lookup("DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = dir;
        }
        config.operation_timeout_ms =
            parsed(&lookup, "OPERATION_TIMEOUT_MS", DEFAULT_OPERATION_TIMEOUT_MS)?;
        config.dev_mode = lookup("DEV_MODE")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        config.cors_origin()?;
        Ok(config)
    }

    /// Get the full bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn cors_origin(&self) -> Result<HeaderValue, ConfigError> {
        HeaderValue::from_str(self.frontend_url.trim_end_matches('/')).map_err(|_| {
            ConfigError::Invalid {
                name: "FRONTEND_URL",
                value: self.frontend_url.clone(),
            }
        })
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::new(
            self.rate_limit_max_requests,
            Duration::from_millis(self.rate_limit_window_ms),
        )
        .with_trusted_proxies(self.trusted_proxies.iter().copied())
    }

    pub fn operation_timeout(&self) -> OperationTimeout {
        OperationTimeout::from_millis(self.operation_timeout_ms)
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name).ok_or(ConfigError::Missing(name))?;
    if value.trim().is_empty() {
        return Err(ConfigError::Empty(name));
    }
    Ok(value)
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            ServerConfig::from_lookup(lookup(&[("BOT_TOKEN", "bot"), ("JWT_SECRET", "jwt")])).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.frontend_url, "https://t.me");
        assert_eq!(config.rate_limit_window_ms, 900_000);
        assert_eq!(config.rate_limit_max_requests, 100);
        assert_eq!(config.data_dir, "./tap_data");
        assert!(config.trusted_proxies.is_empty());
        assert!(!config.dev_mode);
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "bot"),
            ("JWT_SECRET", "jwt"),
            ("PORT", "8080"),
            ("FRONTEND_URL", "https://game.example.com"),
            ("RATE_LIMIT_MAX_REQUESTS", "10"),
            ("DATA_DIR", "mem://"),
            ("DEV_MODE", "true"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.frontend_url, "https://game.example.com");
        assert_eq!(config.rate_limit_max_requests, 10);
        assert_eq!(config.data_dir, "mem://");
        assert!(config.dev_mode);
    }

    #[test]
    fn test_secrets_required() {
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("JWT_SECRET", "jwt")])),
            Err(ConfigError::Missing("BOT_TOKEN"))
        ));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("BOT_TOKEN", "bot"), ("JWT_SECRET", "  ")])),
            Err(ConfigError::Empty("JWT_SECRET"))
        ));
    }

    #[test]
    fn test_invalid_number() {
        let result = ServerConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "bot"),
            ("JWT_SECRET", "jwt"),
            ("PORT", "eighty"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "PORT", .. })));
    }

    #[test]
    fn test_trusted_proxies() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "bot"),
            ("JWT_SECRET", "jwt"),
            ("TRUSTED_PROXIES", "10.0.0.2, ::1,"),
        ]))
        .unwrap();

        let proxies: Vec<IpAddr> = vec!["10.0.0.2".parse().unwrap(), "::1".parse().unwrap()];
        assert_eq!(config.trusted_proxies, proxies);
        assert!(config.rate_limit().is_trusted_proxy(&proxies[0]));

        let result = ServerConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "bot"),
            ("JWT_SECRET", "jwt"),
            ("TRUSTED_PROXIES", "10.0.0.2,proxy.local"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { name: "TRUSTED_PROXIES", .. })));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", ServerConfig::new("bot-secret", "jwt-secret"));
        assert!(!rendered.contains("bot-secret"));
        assert!(!rendered.contains("jwt-secret"));
    }
}
