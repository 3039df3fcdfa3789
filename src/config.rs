//! Environment-driven configuration

use crate::error::AssistantError;
use crate::limiter::{DEFAULT_LOCKOUT_MINUTES, DEFAULT_MAX_ATTEMPTS};
use crate::Result;
use chrono::Duration;
use std::str::FromStr;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SESSION_TTL_MINUTES: i64 = 24 * 60;
const DEFAULT_SWEEP_SECS: u64 = 300;

/// Dialogue tuning shared by the server and the terminal chat
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    pub max_attempts: u32,
    pub lockout: Duration,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout: Duration::minutes(DEFAULT_LOCKOUT_MINUTES),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub dialogue: DialogueConfig,
    /// `None` disables the session sweep
    pub session_ttl: Option<Duration>,
    pub sweep_interval: std::time::Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            dialogue: DialogueConfig::default(),
            session_ttl: Some(Duration::minutes(DEFAULT_SESSION_TTL_MINUTES)),
            sweep_interval: std::time::Duration::from_secs(DEFAULT_SWEEP_SECS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup (process env, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT").or_else(|| lookup("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => DEFAULT_PORT,
        };

        let max_attempts: u32 = parse_or(&lookup, "MAX_FIELD_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts == 0 {
            return Err(AssistantError::Config(
                "MAX_FIELD_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let lockout_minutes: i64 = parse_or(&lookup, "LOCKOUT_MINUTES", DEFAULT_LOCKOUT_MINUTES)?;
        if lockout_minutes <= 0 {
            return Err(AssistantError::Config(
                "LOCKOUT_MINUTES must be positive".to_string(),
            ));
        }

        let ttl_minutes: i64 =
            parse_or(&lookup, "SESSION_TTL_MINUTES", DEFAULT_SESSION_TTL_MINUTES)?;
        let sweep_secs: u64 = parse_or(&lookup, "SESSION_SWEEP_SECS", DEFAULT_SWEEP_SECS)?;

        Ok(Self {
            port,
            dialogue: DialogueConfig {
                max_attempts,
                lockout: Duration::minutes(lockout_minutes),
            },
            session_ttl: (ttl_minutes > 0).then(|| Duration::minutes(ttl_minutes)),
            sweep_interval: std::time::Duration::from_secs(sweep_secs.max(1)),
        })
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AssistantError::Config(format!("{} has invalid value '{}'", key, raw)))
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}
