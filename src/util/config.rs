use std::env;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable '{0}'")]
    Missing(&'static str),

    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Typed snapshot of the process environment, taken once at startup and
/// injected through `AppState` from there.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub session_secret: String,
    pub login_exchange_url: String,
    pub cors_allow_origins: String,
    /// Fixed offset (minutes east of UTC) that defines where the
    /// once-per-day activity boundary falls. Defaults to KST.
    pub activity_day_offset_minutes: i32,
}

impl Config {
    pub fn load() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server_port: optional("SERVER_PORT", 3000)?,
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            session_secret: required("SESSION_SECRET")?,
            login_exchange_url: required("LOGIN_EXCHANGE_URL")?,
            cors_allow_origins: env::var("CORS_ALLOW_ORIGINS").unwrap_or_else(|_| "*".into()),
            activity_day_offset_minutes: optional("ACTIVITY_DAY_OFFSET_MINUTES", 540)?,
        })
    }
}

fn required(key: &'static str) -> ConfigResult<String> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn optional<T>(key: &'static str, default: T) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_missing_required_var() {
        let err = required("MODI_GARDEN_DOES_NOT_EXIST").unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_optional_falls_back() {
        let port: u16 = optional("MODI_GARDEN_DOES_NOT_EXIST", 3000).unwrap();
        assert_eq!(port, 3000);
    }
}
