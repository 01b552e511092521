use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";
const MAX_TOKEN_TTL_DAYS: i64 = 3650;

/// Runtime settings, read from `GAMEKEEPER_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    /// Age at which pending results auto-approve and idle sessions void.
    pub auto_resolve_hours: u32,
    /// Seconds between sweeper passes; 0 leaves resolution to reads alone.
    pub sweep_interval_secs: u64,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = var("GAMEKEEPER_JWT_SECRET", DEV_SECRET);
        if jwt_secret == DEV_SECRET {
            warn!("GAMEKEEPER_JWT_SECRET is not set; using the development secret");
        }

        let host = var("GAMEKEEPER_HOST", "0.0.0.0");
        let port: u16 = var("GAMEKEEPER_PORT", "3000")
            .parse()
            .context("GAMEKEEPER_PORT must be a port number")?;
        let addr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        let auto_resolve_hours = var("GAMEKEEPER_AUTO_RESOLVE_HOURS", "24")
            .parse()
            .context("GAMEKEEPER_AUTO_RESOLVE_HOURS must be a whole number of hours")?;
        let sweep_interval_secs = var("GAMEKEEPER_SWEEP_INTERVAL_SECS", "0")
            .parse()
            .context("GAMEKEEPER_SWEEP_INTERVAL_SECS must be a whole number of seconds")?;
        let token_ttl_days: i64 = var("GAMEKEEPER_TOKEN_TTL_DAYS", "30")
            .parse()
            .context("GAMEKEEPER_TOKEN_TTL_DAYS must be a whole number of days")?;
        if !(1..=MAX_TOKEN_TTL_DAYS).contains(&token_ttl_days) {
            bail!("GAMEKEEPER_TOKEN_TTL_DAYS must be between 1 and {MAX_TOKEN_TTL_DAYS}");
        }

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(var("GAMEKEEPER_DB_PATH", "gamekeeper.db")),
            addr,
            auto_resolve_hours,
            sweep_interval_secs,
            token_ttl_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(cfg.db_path, PathBuf::from("gamekeeper.db"));
        assert_eq!(cfg.auto_resolve_hours, 24);
        assert_eq!(cfg.sweep_interval_secs, 0);
        assert_eq!(cfg.token_ttl_days, 30);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("GAMEKEEPER_HOST", "127.0.0.1"),
            ("GAMEKEEPER_PORT", "8080"),
            ("GAMEKEEPER_AUTO_RESOLVE_HOURS", "12"),
            ("GAMEKEEPER_SWEEP_INTERVAL_SECS", "300"),
        ])
        .unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(cfg.auto_resolve_hours, 12);
        assert_eq!(cfg.sweep_interval_secs, 300);
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(config(&[("GAMEKEEPER_PORT", "http")]).is_err());
        assert!(config(&[("GAMEKEEPER_AUTO_RESOLVE_HOURS", "-1")]).is_err());
    }

    #[test]
    fn token_ttl_is_bounded() {
        for days in ["0", "-5", "3651", "9223372036854775807"] {
            assert!(config(&[("GAMEKEEPER_TOKEN_TTL_DAYS", days)]).is_err(), "{days}");
        }
        let cfg = config(&[("GAMEKEEPER_TOKEN_TTL_DAYS", "3650")]).unwrap();
        assert_eq!(cfg.token_ttl_days, 3650);
    }
}
