use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

use crate::domain::ShipPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub ship_policy: ShipPolicy,
    pub db_max_connections: u32,
    pub base_path: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let host = parse_or(&lookup, "HOST", IpAddr::V4(Ipv4Addr::LOCALHOST))?;
        let port = parse_or(&lookup, "PORT", 3000u16)?;
        let token_ttl_hours = parse_or(&lookup, "TOKEN_TTL_HOURS", 8i64)?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10u32)?;
        let full_scan = parse_or(&lookup, "SHIP_REQUIRES_FULL_SCAN", false)?;

        let mut base_path = lookup("BASE_PATH").unwrap_or_else(|| "/api".to_string());
        if !base_path.starts_with('/') {
            base_path.insert(0, '/');
        }
        let base_path = base_path.trim_end_matches('/').to_string();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host,
            port,
            jwt_secret: required("JWT_SECRET")?,
            token_ttl_hours,
            ship_policy: ShipPolicy::from_full_scan_flag(full_scan),
            db_max_connections,
            base_path,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply() {
        let cfg = config(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "s")]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.token_ttl_hours, 8);
        assert_eq!(cfg.ship_policy, ShipPolicy::AnyProgress);
        assert_eq!(cfg.base_path, "/api");
    }

    #[test]
    fn missing_secret_is_reported() {
        let err = config(&[("DATABASE_URL", "postgres://x")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn full_scan_flag_and_base_path() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("SHIP_REQUIRES_FULL_SCAN", "true"),
            ("BASE_PATH", "backoffice/"),
        ])
        .unwrap();
        assert_eq!(cfg.ship_policy, ShipPolicy::FullScanRequired);
        assert_eq!(cfg.base_path, "/backoffice");
    }

    #[test]
    fn bad_port_is_invalid() {
        let err = config(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("PORT", "eighty"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }
}
