use std::env;
use std::str::FromStr;
use tracing::{info, warn};

pub const ENV_PROM_HOST: &str = "FN_EXT_STATS_PROM_HOST";
pub const ENV_PROM_PORT: &str = "FN_EXT_STATS_PROM_PORT";
pub const ENV_LISTEN_PORT: &str = "PORT";

pub const DEFAULT_PROM_HOST: &str = "localhost";
pub const DEFAULT_PROM_PORT: u16 = 9090;
pub const DEFAULT_LISTEN_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsConfig {
    pub prom_host: String,
    pub prom_port: u16,
    pub listen_port: u16,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            prom_host: DEFAULT_PROM_HOST.to_string(),
            prom_port: DEFAULT_PROM_PORT,
            listen_port: DEFAULT_LISTEN_PORT,
        }
    }
}

impl StatsConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prom_host = lookup(ENV_PROM_HOST).unwrap_or_else(|| {
            info!("No value found for {}, falling back to {}", ENV_PROM_HOST, DEFAULT_PROM_HOST);
            DEFAULT_PROM_HOST.to_string()
        });

        Self {
            prom_host,
            prom_port: parse_or_default(&lookup, ENV_PROM_PORT, DEFAULT_PROM_PORT),
            listen_port: parse_or_default(&lookup, ENV_LISTEN_PORT, DEFAULT_LISTEN_PORT),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.listen_port)
    }
}

fn parse_or_default<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid value {:?} for {}, falling back to {}", raw, key, default);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(StatsConfig::from_lookup(lookup(&[])), StatsConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = StatsConfig::from_lookup(lookup(&[
            (ENV_PROM_HOST, "prometheus"),
            (ENV_PROM_PORT, "9091"),
            (ENV_LISTEN_PORT, "8081"),
        ]));

        assert_eq!(config.prom_host, "prometheus");
        assert_eq!(config.prom_port, 9091);
        assert_eq!(config.listen_addr(), "0.0.0.0:8081");
    }

    #[test]
    fn test_bad_port_falls_back() {
        let config = StatsConfig::from_lookup(lookup(&[(ENV_PROM_PORT, "ninety")]));
        assert_eq!(config.prom_port, DEFAULT_PROM_PORT);
    }
}
