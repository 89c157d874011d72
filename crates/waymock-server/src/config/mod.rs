//! Server configuration.
//!
//! Options come from an optional YAML file plus CLI/env overrides; the
//! merged result is validated once before startup.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    3100
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_path() -> PathBuf {
    PathBuf::from("mocks")
}

fn default_log() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Port the mock server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address. Use "127.0.0.1" for local-only access.
    #[serde(default = "default_host")]
    pub host: String,
    /// Definitions directory (`routes/` + `collections.*`).
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Collection to select at startup. Falls back to the first loaded
    /// collection when omitted or unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Default response delay in milliseconds, overridable per route and
    /// per variant.
    #[serde(default)]
    pub delay: u64,
    /// Log filter directive (`info`, `waymock_server=debug`, ...).
    #[serde(default = "default_log")]
    pub log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            path: default_path(),
            collection: None,
            delay: 0,
            log: default_log(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.host.parse::<IpAddr>().is_err() {
            anyhow::bail!(
                "Invalid bind host '{}': expected an IP address (use 0.0.0.0 for all interfaces)",
                self.host
            );
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        let host: IpAddr = self.host.parse()?;
        Ok(SocketAddr::new(host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.port, 3100);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.path, PathBuf::from("mocks"));
        assert_eq!(config.delay, 0);
        assert!(config.collection.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = "port: 3200\nhost: 127.0.0.1\npath: fixtures\ncollection: happy-path\ndelay: 150\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 3200);
        assert_eq!(config.collection.as_deref(), Some("happy-path"));
        assert_eq!(config.delay, 150);
        assert_eq!(
            config.listen_addr().unwrap().to_string(),
            "127.0.0.1:3200"
        );
    }

    #[test]
    fn test_invalid_host_is_rejected() {
        let config = Config {
            host: "not-an-ip".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
