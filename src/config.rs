//! Layered runtime settings.
//!
//! Precedence, lowest first: built-in defaults, an optional config file,
//! `TIGOWATCH_*` environment variables, then command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;

/// Environment variable prefix, e.g. `TIGOWATCH_BIND_PORT=9100`.
pub const ENV_PREFIX: &str = "TIGOWATCH";

pub const DEFAULT_DATA_DIR: &str = "/mnt/ffs/data/daqs";
pub const DEFAULT_BIND_IP: &str = "0.0.0.0";
pub const DEFAULT_BIND_PORT: u16 = 9980;
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub bind_ip: String,
    pub bind_port: u16,
    pub metrics_path: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub verbose: bool,
    /// Duration string such as `10s`.
    pub poll_interval: String,
    /// Duration string such as `10m`.
    pub stale_after: String,
    pub max_fail_count: u64,
}

/// Values supplied on the command line. `None` leaves lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub data_dir: Option<PathBuf>,
    pub bind_ip: Option<String>,
    pub bind_port: Option<u16>,
    pub verbose: Option<bool>,
    pub poll_interval: Option<String>,
    pub stale_after: Option<String>,
}

impl Settings {
    /// Resolve settings from every layer.
    pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("data_dir", DEFAULT_DATA_DIR)?
            .set_default("bind_ip", DEFAULT_BIND_IP)?
            .set_default("bind_port", i64::from(DEFAULT_BIND_PORT))?
            .set_default("metrics_path", DEFAULT_METRICS_PATH)?
            .set_default("verbose", false)?
            .set_default("poll_interval", "10s")?
            .set_default("stale_after", "10m")?
            .set_default("max_fail_count", 35_i64)?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path));
        }

        builder = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .set_override_option(
                "data_dir",
                overrides
                    .data_dir
                    .as_ref()
                    .map(|dir| dir.to_string_lossy().into_owned()),
            )?
            .set_override_option("bind_ip", overrides.bind_ip.clone())?
            .set_override_option("bind_port", overrides.bind_port.map(i64::from))?
            .set_override_option("verbose", overrides.verbose)?
            .set_override_option("poll_interval", overrides.poll_interval.clone())?
            .set_override_option("stale_after", overrides.stale_after.clone())?;

        let settings: Settings = builder
            .build()
            .context("Failed to load settings")?
            .try_deserialize()
            .context("Invalid settings")?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check the values that only fail once they are used.
    pub fn validate(&self) -> Result<()> {
        self.poll_interval()?;
        self.stale_after()?;
        if !self.metrics_path.starts_with('/') {
            anyhow::bail!("metrics_path must start with '/': {}", self.metrics_path);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Result<Duration> {
        let interval = parse_duration(&self.poll_interval)
            .with_context(|| format!("Invalid poll_interval '{}'", self.poll_interval))?;
        if interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than zero");
        }
        Ok(interval)
    }

    pub fn stale_after(&self) -> Result<Duration> {
        parse_duration(&self.stale_after)
            .with_context(|| format!("Invalid stale_after '{}'", self.stale_after))
    }

    /// `ip:port` for the exporter to listen on.
    pub fn listen_addr(&self) -> String {
        if self.bind_ip.contains(':') {
            format!("[{}]:{}", self.bind_ip, self.bind_port)
        } else {
            format!("{}:{}", self.bind_ip, self.bind_port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn defaults_without_any_source() {
        let settings = Settings::load(None, &Overrides::default()).unwrap();

        assert_eq!(settings.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(settings.bind_ip, "0.0.0.0");
        assert_eq!(settings.bind_port, 9980);
        assert_eq!(settings.metrics_path, "/metrics");
        assert_eq!(settings.namespace, None);
        assert!(!settings.verbose);
        assert_eq!(settings.poll_interval().unwrap(), Duration::from_secs(10));
        assert_eq!(settings.stale_after().unwrap(), Duration::from_secs(600));
        assert_eq!(settings.max_fail_count, 35);
        assert_eq!(settings.listen_addr(), "0.0.0.0:9980");
    }

    #[test]
    fn file_overrides_defaults_and_cli_overrides_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
data_dir = "/srv/daqs"
bind_port = 9100
namespace = "site1"
stale_after = "5m"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let overrides = Overrides {
            bind_port: Some(9200),
            verbose: Some(true),
            ..Default::default()
        };
        let settings = Settings::load(Some(file.path()), &overrides).unwrap();

        assert_eq!(settings.data_dir, PathBuf::from("/srv/daqs"));
        assert_eq!(settings.bind_port, 9200);
        assert_eq!(settings.namespace.as_deref(), Some("site1"));
        assert_eq!(settings.stale_after().unwrap(), Duration::from_secs(300));
        assert!(settings.verbose);
    }

    #[test]
    fn invalid_duration_fails_to_load() {
        let overrides = Overrides {
            poll_interval: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(Settings::load(None, &overrides).is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let overrides = Overrides {
            poll_interval: Some("0s".to_string()),
            ..Default::default()
        };
        assert!(Settings::load(None, &overrides).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(Settings::load(Some(&missing), &Overrides::default()).is_err());
    }

    #[test]
    fn ipv6_listen_addr_is_bracketed() {
        let overrides = Overrides {
            bind_ip: Some("::1".to_string()),
            ..Default::default()
        };
        let settings = Settings::load(None, &overrides).unwrap();
        assert_eq!(settings.listen_addr(), "[::1]:9980");
    }
}
