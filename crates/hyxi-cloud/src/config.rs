// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of HYXi Cloud.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Poller configuration (TOML file plus `HYXI_*` environment overrides)

use crate::signer::Credentials;
use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "https://open.hyxicloud.com";

/// Bounds of the poll interval in minutes.
pub const UPDATE_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 1..=60;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_update_interval_minutes() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_secs() -> u64 {
    2
}

fn default_token_lifetime_secs() -> u64 {
    7200
}

fn default_token_refresh_margin_secs() -> u64 {
    600
}

fn default_plant_page_size() -> u32 {
    10
}

fn default_device_page_size() -> u32 {
    50
}

fn default_max_concurrent_devices() -> usize {
    8
}

#[derive(Clone, Serialize, Deserialize)]
pub struct HyxiConfig {
    /// Access key issued by the HYXi developer portal
    #[serde(default)]
    pub access_key: String,

    #[serde(default)]
    pub secret_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Poll interval in minutes (1-60)
    #[serde(default = "default_update_interval_minutes")]
    pub update_interval_minutes: u64,

    /// Expose the fleet battery aggregate
    #[serde(default)]
    pub enable_virtual_battery: bool,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before retry `n` is `n * retry_base_delay_secs`
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,

    #[serde(default = "default_token_lifetime_secs")]
    pub token_lifetime_secs: u64,

    #[serde(default = "default_token_refresh_margin_secs")]
    pub token_refresh_margin_secs: u64,

    #[serde(default = "default_plant_page_size")]
    pub plant_page_size: u32,

    #[serde(default = "default_device_page_size")]
    pub device_page_size: u32,

    #[serde(default = "default_max_concurrent_devices")]
    pub max_concurrent_devices: usize,

    /// Serve a JSON snapshot from disk instead of calling the cloud
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture_path: Option<PathBuf>,
}

impl Default for HyxiConfig {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            base_url: default_base_url(),
            update_interval_minutes: default_update_interval_minutes(),
            enable_virtual_battery: false,
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            token_lifetime_secs: default_token_lifetime_secs(),
            token_refresh_margin_secs: default_token_refresh_margin_secs(),
            plant_page_size: default_plant_page_size(),
            device_page_size: default_device_page_size(),
            max_concurrent_devices: default_max_concurrent_devices(),
            fixture_path: None,
        }
    }
}

impl fmt::Debug for HyxiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyxiConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("update_interval_minutes", &self.update_interval_minutes)
            .field("enable_virtual_battery", &self.enable_virtual_battery)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_secs", &self.retry_base_delay_secs)
            .field("fixture_path", &self.fixture_path)
            .finish_non_exhaustive()
    }
}

impl HyxiConfig {
    /// Load a TOML file, apply environment overrides and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML: {}", path.display()))?;
        config.apply_env();
        config.normalize();
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `HYXI_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("HYXI_ACCESS_KEY") {
            self.access_key = key;
        }
        if let Some(secret) = lookup("HYXI_SECRET_KEY") {
            self.secret_key = secret;
        }
        if let Some(url) = lookup("HYXI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(interval) = lookup("HYXI_UPDATE_INTERVAL_MINUTES")
            && let Ok(minutes) = interval.trim().parse::<u64>()
        {
            self.update_interval_minutes = minutes;
        }
    }

    fn normalize(&mut self) {
        self.access_key = self.access_key.trim().to_owned();
        self.secret_key = self.secret_key.trim().to_owned();
        self.base_url = self.base_url.trim().trim_end_matches('/').to_owned();
    }

    pub fn validate(&self) -> Result<()> {
        if self.fixture_path.is_none() {
            if self.access_key.is_empty() {
                bail!("access_key must be set (or HYXI_ACCESS_KEY)");
            }
            if self.secret_key.is_empty() {
                bail!("secret_key must be set (or HYXI_SECRET_KEY)");
            }
        }
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            bail!("base_url must be an http(s) URL, got '{}'", self.base_url);
        }
        if !UPDATE_INTERVAL_RANGE.contains(&self.update_interval_minutes) {
            bail!(
                "update_interval_minutes must be between {} and {}, got {}",
                UPDATE_INTERVAL_RANGE.start(),
                UPDATE_INTERVAL_RANGE.end(),
                self.update_interval_minutes
            );
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.token_lifetime_secs <= self.token_refresh_margin_secs {
            bail!("token_lifetime_secs must be greater than token_refresh_margin_secs");
        }
        if self.plant_page_size == 0 || self.device_page_size == 0 {
            bail!("plant_page_size and device_page_size must be at least 1");
        }
        if self.max_concurrent_devices == 0 {
            bail!("max_concurrent_devices must be at least 1");
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.access_key.clone(), self.secret_key.clone())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    /// How long a fresh token is trusted locally (lifetime minus margin).
    pub fn token_validity(&self) -> TimeDelta {
        let secs = self
            .token_lifetime_secs
            .saturating_sub(self.token_refresh_margin_secs);
        i64::try_from(secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn valid() -> HyxiConfig {
        HyxiConfig {
            access_key: "ak".to_owned(),
            secret_key: "sk".to_owned(),
            ..HyxiConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = HyxiConfig::default();
        assert_eq!(config.base_url, "https://open.hyxicloud.com");
        assert_eq!(config.update_interval_minutes, 5);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_base_delay(), Duration::from_secs(2));
        assert_eq!(config.token_validity(), TimeDelta::seconds(6600));
        assert!(!config.enable_virtual_battery);
    }

    #[test]
    fn test_from_file_minimal() {
        let file = write_config(
            r#"
access_key = "ak-file"
secret_key = "sk-file"
base_url = "https://example.test/"
enable_virtual_battery = true
"#,
        );

        let config = HyxiConfig::from_file(file.path()).unwrap();
        assert_eq!(config.access_key, "ak-file");
        assert_eq!(config.base_url, "https://example.test");
        assert!(config.enable_virtual_battery);
        assert_eq!(config.update_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let file = write_config("access_key = [");
        let err = HyxiConfig::from_file(file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse config TOML"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(HyxiConfig::from_file("/nonexistent/hyxi.toml").is_err());
    }

    #[test]
    fn test_validate_interval_bounds() {
        let mut config = valid();
        config.update_interval_minutes = 0;
        assert!(config.validate().is_err());

        config.update_interval_minutes = 61;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("update_interval_minutes"));

        config.update_interval_minutes = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = valid();
        config.secret_key.clear();
        assert!(config.validate().unwrap_err().to_string().contains("secret_key"));

        config.fixture_path = Some(PathBuf::from("snapshot.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_token_margin() {
        let mut config = valid();
        config.token_refresh_margin_secs = 7200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("HYXI_ACCESS_KEY", "ak-env"),
            ("HYXI_SECRET_KEY", "sk-env"),
            ("HYXI_UPDATE_INTERVAL_MINUTES", "15"),
        ]);

        let mut config = HyxiConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| (*v).to_owned()));

        assert_eq!(config.access_key, "ak-env");
        assert_eq!(config.secret_key, "sk-env");
        assert_eq!(config.update_interval_minutes, 15);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_interval_env_is_ignored() {
        let mut config = HyxiConfig::default();
        config.apply_overrides(|name| {
            (name == "HYXI_UPDATE_INTERVAL_MINUTES").then(|| "often".to_owned())
        });
        assert_eq!(config.update_interval_minutes, 5);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", valid());
        assert!(!debug.contains("\"sk\""));
        assert!(debug.contains("<redacted>"));
    }
}
