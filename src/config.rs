use crate::error::ConfigError;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Process-wide settings, read once at startup and passed explicitly.
///
/// Every field maps to an upper-case environment variable of the same name
/// (`GEMINI_API_KEY`, `UPLOAD_DIR`, ...). Durations use humantime syntax such as `90s`.
#[derive(Clone, Debug, Deserialize)]
pub struct FittingConfig {
    /// Credential for the remote editor; absent selects the offline path.
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Prefix of `transformedImageUrl`; set it when serving behind a path proxy.
    #[serde(default = "default_public_url_prefix")]
    pub public_url_prefix: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_gemini_api_base")]
    pub gemini_api_base: String,
    #[serde(default = "default_remote_timeout", with = "humantime_serde")]
    pub remote_timeout: Duration,
    /// Age after which uploads and outputs are swept; unset keeps files forever.
    #[serde(default, with = "humantime_serde")]
    pub upload_retention: Option<Duration>,
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// SVG used by the overlay path instead of the built-in silhouette.
    #[serde(default)]
    pub overlay_asset: Option<PathBuf>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_public_url_prefix() -> String {
    "/uploads".to_string()
}

fn default_gemini_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_gemini_api_base() -> String {
    DEFAULT_GEMINI_API_BASE.to_string()
}

fn default_remote_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(600)
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for FittingConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            host: default_host(),
            port: default_port(),
            upload_dir: default_upload_dir(),
            public_url_prefix: default_public_url_prefix(),
            gemini_model: default_gemini_model(),
            gemini_api_base: default_gemini_api_base(),
            remote_timeout: default_remote_timeout(),
            upload_retention: None,
            sweep_interval: default_sweep_interval(),
            overlay_asset: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl FittingConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter(vars)?)
    }

    /// The API key, treating an empty or blank value as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.gemini_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = FittingConfig::from_vars(Vec::new()).unwrap();
        assert_eq!(config.api_key(), None);
        assert_eq!(config.bind_addr(), "0.0.0.0:2000");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.public_url_prefix, "/uploads");
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.remote_timeout, Duration::from_secs(90));
        assert_eq!(config.upload_retention, None);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = FittingConfig::from_vars(vars(&[
            ("GEMINI_API_KEY", "abc"),
            ("PORT", "8080"),
            ("UPLOAD_DIR", "/tmp/fitting"),
            ("PUBLIC_URL_PREFIX", "/proxy/8080/uploads"),
            ("REMOTE_TIMEOUT", "15s"),
            ("UPLOAD_RETENTION", "2h"),
            ("UNRELATED", "ignored"),
        ]))
        .unwrap();
        assert_eq!(config.api_key(), Some("abc"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/fitting"));
        assert_eq!(config.public_url_prefix, "/proxy/8080/uploads");
        assert_eq!(config.remote_timeout, Duration::from_secs(15));
        assert_eq!(config.upload_retention, Some(Duration::from_secs(7200)));
    }

    #[test]
    fn blank_key_counts_as_absent() {
        let config = FittingConfig::from_vars(vars(&[("GEMINI_API_KEY", "  ")])).unwrap();
        assert_eq!(config.api_key(), None);
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(FittingConfig::from_vars(vars(&[("PORT", "not-a-port")])).is_err());
    }
}
