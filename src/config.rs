//! Configuration types for the archive client and download pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Client and pipeline configuration.
///
/// Every field has a sensible default aimed at the public archive, so
/// `Config::default()` works out of the box. Deserialization accepts partial
/// documents; omitted fields fall back to the same defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the archive's REST API (default: the public archive API)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL of the archive website, used for neuron pages and
    /// morphology files (default: the public archive site)
    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,

    /// Per-request timeout (default: 30s)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Records requested per result page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Maximum concurrent result-page requests during aggregation (default: 10)
    #[serde(default = "default_search_concurrency")]
    pub search_concurrency: usize,

    /// Maximum concurrent morphology downloads (default: 20)
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,

    /// Retry behavior for page fetches and downloads
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            site_base_url: default_site_base_url(),
            request_timeout: default_request_timeout(),
            page_size: default_page_size(),
            search_concurrency: default_search_concurrency(),
            download_concurrency: default_download_concurrency(),
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Checks that every value is inside its accepted range.
    ///
    /// The concurrency caps keep bulk transfers polite toward the shared
    /// public archive.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_base_url).map_err(|e| Error::Config {
            key: "api_base_url",
            message: e.to_string(),
        })?;
        url::Url::parse(&self.site_base_url).map_err(|e| Error::Config {
            key: "site_base_url",
            message: e.to_string(),
        })?;

        if self.request_timeout.is_zero() {
            return Err(Error::Config {
                key: "request_timeout",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.page_size == 0 || self.page_size > 500 {
            return Err(Error::Config {
                key: "page_size",
                message: format!("must be between 1 and 500, got {}", self.page_size),
            });
        }
        if self.search_concurrency == 0 || self.search_concurrency > 10 {
            return Err(Error::Config {
                key: "search_concurrency",
                message: format!("must be between 1 and 10, got {}", self.search_concurrency),
            });
        }
        if self.download_concurrency == 0 || self.download_concurrency > 50 {
            return Err(Error::Config {
                key: "download_concurrency",
                message: format!(
                    "must be between 1 and 50, got {}",
                    self.download_concurrency
                ),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                key: "retry.backoff_multiplier",
                message: format!("must be at least 1.0, got {}", self.retry.backoff_multiplier),
            });
        }
        Ok(())
    }
}

/// Retry configuration with exponential backoff
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries (default: 1s)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60s)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Backoff multiplier (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Serde support for Duration as seconds
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Default value functions

fn default_api_base_url() -> String {
    "https://neuromorpho.org/api".to_string()
}

fn default_site_base_url() -> String {
    "https://neuromorpho.org".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_page_size() -> u32 {
    100
}

fn default_search_concurrency() -> usize {
    10
}

fn default_download_concurrency() -> usize {
    20
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok(), "defaults must pass validation");
        assert_eq!(config.api_base_url, "https://neuromorpho.org/api");
        assert_eq!(config.site_base_url, "https://neuromorpho.org");
        assert_eq!(config.page_size, 100);
        assert_eq!(config.search_concurrency, 10);
        assert_eq!(config.download_concurrency, 20);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let from_empty: Config = serde_json::from_str("{}").unwrap();
        let defaults = Config::default();
        assert_eq!(from_empty.api_base_url, defaults.api_base_url);
        assert_eq!(from_empty.request_timeout, defaults.request_timeout);
        assert_eq!(from_empty.page_size, defaults.page_size);
        assert_eq!(from_empty.retry.max_attempts, defaults.retry.max_attempts);
        assert_eq!(from_empty.retry.jitter, defaults.retry.jitter);
    }

    #[test]
    fn test_config_json_round_trip() {
        let mut config = Config::default();
        config.page_size = 50;
        config.download_concurrency = 4;
        config.retry.max_attempts = 2;
        config.retry.initial_delay = Duration::from_secs(3);

        let json = serde_json::to_string(&config).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.page_size, 50, "page_size should survive");
        assert_eq!(
            restored.download_concurrency, 4,
            "download_concurrency should survive"
        );
        assert_eq!(
            restored.retry.max_attempts, 2,
            "retry.max_attempts should survive"
        );
        assert_eq!(
            restored.retry.initial_delay,
            Duration::from_secs(3),
            "retry.initial_delay should survive as seconds"
        );
    }

    #[test]
    fn test_validate_range_checks() {
        let mut config = Config::default();
        config.page_size = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::Config {
                key: "page_size",
                ..
            })
        ));

        let mut config = Config::default();
        config.page_size = 501;
        assert!(config.validate().is_err(), "page_size over 500 must fail");

        let mut config = Config::default();
        config.search_concurrency = 11;
        assert!(matches!(
            config.validate(),
            Err(Error::Config {
                key: "search_concurrency",
                ..
            })
        ));

        let mut config = Config::default();
        config.download_concurrency = 0;
        assert!(config.validate().is_err(), "zero workers must fail");

        let mut config = Config::default();
        config.download_concurrency = 51;
        assert!(matches!(
            config.validate(),
            Err(Error::Config {
                key: "download_concurrency",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_base_urls() {
        let mut config = Config::default();
        config.api_base_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(Error::Config {
                key: "api_base_url",
                ..
            })
        ));

        let mut config = Config::default();
        config.site_base_url = String::new();
        assert!(config.validate().is_err(), "empty site URL must fail");
    }

    #[test]
    fn test_validate_backoff_multiplier() {
        let mut config = Config::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(matches!(
            config.validate(),
            Err(Error::Config {
                key: "retry.backoff_multiplier",
                ..
            })
        ));
    }

    #[test]
    fn test_durations_as_seconds() {
        let config = Config::default();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["request_timeout"], 30);
        assert_eq!(value["retry"]["initial_delay"], 1);
        assert_eq!(value["retry"]["max_delay"], 60);
    }

    #[test]
    fn test_duration_rejects_non_integer() {
        let result = serde_json::from_str::<Config>(r#"{"request_timeout": "30s"}"#);
        assert!(result.is_err(), "string durations must be rejected");

        let result = serde_json::from_str::<Config>(r#"{"request_timeout": -5}"#);
        assert!(result.is_err(), "negative durations must be rejected");
    }
}
