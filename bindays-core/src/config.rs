//! Configuration for relay clients executing collector requests.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CollectorError, Result};

/// Environment variable prefix read by [`RelayConfig::from_vars`].
pub const ENV_PREFIX: &str = "BINDAYS_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Settings for the component that executes relayed requests over HTTP.
pub struct RelayConfig {
    /// User agent presented to council websites.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Timeout per relayed request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum round trips for a single lookup before it is abandoned.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// File receiving log output. Logging is disabled when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// `tracing` filter directive.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_user_agent() -> String {
    String::from(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0 Safari/537.36",
    )
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_steps() -> usize {
    12
}

fn default_log_filter() -> String {
    String::from("info")
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            max_steps: default_max_steps(),
            log_file: None,
            log_filter: default_log_filter(),
        }
    }
}

impl RelayConfig {
    /// Build from `BINDAYS_*` variables, e.g. `std::env::vars()`. Unknown
    /// variables are ignored; missing ones keep their defaults.
    ///
    /// Recognized: `BINDAYS_USER_AGENT`, `BINDAYS_TIMEOUT_SECS`,
    /// `BINDAYS_MAX_STEPS`, `BINDAYS_LOG_FILE`, `BINDAYS_LOG`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Config`] when a numeric variable does
    /// not parse or the result fails [`Self::validate`].
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value: String = value.into();
            match name {
                "USER_AGENT" => config.user_agent = value,
                "TIMEOUT_SECS" => config.timeout_secs = parse_number(name, &value)?,
                "MAX_STEPS" => config.max_steps = parse_number(name, &value)?,
                "LOG_FILE" if !value.trim().is_empty() => {
                    config.log_file = Some(PathBuf::from(value));
                }
                "LOG" => config.log_filter = value,
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError::Config`] naming the invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            return Err(config_error("user agent must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(config_error("timeout must be at least one second"));
        }
        if self.max_steps == 0 {
            return Err(config_error("max steps must be at least one"));
        }
        Ok(())
    }

    /// Request timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_number<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err| {
        CollectorError::Config(format!("{ENV_PREFIX}{name}={value} is not a number: {err}"))
    })
}

fn config_error(message: &str) -> CollectorError {
    CollectorError::Config(message.to_owned())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_apply_without_variables() {
        let config = RelayConfig::from_vars(Vec::<(String, String)>::new()).expect("defaults");
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn reads_prefixed_variables() {
        let config = RelayConfig::from_vars([
            ("BINDAYS_USER_AGENT", "bindays/0.1"),
            ("BINDAYS_TIMEOUT_SECS", "5"),
            ("BINDAYS_MAX_STEPS", " 20 "),
            ("BINDAYS_LOG_FILE", "/tmp/bindays.log"),
            ("BINDAYS_LOG", "bindays_core=debug"),
            ("HOME", "/root"),
        ])
        .expect("valid config");

        assert_eq!(config.user_agent, "bindays/0.1");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_steps, 20);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/bindays.log")));
        assert_eq!(config.log_filter, "bindays_core=debug");
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            RelayConfig::from_vars([("BINDAYS_TIMEOUT_SECS", "soon")]),
            Err(CollectorError::Config(_))
        ));

        let error = RelayConfig::from_vars([("BINDAYS_MAX_STEPS", "0")]).expect_err("zero steps");
        assert_eq!(error.to_string(), "Configuration error: max steps must be at least one");
        assert!(!error.is_not_found());
    }
}
