//! Runtime configuration.

use crate::error::ConfigError;
use std::time::Duration;

/// Settings for one runtime instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Timeout for tests and hooks that neither set their own nor inherit a
    /// `spec_timeout`.
    pub default_timeout: Duration,
    /// Fail the run when any `only` test is present.
    pub fail_on_only: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            default_timeout: RunConfig::DEFAULT_TIMEOUT,
            fail_on_only: false,
        }
    }
}

impl RunConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20);

    pub const TIMEOUT_VAR: &'static str = "OSPEC_TIMEOUT_MS";
    pub const FAIL_ON_ONLY_VAR: &'static str = "OSPEC_FAIL_ON_ONLY";

    /// Read `OSPEC_TIMEOUT_MS` and `OSPEC_FAIL_ON_ONLY`. Unset or empty
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = RunConfig::default();

        if let Some(raw) = lookup(Self::TIMEOUT_VAR).filter(|v| !v.is_empty()) {
            let ms: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidVar {
                    var: Self::TIMEOUT_VAR,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
            config.default_timeout = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup(Self::FAIL_ON_ONLY_VAR).filter(|v| !v.is_empty()) {
            config.fail_on_only = match raw.trim() {
                "1" => true,
                "0" => false,
                v if v.eq_ignore_ascii_case("true") => true,
                v if v.eq_ignore_ascii_case("false") => false,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        var: Self::FAIL_ON_ONLY_VAR,
                        value: raw,
                        reason: "expected 1, 0, true or false".to_string(),
                    })
                }
            };
        }

        Ok(config)
    }
}
