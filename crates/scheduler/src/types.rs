use std::path::Path;
use std::time::Duration;

use reactor_core::{Config, ReactorError};
use serde::{Deserialize, Serialize};

/// Queue pressure, determined by how many executions are waiting.
///
/// Purely observational: the scheduler never rejects or reorders work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadLevel {
    /// Queue depth at or below the elevated threshold.
    Normal,
    /// Queue depth above the elevated threshold.
    Elevated,
    /// Queue depth above the critical threshold.
    Critical,
}

/// Assess current load level from queue depth.
pub fn assess_load(queue_depth: usize, config: &SchedulerConfig) -> LoadLevel {
    if queue_depth > config.queue_critical_threshold {
        LoadLevel::Critical
    } else if queue_depth > config.queue_elevated_threshold {
        LoadLevel::Elevated
    } else {
        LoadLevel::Normal
    }
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Timeout for tasks that do not set one, in milliseconds. 0 = no timeout.
    #[serde(default)]
    pub default_timeout_ms: u64,
    /// Queue depth reported as elevated load.
    #[serde(default = "default_elevated")]
    pub queue_elevated_threshold: usize,
    /// Queue depth reported as critical load.
    #[serde(default = "default_critical")]
    pub queue_critical_threshold: usize,
}

fn default_elevated() -> usize { 100 }
fn default_critical() -> usize { 1000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 0,
            queue_elevated_threshold: default_elevated(),
            queue_critical_threshold: default_critical(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string, then apply env overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, ReactorError> {
        let mut config: Self =
            toml::from_str(toml_str).map_err(|e| ReactorError::Parse(e.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReactorError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// `REACTOR_DEFAULT_TIMEOUT_MS`, `REACTOR_QUEUE_ELEVATED` and
    /// `REACTOR_QUEUE_CRITICAL` override parsed values when set and numeric.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("REACTOR_DEFAULT_TIMEOUT_MS") {
            self.default_timeout_ms = v;
        }
        if let Some(v) = env_parse("REACTOR_QUEUE_ELEVATED") {
            self.queue_elevated_threshold = v;
        }
        if let Some(v) = env_parse("REACTOR_QUEUE_CRITICAL") {
            self.queue_critical_threshold = v;
        }
    }

    pub fn validate(&self) -> Result<(), ReactorError> {
        if self.queue_critical_threshold < self.queue_elevated_threshold {
            return Err(ReactorError::InvalidConfig {
                key: "queue_critical_threshold".to_string(),
                reason: format!(
                    "{} is below queue_elevated_threshold {}",
                    self.queue_critical_threshold, self.queue_elevated_threshold
                ),
            });
        }
        Ok(())
    }

    /// Default timeout, or `None` when disabled.
    pub fn default_timeout(&self) -> Option<Duration> {
        match self.default_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Timeout an execution actually races against. Zero means no timeout.
    pub fn resolve_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .or_else(|| self.default_timeout())
            .unwrap_or(Duration::ZERO)
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        Self {
            default_timeout_ms: config.reactor.default_timeout_ms,
            queue_elevated_threshold: config.reactor.queue_elevated_threshold,
            queue_critical_threshold: config.reactor.queue_critical_threshold,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assess_load_normal() {
        let config = SchedulerConfig::default();
        assert_eq!(assess_load(0, &config), LoadLevel::Normal);
        assert_eq!(assess_load(100, &config), LoadLevel::Normal);
    }

    #[test]
    fn assess_load_elevated() {
        let config = SchedulerConfig::default();
        assert_eq!(assess_load(101, &config), LoadLevel::Elevated);
        assert_eq!(assess_load(1000, &config), LoadLevel::Elevated);
    }

    #[test]
    fn assess_load_critical() {
        let config = SchedulerConfig::default();
        assert_eq!(assess_load(1001, &config), LoadLevel::Critical);
    }

    #[test]
    fn scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.default_timeout_ms, 0);
        assert_eq!(config.default_timeout(), None);
        assert_eq!(config.queue_elevated_threshold, 100);
        assert_eq!(config.queue_critical_threshold, 1000);
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let config = SchedulerConfig::from_toml("queue_elevated_threshold = 5\n").unwrap();
        assert_eq!(config.queue_elevated_threshold, 5);
        assert_eq!(config.queue_critical_threshold, 1000);
    }

    #[test]
    fn parse_rejects_inverted_thresholds() {
        let toml = "queue_elevated_threshold = 50\nqueue_critical_threshold = 10\n";
        assert!(matches!(
            SchedulerConfig::from_toml(toml),
            Err(ReactorError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn parse_rejects_malformed_toml() {
        assert!(matches!(
            SchedulerConfig::from_toml("default_timeout_ms = \"soon\""),
            Err(ReactorError::Parse(_))
        ));
    }

    #[test]
    fn zero_timeout_is_a_sentinel() {
        let config = SchedulerConfig {
            default_timeout_ms: 250,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.resolve_timeout(None), Duration::from_millis(250));
        assert_eq!(config.resolve_timeout(Some(Duration::ZERO)), Duration::ZERO);
        assert_eq!(
            config.resolve_timeout(Some(Duration::from_millis(10))),
            Duration::from_millis(10)
        );
        assert_eq!(SchedulerConfig::default().resolve_timeout(None), Duration::ZERO);
    }

    #[test]
    fn from_core_config() {
        let mut core = Config::for_profile("schedtypesfromcore");
        core.reactor.default_timeout_ms = 40;
        let config = SchedulerConfig::from(&core);
        assert_eq!(config.default_timeout(), Some(Duration::from_millis(40)));
    }
}
