use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ReactorError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub reactor: ReactorConfig,
    pub logging: LoggingConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &[
    "REACTOR_DEFAULT_TIMEOUT_MS",
    "REACTOR_QUEUE_ELEVATED",
    "REACTOR_QUEUE_CRITICAL",
    "REACTOR_LOG",
];

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `REACTOR_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("REACTOR_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            reactor: ReactorConfig::from_env_profiled(p),
            logging: LoggingConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}` patterns.
    /// Always includes "default" (the unprefixed config).
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty()
                        && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                    {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject combinations the scheduler cannot work with.
    pub fn validate(&self) -> Result<(), ReactorError> {
        if self.reactor.queue_critical_threshold < self.reactor.queue_elevated_threshold {
            return Err(ReactorError::InvalidConfig {
                key: "REACTOR_QUEUE_CRITICAL".to_string(),
                reason: format!(
                    "critical threshold {} is below elevated threshold {}",
                    self.reactor.queue_critical_threshold, self.reactor.queue_elevated_threshold
                ),
            });
        }
        if self.logging.filter.trim().is_empty() {
            return Err(ReactorError::InvalidConfig {
                key: "REACTOR_LOG".to_string(),
                reason: "log filter must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  reactor:     default_timeout_ms={}, queue_elevated={}, queue_critical={}",
            self.reactor.default_timeout_ms,
            self.reactor.queue_elevated_threshold,
            self.reactor.queue_critical_threshold
        );
        tracing::info!("  logging:     filter={}", self.logging.filter);
    }

    /// Return a JSON view of the active settings.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "reactor": {
                "default_timeout_ms": self.reactor.default_timeout_ms,
                "queue_elevated_threshold": self.reactor.queue_elevated_threshold,
                "queue_critical_threshold": self.reactor.queue_critical_threshold,
            },
            "logging": { "filter": self.logging.filter },
        })
    }
}

// ── Reactor ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactorConfig {
    /// Timeout applied to tasks that do not set their own; 0 = no timeout.
    pub default_timeout_ms: u64,
    /// Queue depth above which the scheduler reports elevated load.
    pub queue_elevated_threshold: usize,
    /// Queue depth above which the scheduler reports critical load.
    pub queue_critical_threshold: usize,
}

impl ReactorConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            default_timeout_ms: profiled_env_u64(p, "REACTOR_DEFAULT_TIMEOUT_MS", 0),
            queue_elevated_threshold: profiled_env_usize(p, "REACTOR_QUEUE_ELEVATED", 100),
            queue_critical_threshold: profiled_env_usize(p, "REACTOR_QUEUE_CRITICAL", 1000),
        }
    }
}

// ── Logging ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl LoggingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            filter: profiled_env_or(p, "REACTOR_LOG", "info"),
        }
    }
}
