//! Configuration module for gcs-sync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder for programmatic use.
//!
//! ```yaml
//! sync:
//!   - src: ~/projects/site
//!     dst: gs://my-bucket/site
//!     directions: [local_to_remote]
//!     ignore: ["**/*.tmp", ".git/**"]
//!     enabled: true
//!     debounce_window: 3s
//!     remote_poll_window: 1m
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::ignore::IgnoreSet;

/// Debounce window applied when a rule does not set one.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_secs(3);

/// Remote poll window applied when a rule does not set one.
pub const DEFAULT_REMOTE_POLL_WINDOW: Duration = Duration::from_secs(60);

/// Longest debounce or poll window a rule may use.
pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

// ---------------------------------------------------------------------------
// Config / SyncRule
// ---------------------------------------------------------------------------

/// Top-level configuration for gcs-sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sync rules, in file order.
    #[serde(default)]
    pub sync: Vec<SyncRule>,
}

/// Which way data flows for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    LocalToRemote,
    RemoteToLocal,
    Full,
}

impl SyncDirection {
    /// True for directions that can bring changes in from the remote side.
    pub fn is_remote_originated(self) -> bool {
        matches!(self, SyncDirection::RemoteToLocal | SyncDirection::Full)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncDirection::LocalToRemote => "local_to_remote",
            SyncDirection::RemoteToLocal => "remote_to_local",
            SyncDirection::Full => "full",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source/destination pair with its own timing and ignore list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRule {
    /// Local directory; `~` is expanded at scheduler start.
    pub src: String,
    /// Remote location, e.g. `gs://bucket/prefix`.
    pub dst: String,
    #[serde(default)]
    pub directions: Vec<SyncDirection>,
    /// Glob patterns relative to `src`.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Rules are only scheduled when explicitly enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Quiet period after the last local change before syncing.
    #[serde(default = "default_debounce_window", with = "duration_text")]
    pub debounce_window: Duration,
    /// Interval between unconditional syncs for remote-originated directions.
    #[serde(default = "default_remote_poll_window", with = "duration_text")]
    pub remote_poll_window: Duration,
}

fn default_debounce_window() -> Duration {
    DEFAULT_DEBOUNCE_WINDOW
}

fn default_remote_poll_window() -> Duration {
    DEFAULT_REMOTE_POLL_WINDOW
}

impl SyncRule {
    /// True when the rule needs a remote poll timer.
    pub fn polls_remote(&self) -> bool {
        self.directions.iter().any(|d| d.is_remote_originated())
    }

    /// The first timing window the scheduler cannot run with, if any.
    ///
    /// Returns the field name and the reason. The poll window is only
    /// checked for rules that poll.
    pub fn invalid_window(&self) -> Option<(&'static str, &'static str)> {
        if let Err(reason) = check_window(self.debounce_window) {
            return Some(("debounce_window", reason));
        }
        if self.polls_remote() {
            if let Err(reason) = check_window(self.remote_poll_window) {
                return Some(("remote_poll_window", reason));
            }
        }
        None
    }
}

fn check_window(window: Duration) -> Result<(), &'static str> {
    if window.is_zero() {
        Err("must be greater than 0")
    } else if window > MAX_WINDOW {
        Err("must not exceed 366 days")
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from YAML text.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Rules with `enabled: true`, in file order.
    pub fn enabled_rules(&self) -> impl Iterator<Item = &SyncRule> {
        self.sync.iter().filter(|r| r.enabled)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Path to the offending field, e.g. `"sync[1].directions"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// Disabled rules are never scheduled and are not checked. An empty
    /// vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (index, rule) in self.sync.iter().enumerate() {
            if !rule.enabled {
                continue;
            }
            let field = |name: &str| format!("sync[{index}].{name}");

            if rule.src.trim().is_empty() {
                errors.push(ValidationError {
                    field: field("src"),
                    message: "must not be empty".into(),
                });
            }
            if rule.dst.trim().is_empty() {
                errors.push(ValidationError {
                    field: field("dst"),
                    message: "must not be empty".into(),
                });
            }
            if rule.directions.is_empty() {
                errors.push(ValidationError {
                    field: field("directions"),
                    message: "enabled rule needs at least one direction".into(),
                });
            }
            if let Err(reason) = check_window(rule.debounce_window) {
                errors.push(ValidationError {
                    field: field("debounce_window"),
                    message: reason.into(),
                });
            }
            if rule.polls_remote() {
                if let Err(reason) = check_window(rule.remote_poll_window) {
                    errors.push(ValidationError {
                        field: field("remote_poll_window"),
                        message: format!("{reason} for remote-originated directions"),
                    });
                }
            }
            if let Err(e) = IgnoreSet::compile(&rule.ignore) {
                errors.push(ValidationError {
                    field: field("ignore"),
                    message: e.to_string(),
                });
            }
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// SyncRuleBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`SyncRule`] programmatically.
///
/// Starts disabled with no directions and the default windows.
///
/// # Example
///
/// ```rust
/// use gcsync_core::config::{SyncDirection, SyncRuleBuilder};
/// use std::time::Duration;
///
/// let rule = SyncRuleBuilder::new("~/site", "gs://bucket/site")
///     .direction(SyncDirection::LocalToRemote)
///     .ignore("**/*.tmp")
///     .debounce_window(Duration::from_millis(500))
///     .enabled(true)
///     .build();
/// assert!(!rule.polls_remote());
/// ```
#[derive(Debug, Clone)]
pub struct SyncRuleBuilder {
    rule: SyncRule,
}

impl SyncRuleBuilder {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            rule: SyncRule {
                src: src.into(),
                dst: dst.into(),
                directions: Vec::new(),
                ignore: Vec::new(),
                enabled: false,
                debounce_window: DEFAULT_DEBOUNCE_WINDOW,
                remote_poll_window: DEFAULT_REMOTE_POLL_WINDOW,
            },
        }
    }

    pub fn direction(mut self, direction: SyncDirection) -> Self {
        self.rule.directions.push(direction);
        self
    }

    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.rule.ignore.push(pattern.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.rule.enabled = enabled;
        self
    }

    pub fn debounce_window(mut self, window: Duration) -> Self {
        self.rule.debounce_window = window;
        self
    }

    pub fn remote_poll_window(mut self, window: Duration) -> Self {
        self.rule.remote_poll_window = window;
        self
    }

    /// Consume the builder and return the finished [`SyncRule`].
    pub fn build(self) -> SyncRule {
        self.rule
    }
}

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

/// Parses a duration such as `500ms`, `3s`, `1m30s`, `1.5h` or a bare `0`.
///
/// Units: `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. Components may be repeated
/// and each may carry a decimal fraction.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration".to_string());
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos: f64 = 0.0;
    let mut rest = text;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration '{text}'"))?;
        if number_len == 0 {
            return Err(format!("expected a number in duration '{text}'"));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| format!("invalid number in duration '{text}'"))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            unit => return Err(format!("unknown unit '{unit}' in duration '{text}'")),
        };
        rest = &rest[unit_len..];

        total_nanos += value * scale;
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Formats a duration the way [`parse_duration`] reads it back.
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else if duration.subsec_nanos() % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}

/// Serde adapter: durations as text (`3s`) or integer seconds.
mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
