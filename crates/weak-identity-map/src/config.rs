//! Reclaimer and map configuration.
//!
//! The reclaimer is configured once per process, either programmatically
//! through [`configure`](crate::reclaim::configure) or from environment
//! variables:
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WEAKMAP_RECLAIM_MODE` | `background` or `manual` | `background` |
//! | `WEAKMAP_RECLAIM_BATCH` | Keys reclaimed per pass slice | 256 |
//!
//! Unparseable values fall back to the default.
//!
//! # Example
//!
//! ```
//! use weak_identity_map::{ReclaimConfig, ReclaimMode};
//!
//! let config = ReclaimConfig::default()
//!     .with_mode(ReclaimMode::Manual)
//!     .with_max_batch(64);
//! assert_eq!(config.max_batch, 64);
//! ```

use std::env;

/// Environment variable selecting the [`ReclaimMode`].
pub const ENV_RECLAIM_MODE: &str = "WEAKMAP_RECLAIM_MODE";
/// Environment variable setting [`ReclaimConfig::max_batch`].
pub const ENV_RECLAIM_BATCH: &str = "WEAKMAP_RECLAIM_BATCH";

const DEFAULT_MAX_BATCH: usize = 256;
const DEFAULT_THREAD_NAME: &str = "weakmap-reclaimer";

/// Where reclamation hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReclaimMode {
    /// A dedicated thread runs a pass whenever keys are queued.
    #[default]
    Background,
    /// Keys are only reclaimed by [`collect`](crate::collect).
    Manual,
}

impl ReclaimMode {
    /// Parse a mode name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" | "thread" | "auto" => Some(Self::Background),
            "manual" | "off" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Process-wide reclaimer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimConfig {
    /// Where hooks run.
    pub mode: ReclaimMode,
    /// Upper bound on keys the background thread reclaims before it releases
    /// the pass lock, letting [`collect`](crate::collect) callers in.
    pub max_batch: usize,
    /// Name of the background thread.
    pub thread_name: String,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            mode: ReclaimMode::default(),
            max_batch: DEFAULT_MAX_BATCH,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl ReclaimConfig {
    /// Defaults overridden by the `WEAKMAP_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(mode) = lookup(ENV_RECLAIM_MODE).as_deref().and_then(ReclaimMode::parse) {
            config.mode = mode;
        }
        if let Some(batch) = lookup(ENV_RECLAIM_BATCH)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
        {
            config.max_batch = batch;
        }
        config
    }

    /// Set the reclamation mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ReclaimMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the batch bound. Zero is treated as one.
    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// Set the background thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

/// What [`WeakIdentityMap::put`](crate::WeakIdentityMap::put) does when the key
/// already carries a hook registered by another owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookConflictPolicy {
    /// Replace the foreign hook and log a warning. The previous owner is
    /// never notified of the key's reclamation.
    #[default]
    Replace,
    /// Leave the key and the map untouched and return
    /// [`WeakMapError::HookConflict`](crate::WeakMapError::HookConflict).
    Reject,
}

/// Per-map configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapConfig {
    /// Behaviour on foreign hooks.
    pub hook_conflict: HookConflictPolicy,
}

impl MapConfig {
    /// The default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hook_conflict: HookConflictPolicy::Replace,
        }
    }

    /// Set the hook conflict policy.
    #[must_use]
    pub const fn with_hook_conflict(mut self, policy: HookConflictPolicy) -> Self {
        self.hook_conflict = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(ReclaimMode::parse("Manual"), Some(ReclaimMode::Manual));
        assert_eq!(ReclaimMode::parse(" background "), Some(ReclaimMode::Background));
        assert_eq!(ReclaimMode::parse("sometimes"), None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ReclaimConfig::from_lookup(|name| match name {
            ENV_RECLAIM_MODE => Some("manual".to_string()),
            ENV_RECLAIM_BATCH => Some("32".to_string()),
            _ => None,
        });
        assert_eq!(config.mode, ReclaimMode::Manual);
        assert_eq!(config.max_batch, 32);
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
    }

    #[test]
    fn test_from_lookup_ignores_garbage() {
        let config = ReclaimConfig::from_lookup(|name| match name {
            ENV_RECLAIM_MODE => Some("eventually".to_string()),
            ENV_RECLAIM_BATCH => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(config, ReclaimConfig::default());
    }

    #[test]
    fn test_with_max_batch_clamps_zero() {
        assert_eq!(ReclaimConfig::default().with_max_batch(0).max_batch, 1);
    }
}
