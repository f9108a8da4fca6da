//! Runtime configuration: tick period, stall detection threshold, shutdown signal set, default
//! task budget.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for one [`crate::controller::ExecutableController`] run. Loadable from a TOML
/// file via [`RuntimeConfig::from_file`], or built programmatically starting from
/// [`RuntimeConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// The scheduler's tick period, in milliseconds
    pub tick_period_ms: u64,
    /// Number of consecutive starting-phase polls a module may spend in `Starting` with no
    /// progress before the controller raises a critical stall error naming it
    pub starting_stall_checks: u32,
    /// How often the controller polls for starting-phase progress and shutdown, in milliseconds
    pub poll_interval_ms: u64,
    /// POSIX signal names that trigger shutdown. Ignored on non-unix targets. Unknown names are
    /// rejected at [`crate::controller::ExecutableController::run`] time.
    pub shutdown_signals: Vec<String>,
    /// Budget applied to a periodic task that registers with no budget of its own, in
    /// milliseconds. Zero means unbudgeted (no overrun diagnostic).
    pub default_task_budget_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 10,
            starting_stall_checks: 100,
            poll_interval_ms: 50,
            shutdown_signals: ["SIGINT", "SIGTERM", "SIGHUP", "SIGQUIT"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            default_task_budget_ms: 0,
        }
    }
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file. Missing fields fall back to [`RuntimeConfig::default`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))
    }
    /// The tick period as a [`Duration`]
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }
    /// The starting-phase poll interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    /// The default task budget as a [`Duration`]
    pub fn default_task_budget(&self) -> Duration {
        Duration::from_millis(self.default_task_budget_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_sane() {
        let config = RuntimeConfig::default();
        assert!(config.tick_period_ms >= 1);
        assert!(config.starting_stall_checks >= 1);
        assert_eq!(config.shutdown_signals, vec!["SIGINT", "SIGTERM", "SIGHUP", "SIGQUIT"]);
        assert_eq!(config.default_task_budget(), Duration::ZERO);
    }

    #[test]
    fn test_shutdown_signals_overridable() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("vaf-rt-test-config-signals-{:p}.toml", &dir));
        std::fs::write(&path, "shutdown_signals = [\"SIGTERM\"]\n").unwrap();
        let config = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(config.shutdown_signals, vec!["SIGTERM"]);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_from_file_partial_override() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("vaf-rt-test-config-{:p}.toml", &dir));
        std::fs::write(&path, "tick_period_ms = 5\n").unwrap();
        let config = RuntimeConfig::from_file(&path).unwrap();
        assert_eq!(config.tick_period_ms, 5);
        assert_eq!(config.starting_stall_checks, RuntimeConfig::default().starting_stall_checks);
        std::fs::remove_file(&path).unwrap();
    }
}
