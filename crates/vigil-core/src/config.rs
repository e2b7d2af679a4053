// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Governor configuration.
//!
//! Every threshold of the governor is a configuration default rather than a
//! fixed invariant. The configuration is plain serde data so it can be loaded
//! from JSON; missing fields fall back to their defaults.

use crate::error::ConfigError;
use crate::platform::BuildProfile;
use serde::{Deserialize, Serialize};
use std::path::Path;

const MIB: u64 = 1024 * 1024;

/// Caps and clamps for the resource pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of live one-shot timers.
    pub max_timeouts: usize,
    /// Maximum number of live repeating timers.
    pub max_intervals: usize,
    /// Maximum number of live listeners.
    pub max_listeners: usize,
    /// Live listener count above which a warning is logged.
    pub listener_warn_threshold: usize,
    /// Upper clamp for one-shot delays.
    pub max_timeout_delay_ms: u64,
    /// Lower clamp for repeating periods.
    pub min_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_timeouts: 50,
            max_intervals: 20,
            max_listeners: 200,
            listener_warn_threshold: 100,
            max_timeout_delay_ms: 300_000,
            min_interval_ms: 1_000,
        }
    }
}

/// Thresholds and cadence of the memory sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Usage ratio (used / limit) considered high.
    pub warning_ratio: f64,
    /// Usage ratio considered critical; crossing it fans out pressure callbacks.
    pub critical_ratio: f64,
    /// Interval between scheduled polls.
    pub poll_interval_ms: u64,
    /// Number of usage ratios kept for the leak heuristic.
    pub history_capacity: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            warning_ratio: 0.75,
            critical_ratio: 0.90,
            poll_interval_ms: 30_000,
            history_capacity: 20,
        }
    }
}

/// Watchdog thresholds for sessions and the host heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Idle time after which an active session is considered frozen.
    pub freeze_threshold_ms: u64,
    /// Activity count above which a young session is considered runaway.
    pub render_cap: u64,
    /// Age window, from session start, in which the runaway cap applies.
    pub short_window_ms: u64,
    /// Memory growth over the session baseline that triggers a pressure event.
    pub growth_cap_bytes: u64,
    /// Heartbeat cadence.
    pub heartbeat_interval_ms: u64,
    /// Gap between two heartbeats that counts as a host stall.
    pub stall_threshold_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            freeze_threshold_ms: 5_000,
            render_cap: 100,
            short_window_ms: 10_000,
            growth_cap_bytes: 100 * MIB,
            heartbeat_interval_ms: 100,
            stall_threshold_ms: 1_000,
        }
    }
}

/// Rules and cadence of the diagnostic sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Build profile; selects the sweep cadence and the runtime checks.
    pub profile: BuildProfile,
    /// Sweep cadence in development builds.
    pub development_interval_ms: u64,
    /// Sweep cadence in production builds.
    pub production_interval_ms: u64,
    /// Scheduled sweeps scoring below this broadcast an alert.
    pub alert_threshold: u8,
    /// Usage ratio reported as elevated (medium, monitoring).
    pub elevated_memory_ratio: f64,
    /// Relative growth of the usage history reported as a potential leak.
    pub leak_trend_ratio: f64,
    /// Relative growth reported as a high-severity leak.
    pub leak_trend_high_ratio: f64,
    /// Average render time considered slow.
    pub slow_render_ms: f64,
    /// Per-component render time considered slow.
    pub slow_component_ms: f64,
    /// Total bundle size considered large.
    pub bundle_size_limit_bytes: u64,
    /// Pool fill ratio reported for monitoring.
    pub pool_usage_warn_ratio: f64,
    /// Listener count reported for monitoring.
    pub listener_warn: usize,
    /// Listener count reported as excessive.
    pub listener_limit: usize,
    /// Document node count reported for monitoring.
    pub dom_node_warn: usize,
    /// Document node count reported as excessive.
    pub dom_node_limit: usize,
    /// Document depth reported as too deep.
    pub dom_depth_limit: usize,
    /// Mutations per second reported as churn.
    pub dom_mutation_limit: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            profile: BuildProfile::current(),
            development_interval_ms: 10 * 60 * 1_000,
            production_interval_ms: 30 * 60 * 1_000,
            alert_threshold: 70,
            elevated_memory_ratio: 0.5,
            leak_trend_ratio: 0.10,
            leak_trend_high_ratio: 0.25,
            slow_render_ms: 100.0,
            slow_component_ms: 50.0,
            bundle_size_limit_bytes: 5 * MIB,
            pool_usage_warn_ratio: 0.8,
            listener_warn: 50,
            listener_limit: 100,
            dom_node_warn: 5_000,
            dom_node_limit: 10_000,
            dom_depth_limit: 20,
            dom_mutation_limit: 100,
        }
    }
}

impl DiagnosticsConfig {
    /// Returns the sweep cadence for the configured profile.
    pub fn interval_ms(&self) -> u64 {
        match self.profile {
            BuildProfile::Development => self.development_interval_ms,
            BuildProfile::Production => self.production_interval_ms,
        }
    }
}

/// Complete governor configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Resource pool caps.
    pub pool: PoolConfig,
    /// Memory sampler thresholds.
    pub sampler: SamplerConfig,
    /// Session watchdog thresholds.
    pub monitor: MonitorConfig,
    /// Diagnostic sweep rules.
    pub diagnostics: DiagnosticsConfig,
}

impl GovernorConfig {
    /// Loads a configuration from a JSON string and validates it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Saves the configuration as pretty JSON.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Checks that every value is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let pool = &self.pool;
        if pool.max_timeouts == 0 || pool.max_intervals == 0 || pool.max_listeners == 0 {
            return Err(ConfigError::Invalid("pool caps must be at least 1".into()));
        }
        if pool.min_interval_ms == 0 {
            return Err(ConfigError::Invalid("min_interval_ms must be positive".into()));
        }

        let sampler = &self.sampler;
        if !(0.0 < sampler.warning_ratio && sampler.warning_ratio < sampler.critical_ratio)
            || sampler.critical_ratio > 1.0
        {
            return Err(ConfigError::Invalid(format!(
                "expected 0 < warning_ratio ({}) < critical_ratio ({}) <= 1",
                sampler.warning_ratio, sampler.critical_ratio
            )));
        }
        if sampler.history_capacity < 3 {
            return Err(ConfigError::Invalid(
                "history_capacity must hold at least 3 samples".into(),
            ));
        }

        let monitor = &self.monitor;
        if monitor.heartbeat_interval_ms == 0
            || monitor.stall_threshold_ms <= monitor.heartbeat_interval_ms
        {
            return Err(ConfigError::Invalid(
                "stall_threshold_ms must exceed a positive heartbeat_interval_ms".into(),
            ));
        }

        let diagnostics = &self.diagnostics;
        if diagnostics.alert_threshold > 100 {
            return Err(ConfigError::Invalid("alert_threshold must be <= 100".into()));
        }
        if diagnostics.interval_ms() == 0 {
            return Err(ConfigError::Invalid("sweep interval must be positive".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GovernorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool.max_timeouts, 50);
        assert_eq!(config.pool.max_intervals, 20);
        assert_eq!(config.monitor.growth_cap_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config =
            GovernorConfig::from_json(r#"{ "monitor": { "freeze_threshold_ms": 2500 } }"#)
                .unwrap();
        assert_eq!(config.monitor.freeze_threshold_ms, 2_500);
        assert_eq!(config.monitor.render_cap, 100);
        assert_eq!(config.sampler.critical_ratio, 0.90);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let result = GovernorConfig::from_json(
            r#"{ "sampler": { "warning_ratio": 0.95, "critical_ratio": 0.9 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_cap_is_rejected() {
        let mut config = GovernorConfig::default();
        config.pool.max_intervals = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn profile_selects_interval() {
        let mut config = DiagnosticsConfig {
            profile: BuildProfile::Development,
            ..Default::default()
        };
        assert_eq!(config.interval_ms(), 600_000);
        config.profile = BuildProfile::Production;
        assert_eq!(config.interval_ms(), 1_800_000);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            GovernorConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
