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

//! The diagnostics aggregator.
//!
//! A sweep runs every category check, applies automatic remediation to
//! critical memory and pool findings, scores the result and caches it as an
//! immutable [`HealthReport`]. Only one sweep runs at a time; a concurrent or
//! re-entrant request gets the last completed report instead.

mod checks;
mod remediation;

use self::checks::{SweepContext, CHECKS, CHECK_FAILED};
use crate::analysis;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use vigil_core::config::DiagnosticsConfig;
use vigil_core::guard::panic_message;
use vigil_core::sync::lock;
use vigil_core::{
    Category, Clock, EventBus, Finding, FindingStatus, GovernorEvent, HealthReport,
    PlatformProbe, Severity,
};
use vigil_data::ResourcePool;
use vigil_telemetry::{MemorySampler, PerformanceLog};

/// Clears the in-flight flag when the sweep ends, even by unwinding.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs diagnostic sweeps and keeps the latest report.
pub struct DiagnosticsAggregator {
    config: DiagnosticsConfig,
    clock: Arc<dyn Clock>,
    probe: Arc<dyn PlatformProbe>,
    pool: Arc<ResourcePool>,
    sampler: Arc<MemorySampler>,
    performance: Arc<PerformanceLog>,
    bus: Arc<EventBus>,
    in_flight: AtomicBool,
    last_report: Mutex<Option<Arc<HealthReport>>>,
    // (timer, listener) eviction totals seen by the previous sweep.
    seen_evictions: Mutex<(u64, u64)>,
    sweeps: AtomicU64,
}

impl DiagnosticsAggregator {
    /// Creates an aggregator over the given components.
    pub fn new(
        config: DiagnosticsConfig,
        clock: Arc<dyn Clock>,
        probe: Arc<dyn PlatformProbe>,
        pool: Arc<ResourcePool>,
        sampler: Arc<MemorySampler>,
        performance: Arc<PerformanceLog>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            clock,
            probe,
            pool,
            sampler,
            performance,
            bus,
            in_flight: AtomicBool::new(false),
            last_report: Mutex::new(None),
            seen_evictions: Mutex::new((0, 0)),
            sweeps: AtomicU64::new(0),
        }
    }

    /// Returns the aggregator configuration.
    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    /// The last completed report, if any sweep has finished.
    pub fn last_report(&self) -> Option<Arc<HealthReport>> {
        lock(&self.last_report).clone()
    }

    /// Number of sweeps that actually ran.
    pub fn sweep_count(&self) -> u64 {
        self.sweeps.load(Ordering::Acquire)
    }

    /// `true` while a sweep is running.
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs a full sweep and returns its report.
    ///
    /// If a sweep is already running, on this thread or another, returns the
    /// last completed report, or an empty one before the first sweep finishes.
    pub fn run_full(&self) -> Arc<HealthReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("Diagnostic sweep already in progress, returning the last report.");
            return self
                .last_report()
                .unwrap_or_else(|| Arc::new(HealthReport::empty(self.clock.now_ms())));
        }
        let _guard = SweepGuard(&self.in_flight);

        let report = match panic::catch_unwind(AssertUnwindSafe(|| self.sweep())) {
            Ok(report) => report,
            Err(payload) => self.failed_sweep(&panic_message(payload.as_ref())),
        };
        let report = Arc::new(report);
        *lock(&self.last_report) = Some(Arc::clone(&report));
        self.sweeps.fetch_add(1, Ordering::AcqRel);
        report
    }

    /// Runs a sweep on the schedule and broadcasts a
    /// [`GovernorEvent::SystemHealthAlert`] when the score is below the alert
    /// threshold.
    pub fn run_scheduled(&self) -> Arc<HealthReport> {
        let report = self.run_full();
        if report.overall_score < self.config.alert_threshold {
            log::warn!(
                "System health degraded: score {} (threshold {}).",
                report.overall_score,
                self.config.alert_threshold
            );
            self.bus.publish(GovernorEvent::SystemHealthAlert {
                report: Arc::clone(&report),
                timestamp: self.clock.now_ms(),
            });
        }
        report
    }

    fn sweep(&self) -> HealthReport {
        let memory = self.sampler.sample();
        let pool = self.pool.stats();
        let (timer_evictions, listener_evictions) = {
            let mut seen = lock(&self.seen_evictions);
            let delta = (
                pool.timer_evictions.saturating_sub(seen.0),
                pool.listener_evictions.saturating_sub(seen.1),
            );
            *seen = (pool.timer_evictions, pool.listener_evictions);
            delta
        };
        let performance = self.performance.report();
        let sampler_config = self.sampler.config();

        let ctx = SweepContext {
            config: &self.config,
            warning_ratio: sampler_config.warning_ratio,
            critical_ratio: sampler_config.critical_ratio,
            memory,
            leak_trend: self.sampler.leak_trend(),
            pool,
            timer_evictions,
            listener_evictions,
            performance: &performance,
            probe: self.probe.as_ref(),
        };

        let mut findings: Vec<Finding> = Vec::new();
        for (category, check) in CHECKS {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| check(&ctx, &mut findings)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => panic_message(payload.as_ref()),
            };
            log::error!("Diagnostic check '{category}' failed: {failure}");
            findings.push(
                Finding::new(
                    Category::Diagnostics,
                    CHECK_FAILED,
                    Severity::Critical,
                    FindingStatus::Detected,
                    format!("{category} check failed: {failure}"),
                )
                .with_recommendation("Inspect the governor logs for the failing check."),
            );
        }

        let fixed = remediation::auto_fix(&mut findings, &self.pool, &self.sampler);
        let report = analysis::assemble_report(
            findings,
            memory,
            &performance,
            self.probe.connection(),
            self.clock.now_ms(),
        );
        log::info!(
            "Diagnostic sweep done: score {}, {} findings ({} auto-fixed).",
            report.overall_score,
            report.findings.len(),
            fixed
        );
        report
    }

    /// The report cached when the sweep itself unwinds, outside any single check.
    fn failed_sweep(&self, failure: &str) -> HealthReport {
        log::error!("Diagnostic sweep failed: {failure}");
        let mut report = HealthReport::empty(self.clock.now_ms());
        report.findings.push(
            Finding::new(
                Category::Diagnostics,
                CHECK_FAILED,
                Severity::Critical,
                FindingStatus::Detected,
                format!("sweep failed: {failure}"),
            )
            .with_recommendation("Inspect the governor logs for the failing check."),
        );
        report.overall_score = analysis::overall_score(&report.findings);
        report.recommendations = analysis::recommendations(&report.findings);
        report
    }
}

impl std::fmt::Debug for DiagnosticsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticsAggregator")
            .field("profile", &self.config.profile)
            .field("sweeps", &self.sweep_count())
            .field("running", &self.is_running())
            .finish()
    }
}
