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

//! Render timing and bundle size bookkeeping.

use crate::history::RollingWindow;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use vigil_core::sync::lock;

/// Number of recent renders the average is computed over.
const RENDER_WINDOW: usize = 120;

/// The worst observed render time of one component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentTiming {
    /// Component name as reported by the caller.
    pub component: String,
    /// Slowest render seen, in milliseconds.
    pub worst_ms: f64,
}

/// A snapshot of the performance log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceReport {
    /// Mean render time over the recent window, 0.0 when nothing was recorded.
    pub average_render_ms: f64,
    /// Renders in the averaging window.
    pub render_samples: usize,
    /// Components by worst render time, slowest first.
    pub slowest_components: Vec<ComponentTiming>,
    /// Sum of every recorded bundle.
    pub total_bundle_bytes: u64,
}

#[derive(Debug)]
struct LogState {
    renders: RollingWindow,
    worst_by_component: HashMap<String, f64>,
    bundle_bytes: u64,
}

/// Collects render durations and bundle sizes reported by the application.
#[derive(Debug)]
pub struct PerformanceLog {
    slow_render_ms: f64,
    state: Mutex<LogState>,
}

impl PerformanceLog {
    /// Creates an empty log; renders slower than `slow_render_ms` are logged.
    pub fn new(slow_render_ms: f64) -> Self {
        Self {
            slow_render_ms,
            state: Mutex::new(LogState {
                renders: RollingWindow::new(RENDER_WINDOW),
                worst_by_component: HashMap::new(),
                bundle_bytes: 0,
            }),
        }
    }

    /// Records one render of `component`.
    pub fn record_render(&self, component: &str, duration: Duration) {
        let ms = duration.as_secs_f64() * 1_000.0;
        if ms > self.slow_render_ms {
            log::debug!("Slow render of '{component}': {ms:.1}ms");
        }

        let mut state = lock(&self.state);
        state.renders.push(ms);
        let worst = state
            .worst_by_component
            .entry(component.to_owned())
            .or_insert(0.0);
        *worst = worst.max(ms);
    }

    /// Records a loaded bundle.
    pub fn record_bundle_size(&self, bytes: u64) {
        let mut state = lock(&self.state);
        state.bundle_bytes = state.bundle_bytes.saturating_add(bytes);
    }

    /// Summarises what has been recorded so far.
    pub fn report(&self) -> PerformanceReport {
        let state = lock(&self.state);
        let mut slowest: Vec<ComponentTiming> = state
            .worst_by_component
            .iter()
            .map(|(component, &worst_ms)| ComponentTiming {
                component: component.clone(),
                worst_ms,
            })
            .collect();
        slowest.sort_by(|a, b| {
            b.worst_ms
                .total_cmp(&a.worst_ms)
                .then_with(|| a.component.cmp(&b.component))
        });

        PerformanceReport {
            average_render_ms: state.renders.average(),
            render_samples: state.renders.len(),
            slowest_components: slowest,
            total_bundle_bytes: state.bundle_bytes,
        }
    }

    /// Forgets everything recorded.
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        state.renders = RollingWindow::new(RENDER_WINDOW);
        state.worst_by_component.clear();
        state.bundle_bytes = 0;
    }
}

impl Default for PerformanceLog {
    fn default() -> Self {
        Self::new(100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_reports_zeroes() {
        let report = PerformanceLog::default().report();
        assert_eq!(report, PerformanceReport::default());
    }

    #[test]
    fn report_orders_components_by_worst_time() {
        let log = PerformanceLog::default();
        log.record_render("list", Duration::from_millis(20));
        log.record_render("chart", Duration::from_millis(80));
        log.record_render("list", Duration::from_millis(60));

        let report = log.report();
        assert_eq!(report.render_samples, 3);
        assert!((report.average_render_ms - 160.0 / 3.0).abs() < 1e-6);
        let names: Vec<_> = report
            .slowest_components
            .iter()
            .map(|c| c.component.as_str())
            .collect();
        assert_eq!(names, vec!["chart", "list"]);
        assert!((report.slowest_components[1].worst_ms - 60.0).abs() < 1e-6);
    }

    #[test]
    fn bundle_sizes_accumulate() {
        let log = PerformanceLog::default();
        log.record_bundle_size(3 * 1024 * 1024);
        log.record_bundle_size(3 * 1024 * 1024);
        assert_eq!(log.report().total_bundle_bytes, 6 * 1024 * 1024);

        log.reset();
        assert_eq!(log.report().total_bundle_bytes, 0);
    }
}
