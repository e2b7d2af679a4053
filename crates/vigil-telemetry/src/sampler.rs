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

//! Heap sampling, pressure notification and leak history.

use crate::history::RollingWindow;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use vigil_core::config::SamplerConfig;
use vigil_core::guard::run_guarded;
use vigil_core::sync::lock;
use vigil_core::{Clock, HistoryStore, PlatformProbe, SubscriptionId};

/// Minimum number of history points before a leak trend is reported.
const MIN_TREND_SAMPLES: usize = 3;

/// One reading of the host heap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySample {
    /// When the reading was taken, in clock milliseconds.
    pub timestamp: u64,
    /// Bytes currently in use.
    pub used_bytes: u64,
    /// Bytes currently reserved by the host.
    pub total_bytes: u64,
    /// Hard limit the host will allow.
    pub limit_bytes: u64,
    /// `used_bytes / limit_bytes`.
    pub usage_ratio: f64,
}

/// Notified with the sample that pushed usage into the critical band.
pub type PressureCallback = Arc<dyn Fn(&MemorySample) -> anyhow::Result<()> + Send + Sync>;

/// Samples the platform heap and keeps a rolling usage-ratio history.
///
/// Threshold queries read the latest cached sample and return `false` when no
/// sample is known. Pressure callbacks fire from [`poll`](Self::poll) only,
/// once per transition into the critical band.
pub struct MemorySampler {
    config: SamplerConfig,
    probe: Arc<dyn PlatformProbe>,
    clock: Arc<dyn Clock>,
    store: Arc<dyn HistoryStore>,
    latest: Mutex<Option<MemorySample>>,
    history: Mutex<RollingWindow>,
    callbacks: Mutex<Vec<(SubscriptionId, PressureCallback)>>,
    in_critical: AtomicBool,
    next_id: AtomicU64,
}

impl MemorySampler {
    /// Creates a sampler, restoring the leak history from `store`.
    ///
    /// A store that fails to load degrades to an empty history.
    pub fn new(
        config: SamplerConfig,
        probe: Arc<dyn PlatformProbe>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        let restored = match store.load() {
            Ok(ratios) => ratios,
            Err(e) => {
                log::warn!("Could not restore memory history, starting empty: {e}");
                Vec::new()
            }
        };
        let history = RollingWindow::from_slice(&restored, config.history_capacity);
        if !history.is_empty() {
            log::debug!("Restored {} memory history samples.", history.len());
        }
        if !probe.capabilities().heap {
            log::info!("Platform has no heap introspection; memory checks are disabled.");
        }

        Self {
            config,
            probe,
            clock,
            store,
            latest: Mutex::new(None),
            history: Mutex::new(history),
            callbacks: Mutex::new(Vec::new()),
            in_critical: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    /// Returns the sampler configuration.
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Reads the heap and caches the result as the latest sample.
    ///
    /// Returns `None` when the platform cannot report its heap.
    pub fn sample(&self) -> Option<MemorySample> {
        let sample = self.probe.heap_stats().and_then(|stats| {
            if stats.limit_bytes == 0 {
                return None;
            }
            Some(MemorySample {
                timestamp: self.clock.now_ms(),
                used_bytes: stats.used_bytes,
                total_bytes: stats.total_bytes,
                limit_bytes: stats.limit_bytes,
                usage_ratio: stats.used_bytes as f64 / stats.limit_bytes as f64,
            })
        });
        *lock(&self.latest) = sample;
        sample
    }

    /// The most recent cached sample, without touching the probe.
    pub fn latest(&self) -> Option<MemorySample> {
        *lock(&self.latest)
    }

    /// `true` if the latest sample is at or above the warning ratio.
    pub fn is_high(&self) -> bool {
        self.latest()
            .is_some_and(|s| s.usage_ratio >= self.config.warning_ratio)
    }

    /// `true` if the latest sample is at or above the critical ratio.
    pub fn is_critical(&self) -> bool {
        self.latest()
            .is_some_and(|s| s.usage_ratio >= self.config.critical_ratio)
    }

    /// Registers a callback fired when usage enters the critical band.
    pub fn on_pressure<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&MemorySample) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.callbacks).push((id, Arc::new(callback)));
        id
    }

    /// Removes a pressure callback. Unknown ids return `false`.
    pub fn remove_pressure_callback(&self, id: SubscriptionId) -> bool {
        let mut callbacks = lock(&self.callbacks);
        let before = callbacks.len();
        callbacks.retain(|(sub, _)| *sub != id);
        callbacks.len() != before
    }

    /// Number of registered pressure callbacks.
    pub fn pressure_callback_count(&self) -> usize {
        lock(&self.callbacks).len()
    }

    /// Samples, records the ratio into the leak history and notifies pressure
    /// callbacks if usage just crossed into the critical band.
    pub fn poll(&self) -> Option<MemorySample> {
        let Some(sample) = self.sample() else {
            self.in_critical.store(false, Ordering::Relaxed);
            return None;
        };

        let snapshot = {
            let mut history = lock(&self.history);
            history.push(sample.usage_ratio);
            history.to_vec()
        };
        if let Err(e) = self.store.save(&snapshot) {
            log::warn!("Could not persist memory history: {e}");
        }

        let critical = sample.usage_ratio >= self.config.critical_ratio;
        let was_critical = self.in_critical.swap(critical, Ordering::Relaxed);
        if critical && !was_critical {
            log::warn!(
                "Memory usage critical: {:.1}% of limit.",
                sample.usage_ratio * 100.0
            );
            self.notify_pressure(&sample);
        }
        Some(sample)
    }

    fn notify_pressure(&self, sample: &MemorySample) {
        let callbacks: Vec<PressureCallback> = lock(&self.callbacks)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            run_guarded("pressure callback", || callback(sample));
        }
    }

    /// Asks the platform to reclaim memory and drops the cached sample.
    ///
    /// Returns whether the platform supports reclamation.
    pub fn force_reclaim(&self) -> bool {
        let supported = self.probe.request_reclaim();
        *lock(&self.latest) = None;
        if supported {
            log::debug!("Requested memory reclamation.");
        }
        supported
    }

    /// The leak history, oldest first.
    pub fn history(&self) -> Vec<f64> {
        lock(&self.history).to_vec()
    }

    /// Relative growth of the newest half of the history over the oldest half.
    ///
    /// `None` with fewer than three samples.
    pub fn leak_trend(&self) -> Option<f64> {
        lock(&self.history).relative_trend(MIN_TREND_SAMPLES)
    }
}

impl std::fmt::Debug for MemorySampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySampler")
            .field("config", &self.config)
            .field("latest", &self.latest())
            .field("history_len", &lock(&self.history).len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistory;
    use std::sync::atomic::AtomicUsize;
    use vigil_core::testing::{FakeClock, ScriptedProbe};
    use vigil_core::HistoryError;

    const MIB: u64 = 1024 * 1024;

    fn sampler_with(probe: &ScriptedProbe, store: Arc<dyn HistoryStore>) -> MemorySampler {
        MemorySampler::new(
            SamplerConfig::default(),
            Arc::new(probe.clone()),
            Arc::new(FakeClock::default()),
            store,
        )
    }

    fn sampler(probe: &ScriptedProbe) -> MemorySampler {
        sampler_with(probe, Arc::new(InMemoryHistory::new()))
    }

    #[derive(Debug)]
    struct BrokenStore;

    impl HistoryStore for BrokenStore {
        fn load(&self) -> Result<Vec<f64>, HistoryError> {
            Err(HistoryError::Unavailable("disk gone".into()))
        }
        fn save(&self, _ratios: &[f64]) -> Result<(), HistoryError> {
            Err(HistoryError::Unavailable("disk gone".into()))
        }
    }

    #[test]
    fn sample_computes_ratio_against_limit() {
        let probe = ScriptedProbe::with_heap(50 * MIB, 200 * MIB);
        let sample = sampler(&probe).sample().unwrap();
        assert_eq!(sample.used_bytes, 50 * MIB);
        assert!((sample.usage_ratio - 0.25).abs() < 1e-9);
    }

    #[test]
    fn unknown_heap_means_no_pressure() {
        let probe = ScriptedProbe::new();
        let sampler = sampler(&probe);
        assert!(sampler.sample().is_none());
        assert!(!sampler.is_high());
        assert!(!sampler.is_critical());
        assert!(sampler.poll().is_none());
        assert!(sampler.history().is_empty());
    }

    #[test]
    fn thresholds_are_inclusive() {
        let probe = ScriptedProbe::with_heap(75, 100);
        let sampler = sampler(&probe);
        sampler.sample();
        assert!(sampler.is_high());
        assert!(!sampler.is_critical());

        probe.set_used(90);
        sampler.sample();
        assert!(sampler.is_critical());
    }

    #[test]
    fn pressure_fires_once_per_transition() {
        let probe = ScriptedProbe::with_heap(50, 100);
        let sampler = sampler(&probe);
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        sampler.on_pressure(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        sampler.poll();
        probe.set_used(95);
        sampler.poll();
        sampler.poll();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        probe.set_used(40);
        sampler.poll();
        probe.set_used(92);
        sampler.poll();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failing_callback_does_not_starve_others() {
        let probe = ScriptedProbe::with_heap(99, 100);
        let sampler = sampler(&probe);
        let hits = Arc::new(AtomicUsize::new(0));
        sampler.on_pressure(|_| Err(anyhow::anyhow!("nope")));
        sampler.on_pressure(|_| panic!("worse"));
        let sink = Arc::clone(&hits);
        sampler.on_pressure(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        sampler.poll();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_callback_stays_silent() {
        let probe = ScriptedProbe::with_heap(99, 100);
        let sampler = sampler(&probe);
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        let id = sampler.on_pressure(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(sampler.remove_pressure_callback(id));
        assert!(!sampler.remove_pressure_callback(id));
        sampler.poll();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn force_reclaim_drops_cached_sample() {
        let probe = ScriptedProbe::with_heap(95, 100);
        let sampler = sampler(&probe);
        sampler.sample();
        assert!(sampler.is_critical());

        assert!(!sampler.force_reclaim());
        assert!(sampler.latest().is_none());
        assert!(!sampler.is_critical());

        probe.support_reclaim(Some(10));
        assert!(sampler.force_reclaim());
        assert_eq!(probe.reclaim_calls(), 2);
    }

    #[test]
    fn history_is_bounded_and_persisted() {
        let probe = ScriptedProbe::with_heap(10, 100);
        let store = Arc::new(InMemoryHistory::new());
        let sampler = sampler_with(&probe, store.clone());
        for used in 10..40 {
            probe.set_used(used);
            sampler.poll();
        }
        assert_eq!(sampler.history().len(), 20);
        assert_eq!(store.load().unwrap(), sampler.history());
    }

    #[test]
    fn history_is_restored_from_store() {
        let probe = ScriptedProbe::with_heap(10, 100);
        let store = Arc::new(InMemoryHistory::seeded(vec![0.2, 0.2, 0.3, 0.3]));
        let sampler = sampler_with(&probe, store);
        assert_eq!(sampler.history().len(), 4);
        let trend = sampler.leak_trend().unwrap();
        assert!((trend - 0.5).abs() < 1e-9);
    }

    #[test]
    fn broken_store_degrades_to_empty_history() {
        let probe = ScriptedProbe::with_heap(30, 100);
        let sampler = sampler_with(&probe, Arc::new(BrokenStore));
        assert!(sampler.history().is_empty());
        assert!(sampler.poll().is_some());
        assert_eq!(sampler.history().len(), 1);
    }

    #[test]
    fn leak_trend_requires_three_samples() {
        let probe = ScriptedProbe::with_heap(30, 100);
        let sampler = sampler(&probe);
        sampler.poll();
        sampler.poll();
        assert_eq!(sampler.leak_trend(), None);
        sampler.poll();
        assert_eq!(sampler.leak_trend(), Some(0.0));
    }
}
