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

//! The governor: one object owning every component and the cadence table.

use crate::schedule::Cadence;
use std::any::Any;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use vigil_control::{DiagnosticsAggregator, SessionMetrics, SessionMonitor, SessionSummary};
use vigil_core::sync::lock;
use vigil_core::{
    Clock, ConfigError, EventBus, EventKind, GovernorConfig, GovernorEvent, HealthReport,
    HistoryStore, PlatformProbe, SubscriptionId,
};
use vigil_data::{ListenerEvent, ListenerHandle, PoolStats, ResourcePool, TimerHandle};
use vigil_infra::{JsonFileHistory, SysinfoProbe, SystemClock};
use vigil_telemetry::{InMemoryHistory, MemorySample, MemorySampler, PerformanceLog};

/// What one [`Governor::tick`] did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Timer callbacks run.
    pub timers_fired: usize,
    /// Whether the heartbeat beat on this tick.
    pub heartbeat: bool,
    /// Host stall detected by the heartbeat, in milliseconds.
    pub stall_ms: Option<u64>,
    /// Sample taken by the scheduled memory poll, if the poll ran and succeeded.
    pub memory: Option<MemorySample>,
    /// Report of the scheduled diagnostic sweep, if one ran.
    pub report: Option<Arc<HealthReport>>,
}

#[derive(Debug)]
struct Cadences {
    heartbeat: Cadence,
    sampling: Cadence,
    diagnostics: Cadence,
}

/// Builds a [`Governor`], defaulting to the production bindings.
#[derive(Default)]
pub struct GovernorBuilder {
    config: GovernorConfig,
    clock: Option<Arc<dyn Clock>>,
    probe: Option<Arc<dyn PlatformProbe>>,
    history: Option<Arc<dyn HistoryStore>>,
}

impl GovernorBuilder {
    /// A builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration.
    pub fn config(mut self, config: GovernorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `clock` instead of [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Uses `probe` instead of [`SysinfoProbe`].
    pub fn probe(mut self, probe: Arc<dyn PlatformProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Uses `history` instead of an in-memory leak history.
    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Persists the leak history as JSON at `path`.
    pub fn history_file(self, path: impl Into<PathBuf>) -> Self {
        self.history(Arc::new(JsonFileHistory::new(path)))
    }

    /// Validates the configuration and wires every component.
    pub fn build(self) -> Result<Governor, ConfigError> {
        self.config.validate()?;
        let config = self.config;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let probe = self.probe.unwrap_or_else(|| Arc::new(SysinfoProbe::new()));
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemoryHistory::new()));

        let bus = Arc::new(EventBus::new());
        let pool = Arc::new(ResourcePool::new(config.pool.clone(), clock.clone()));
        let sampler = Arc::new(MemorySampler::new(
            config.sampler.clone(),
            probe.clone(),
            clock.clone(),
            history,
        ));
        let performance = Arc::new(PerformanceLog::new(config.diagnostics.slow_render_ms));
        let monitor = SessionMonitor::new(
            config.monitor.clone(),
            clock.clone(),
            pool.clone(),
            sampler.clone(),
            bus.clone(),
        );
        let diagnostics = DiagnosticsAggregator::new(
            config.diagnostics.clone(),
            clock.clone(),
            probe,
            pool.clone(),
            sampler.clone(),
            performance.clone(),
            bus.clone(),
        );

        let now = clock.now_ms();
        let cadences = Cadences {
            heartbeat: Cadence::immediate(config.monitor.heartbeat_interval_ms, now),
            sampling: Cadence::immediate(config.sampler.poll_interval_ms, now),
            diagnostics: Cadence::delayed(config.diagnostics.interval_ms(), now),
        };
        log::info!(
            "Governor ready ({:?} profile, sweep every {}s).",
            config.diagnostics.profile,
            config.diagnostics.interval_ms() / 1_000
        );

        Ok(Governor {
            config,
            clock,
            bus,
            pool,
            sampler,
            performance,
            monitor,
            diagnostics,
            cadences: Mutex::new(cadences),
        })
    }
}

/// The client resource governor.
///
/// Owns the resource pool, the memory sampler, the performance log, the session
/// monitor and the diagnostics aggregator, plus the event bus they publish on.
/// Work driven by time happens in [`tick`](Self::tick), which the host calls
/// from its loop at least as often as the heartbeat interval, or hands to a
/// [`GovernorDriver`](crate::GovernorDriver).
pub struct Governor {
    config: GovernorConfig,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
    pool: Arc<ResourcePool>,
    sampler: Arc<MemorySampler>,
    performance: Arc<PerformanceLog>,
    monitor: Arc<SessionMonitor>,
    diagnostics: DiagnosticsAggregator,
    cadences: Mutex<Cadences>,
}

impl Governor {
    /// Starts a [`GovernorBuilder`].
    pub fn builder() -> GovernorBuilder {
        GovernorBuilder::new()
    }

    /// A governor with the production bindings and `config`.
    pub fn new(config: GovernorConfig) -> Result<Self, ConfigError> {
        GovernorBuilder::new().config(config).build()
    }

    /// The configuration the governor was built with.
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Current time on the governor's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // --- Sessions ---

    /// Starts watching a session. Re-registering replaces it.
    pub fn register(&self, session_id: &str) {
        self.monitor.register(session_id);
    }

    /// Records activity for a session and runs its checks.
    pub fn track_activity(&self, session_id: &str) {
        self.monitor.track_activity(session_id);
    }

    /// Runs the freeze, runaway and growth checks for a session.
    pub fn check_session(&self, session_id: &str) {
        self.monitor.check_session(session_id);
    }

    /// Stops watching a session; `None` if it was not registered.
    pub fn unregister(&self, session_id: &str) -> Option<SessionSummary> {
        self.monitor.unregister(session_id)
    }

    /// Snapshot of every watched session.
    pub fn sessions(&self) -> Vec<SessionMetrics> {
        self.monitor.sessions()
    }

    // --- Resource pool ---

    /// Schedules a one-shot callback.
    pub fn schedule_timeout<F>(&self, callback: F, delay_ms: u64) -> TimerHandle
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.pool.schedule_timeout(callback, delay_ms)
    }

    /// Schedules a repeating callback.
    pub fn schedule_interval<F>(&self, callback: F, period_ms: u64) -> TimerHandle
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.pool.schedule_interval(callback, period_ms)
    }

    /// Cancels a timer; idempotent.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        self.pool.cancel(handle)
    }

    /// Attaches a listener to `event` on `target`, held weakly.
    pub fn register_listener<T, F>(
        &self,
        target: &Arc<T>,
        event: impl Into<String>,
        handler: F,
    ) -> ListenerHandle
    where
        T: Any + Send + Sync,
        F: FnMut(&ListenerEvent) -> anyhow::Result<()> + Send + 'static,
    {
        self.pool.register_listener(target, event, handler)
    }

    /// Detaches a listener; idempotent.
    pub fn unregister_listener(&self, handle: ListenerHandle) -> bool {
        self.pool.unregister_listener(handle)
    }

    /// Delivers `event` to the listeners of `target`.
    pub fn dispatch<T>(&self, target: &Arc<T>, event: &str, payload: serde_json::Value) -> usize
    where
        T: Any + Send + Sync,
    {
        self.pool.dispatch(target, event, payload)
    }

    /// Pool occupancy.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    // --- Memory ---

    /// Registers a callback fired when memory enters the critical band.
    pub fn on_pressure<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&MemorySample) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.sampler.on_pressure(callback)
    }

    /// Removes a pressure callback; idempotent.
    pub fn remove_pressure_callback(&self, id: SubscriptionId) -> bool {
        self.sampler.remove_pressure_callback(id)
    }

    /// Takes a fresh memory sample.
    pub fn sample_memory(&self) -> Option<MemorySample> {
        self.sampler.sample()
    }

    /// Relative growth of the usage history, if enough samples exist.
    pub fn leak_trend(&self) -> Option<f64> {
        self.sampler.leak_trend()
    }

    // --- Performance ---

    /// Records one render of `component`.
    pub fn record_render(&self, component: &str, duration: std::time::Duration) {
        self.performance.record_render(component, duration);
    }

    /// Records a loaded bundle.
    pub fn record_bundle_size(&self, bytes: u64) {
        self.performance.record_bundle_size(bytes);
    }

    // --- Diagnostics ---

    /// Runs a diagnostic sweep now.
    pub fn run_full(&self) -> Arc<HealthReport> {
        self.diagnostics.run_full()
    }

    /// The last completed report.
    pub fn last_report(&self) -> Option<Arc<HealthReport>> {
        self.diagnostics.last_report()
    }

    // --- Events ---

    /// Calls `handler` for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&GovernorEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    /// Removes a subscription; idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// A bounded receiver of every event published from now on.
    pub fn event_stream(&self, capacity: usize) -> flume::Receiver<GovernorEvent> {
        self.bus.channel(capacity)
    }

    // --- Driving ---

    /// Runs everything that is due: timers, the heartbeat, the memory poll and
    /// the diagnostic sweep, in that order.
    pub fn tick(&self) -> TickReport {
        let now = self.clock.now_ms();
        let (beat, sample, sweep) = {
            let mut cadences = lock(&self.cadences);
            (
                cadences.heartbeat.poll(now),
                cadences.sampling.poll(now),
                cadences.diagnostics.poll(now),
            )
        };

        let mut report = TickReport {
            timers_fired: self.pool.fire_due(),
            heartbeat: beat,
            ..Default::default()
        };
        if beat {
            report.stall_ms = self.monitor.heartbeat();
        }
        if sample {
            report.memory = self.sampler.poll();
        }
        if sweep {
            report.report = Some(self.diagnostics.run_scheduled());
        }
        report
    }

    /// Earliest time at which [`tick`](Self::tick) has work to do.
    pub fn next_due(&self) -> u64 {
        let cadences = lock(&self.cadences);
        let mut next = cadences
            .heartbeat
            .next_due()
            .min(cadences.sampling.next_due())
            .min(cadences.diagnostics.next_due());
        if let Some(timer) = self.pool.next_deadline() {
            next = next.min(timer);
        }
        next
    }

    /// Drops every session, timer and listener.
    pub fn shutdown(&self) {
        self.monitor.shutdown();
        let timers = self.pool.cleanup_all();
        let listeners = self.pool.cleanup_listeners();
        log::info!("Governor shut down ({timers} timers, {listeners} listeners released).");
    }
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor")
            .field("pool", &self.pool)
            .field("monitor", &self.monitor)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}
