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

//! The session watchdog.
//!
//! A session is a long-running unit of user-facing work (a lesson view, a chat
//! turn). The monitor tracks activity per session and raises freeze, runaway
//! and growth events. It also runs the host heartbeat, which detects stalls of
//! the whole driving thread rather than of one session.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use vigil_core::config::MonitorConfig;
use vigil_core::sync::lock;
use vigil_core::{Clock, EventBus, GovernorEvent, PressureSeverity, SubscriptionId};
use vigil_data::ResourcePool;
use vigil_telemetry::{MemorySample, MemorySampler};

/// Per-session bookkeeping, mutated only by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionMetrics {
    /// Unique session id.
    pub session_id: String,
    /// Registration time.
    pub started_at: u64,
    /// Time of the last tracked activity or recovery.
    pub last_activity_at: u64,
    /// Activity since registration or the last counter reset.
    pub activity_count: u64,
    /// Heap usage at registration, 0 when unknown.
    pub memory_baseline_bytes: u64,
    /// Whether the session is being watched.
    pub active: bool,
    /// A throttle request was sent since the last counter reset.
    pub throttle_notified: bool,
    /// A growth pressure event was sent and growth has not receded since.
    pub growth_notified: bool,
}

impl SessionMetrics {
    fn new(session_id: String, now: u64, baseline: u64) -> Self {
        Self {
            session_id,
            started_at: now,
            last_activity_at: now,
            activity_count: 0,
            memory_baseline_bytes: baseline,
            active: true,
            throttle_notified: false,
            growth_notified: false,
        }
    }

    fn reset_counters(&mut self, now: u64) {
        self.activity_count = 0;
        self.last_activity_at = now;
        self.throttle_notified = false;
    }
}

/// What a session amounted to, returned when it is unregistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// The unregistered session.
    pub session_id: String,
    /// Time between registration and unregistration.
    pub duration_ms: u64,
    /// Activity since registration or the last counter reset.
    pub activity_count: u64,
    /// Heap growth over the baseline, floored at zero.
    pub memory_growth_bytes: u64,
}

/// Watches registered sessions and the host heartbeat.
pub struct SessionMonitor {
    config: MonitorConfig,
    clock: Arc<dyn Clock>,
    pool: Arc<ResourcePool>,
    sampler: Arc<MemorySampler>,
    bus: Arc<EventBus>,
    sessions: Mutex<HashMap<String, SessionMetrics>>,
    last_beat: Mutex<Option<u64>>,
    pressure_subscription: Mutex<Option<SubscriptionId>>,
}

impl SessionMonitor {
    /// Creates a monitor and subscribes it to sampler pressure.
    ///
    /// The subscription holds the monitor weakly; dropping the last `Arc` or
    /// calling [`shutdown`](Self::shutdown) ends it.
    pub fn new(
        config: MonitorConfig,
        clock: Arc<dyn Clock>,
        pool: Arc<ResourcePool>,
        sampler: Arc<MemorySampler>,
        bus: Arc<EventBus>,
    ) -> Arc<Self> {
        let monitor = Arc::new(Self {
            config,
            clock,
            pool,
            sampler: Arc::clone(&sampler),
            bus,
            sessions: Mutex::new(HashMap::new()),
            last_beat: Mutex::new(None),
            pressure_subscription: Mutex::new(None),
        });

        let weak: Weak<SessionMonitor> = Arc::downgrade(&monitor);
        let id = sampler.on_pressure(move |sample| {
            if let Some(monitor) = weak.upgrade() {
                monitor.handle_pressure(sample);
            }
            Ok(())
        });
        *lock(&monitor.pressure_subscription) = Some(id);
        monitor
    }

    /// Returns the monitor configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Starts watching `session_id`. Re-registering an id replaces it.
    pub fn register(&self, session_id: &str) {
        let now = self.clock.now_ms();
        let baseline = self.sampler.sample().map_or(0, |s| s.used_bytes);
        if self.sampler.is_critical() {
            log::warn!("Memory critical while registering '{session_id}', reclaiming first.");
            self.sampler.force_reclaim();
        }

        let metrics = SessionMetrics::new(session_id.to_owned(), now, baseline);
        if lock(&self.sessions)
            .insert(session_id.to_owned(), metrics)
            .is_some()
        {
            log::warn!("Session '{session_id}' was already registered; replacing it.");
        } else {
            log::debug!("Session '{session_id}' registered (baseline {baseline} bytes).");
        }
    }

    /// Records one unit of activity for `session_id`, then checks it.
    ///
    /// Unknown ids are ignored.
    pub fn track_activity(&self, session_id: &str) {
        let now = self.clock.now_ms();
        {
            let mut sessions = lock(&self.sessions);
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            session.activity_count += 1;
            session.last_activity_at = now;
        }
        self.check_session(session_id);
    }

    /// Runs the freeze, runaway and growth checks for one session, emitting
    /// events in that order. Unknown ids are ignored.
    pub fn check_session(&self, session_id: &str) {
        let now = self.clock.now_ms();

        let idle_ms = {
            let sessions = lock(&self.sessions);
            let Some(session) = sessions.get(session_id) else {
                return;
            };
            let idle = now.saturating_sub(session.last_activity_at);
            (session.active && idle > self.config.freeze_threshold_ms).then_some(idle)
        };
        if let Some(idle_ms) = idle_ms {
            self.recover_frozen(session_id, idle_ms, now);
        }

        self.check_runaway(session_id, now);
        self.check_growth(session_id, now);
    }

    fn recover_frozen(&self, session_id: &str, idle_ms: u64, now: u64) {
        log::warn!("Session '{session_id}' idle for {idle_ms}ms, attempting recovery.");
        self.bus.publish(GovernorEvent::FreezeDetected {
            session_id: session_id.to_owned(),
            idle_ms,
            timestamp: now,
        });

        self.pool.cleanup_all();
        self.sampler.force_reclaim();
        if let Some(session) = lock(&self.sessions).get_mut(session_id) {
            session.reset_counters(now);
        }

        self.bus.publish(GovernorEvent::RecoveryAttempted {
            session_id: session_id.to_owned(),
            timestamp: now,
        });
    }

    fn check_runaway(&self, session_id: &str, now: u64) {
        let activity_count = {
            let mut sessions = lock(&self.sessions);
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            let in_window =
                now.saturating_sub(session.started_at) <= self.config.short_window_ms;
            if !in_window || session.throttle_notified {
                return;
            }
            if session.activity_count <= self.config.render_cap {
                return;
            }
            session.throttle_notified = true;
            session.activity_count
        };

        log::warn!("Session '{session_id}' is running away ({activity_count} activities).");
        self.bus.publish(GovernorEvent::ThrottleRequested {
            session_id: session_id.to_owned(),
            activity_count,
            timestamp: now,
        });
    }

    fn check_growth(&self, session_id: &str, now: u64) {
        let Some(sample) = self.sampler.sample() else {
            return;
        };
        let growth = {
            let mut sessions = lock(&self.sessions);
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };
            let growth = sample
                .used_bytes
                .saturating_sub(session.memory_baseline_bytes);
            if growth <= self.config.growth_cap_bytes {
                session.growth_notified = false;
                return;
            }
            if session.growth_notified {
                return;
            }
            session.growth_notified = true;
            growth
        };

        log::warn!("Session '{session_id}' grew {growth} bytes over its baseline, reclaiming.");
        self.sampler.force_reclaim();
        self.pool.cleanup_all();
        self.bus.publish(GovernorEvent::MemoryPressure {
            session_id: session_id.to_owned(),
            severity: PressureSeverity::Elevated,
            growth_bytes: Some(growth),
            timestamp: now,
        });
    }

    /// Stops watching `session_id` and reclaims memory.
    ///
    /// Returns `None` for unknown or already unregistered ids.
    pub fn unregister(&self, session_id: &str) -> Option<SessionSummary> {
        let session = lock(&self.sessions).remove(session_id)?;
        let now = self.clock.now_ms();
        let used_now = self
            .sampler
            .sample()
            .map_or(session.memory_baseline_bytes, |s| s.used_bytes);

        let summary = SessionSummary {
            session_id: session.session_id,
            duration_ms: now.saturating_sub(session.started_at),
            activity_count: session.activity_count,
            memory_growth_bytes: used_now.saturating_sub(session.memory_baseline_bytes),
        };
        log::info!(
            "Session '{}' ended after {}ms ({} activities, +{} bytes).",
            summary.session_id,
            summary.duration_ms,
            summary.activity_count,
            summary.memory_growth_bytes
        );

        self.sampler.force_reclaim();
        Some(summary)
    }

    /// Beats the host heartbeat. A gap above the stall threshold since the
    /// previous beat triggers a global recovery.
    ///
    /// Returns the measured stall, if one was detected.
    pub fn heartbeat(&self) -> Option<u64> {
        let now = self.clock.now_ms();
        let previous = lock(&self.last_beat).replace(now)?;
        let gap = now.saturating_sub(previous);
        if gap <= self.config.stall_threshold_ms {
            return None;
        }

        log::warn!("Host stalled for {gap}ms, running global recovery.");
        let session_ids: Vec<String> = {
            let mut sessions = lock(&self.sessions);
            let mut ids = Vec::with_capacity(sessions.len());
            for session in sessions.values_mut() {
                session.reset_counters(now);
                ids.push(session.session_id.clone());
            }
            ids.sort();
            ids
        };
        self.pool.cleanup_all();
        self.sampler.force_reclaim();

        self.bus.publish(GovernorEvent::UiFreezeRecovery {
            session_ids,
            stall_ms: gap,
            timestamp: now,
        });
        Some(gap)
    }

    fn handle_pressure(&self, sample: &MemorySample) {
        let now = self.clock.now_ms();
        let targets: Vec<(String, u64)> = {
            let sessions = lock(&self.sessions);
            let mut targets: Vec<_> = sessions
                .values()
                .filter(|s| s.active)
                .map(|s| {
                    let growth = sample.used_bytes.saturating_sub(s.memory_baseline_bytes);
                    (s.session_id.clone(), growth)
                })
                .collect();
            targets.sort();
            targets
        };

        for (session_id, growth) in targets {
            self.bus.publish(GovernorEvent::MemoryPressure {
                session_id,
                severity: PressureSeverity::High,
                growth_bytes: Some(growth),
                timestamp: now,
            });
        }
        self.sampler.force_reclaim();
    }

    /// Snapshot of every watched session, ordered by id.
    pub fn sessions(&self) -> Vec<SessionMetrics> {
        let mut sessions: Vec<_> = lock(&self.sessions).values().cloned().collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        sessions
    }

    /// Snapshot of one session.
    pub fn session(&self, session_id: &str) -> Option<SessionMetrics> {
        lock(&self.sessions).get(session_id).cloned()
    }

    /// Number of watched sessions.
    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Forgets every session and detaches from sampler pressure.
    pub fn shutdown(&self) {
        let dropped = {
            let mut sessions = lock(&self.sessions);
            let dropped = sessions.len();
            sessions.clear();
            dropped
        };
        if let Some(id) = lock(&self.pressure_subscription).take() {
            self.sampler.remove_pressure_callback(id);
        }
        *lock(&self.last_beat) = None;
        log::info!("Session monitor shut down ({dropped} sessions dropped).");
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        if let Some(id) = lock(&self.pressure_subscription).take() {
            self.sampler.remove_pressure_callback(id);
        }
    }
}

impl std::fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("config", &self.config)
            .field("sessions", &self.session_count())
            .finish()
    }
}
