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

//! The resource pool: bounded timer and listener registries with FIFO eviction.
//!
//! The pool never runs a callback on its own. The owner drives it by calling
//! [`ResourcePool::fire_due`] from its scheduling context, which runs every due
//! callback outside the pool lock, so callbacks may freely schedule or cancel.

mod listeners;

pub use self::listeners::{ListenerEvent, ListenerHandle, ListenerHandler};

use self::listeners::ListenerEntry;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use vigil_core::config::PoolConfig;
use vigil_core::guard::run_guarded;
use vigil_core::sync::lock;
use vigil_core::Clock;

/// A scheduled callback. Errors and panics are contained by the pool.
pub type TimerCallback = Box<dyn FnMut() -> anyhow::Result<()> + Send>;

/// Whether a timer fires once or repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Fires once, then is reclaimed.
    Timeout,
    /// Fires every period until cancelled.
    Interval,
}

/// Identifies a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    id: u64,
    kind: TimerKind,
}

impl TimerHandle {
    /// The pool-unique id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The timer kind.
    pub fn kind(&self) -> TimerKind {
        self.kind
    }
}

struct TimerEntry {
    delay_ms: u64,
    created_at: u64,
    deadline: u64,
    // Taken out while the callback runs.
    callback: Option<TimerCallback>,
}

#[derive(Default)]
pub(crate) struct PoolState {
    timeouts: BTreeMap<u64, TimerEntry>,
    intervals: BTreeMap<u64, TimerEntry>,
    pub(crate) listeners: BTreeMap<u64, ListenerEntry>,
    next_id: u64,
    timer_evictions: u64,
    pub(crate) listener_evictions: u64,
}

impl PoolState {
    pub(crate) fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn timers_mut(&mut self, kind: TimerKind) -> &mut BTreeMap<u64, TimerEntry> {
        match kind {
            TimerKind::Timeout => &mut self.timeouts,
            TimerKind::Interval => &mut self.intervals,
        }
    }
}

/// A point-in-time view of the pool's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct PoolStats {
    /// Live one-shot timers.
    pub timeouts: usize,
    /// Live repeating timers.
    pub intervals: usize,
    /// Live listeners.
    pub listeners: usize,
    /// Cap on one-shot timers.
    pub max_timeouts: usize,
    /// Cap on repeating timers.
    pub max_intervals: usize,
    /// Cap on listeners.
    pub max_listeners: usize,
    /// Timers evicted over the pool's lifetime.
    pub timer_evictions: u64,
    /// Listeners evicted over the pool's lifetime.
    pub listener_evictions: u64,
}

/// Removes the oldest half (at least one) of `map` when it is at `cap`.
///
/// Ids grow monotonically, so the first keys are the oldest entries.
pub(crate) fn evict_oldest_half<V>(map: &mut BTreeMap<u64, V>, cap: usize) -> usize {
    if map.len() < cap {
        return 0;
    }
    let count = (map.len() / 2).max(1);
    let oldest: Vec<u64> = map.keys().take(count).copied().collect();
    for id in &oldest {
        map.remove(id);
    }
    count
}

/// Bounded registry of timers and listeners.
///
/// Invariants held after every call: live timeouts never exceed
/// `max_timeouts`, live intervals never exceed `max_intervals`, live listeners
/// never exceed `max_listeners`.
pub struct ResourcePool {
    config: PoolConfig,
    clock: Arc<dyn Clock>,
    pub(crate) state: Mutex<PoolState>,
}

impl ResourcePool {
    /// Creates an empty pool.
    pub fn new(config: PoolConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Schedules `callback` to run once after `delay_ms`, clamped to the maximum delay.
    pub fn schedule_timeout<F>(&self, callback: F, delay_ms: u64) -> TimerHandle
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let delay = delay_ms.min(self.config.max_timeout_delay_ms);
        if delay != delay_ms {
            log::debug!("Timeout delay {delay_ms}ms clamped to {delay}ms.");
        }
        self.insert_timer(TimerKind::Timeout, Box::new(callback), delay)
    }

    /// Schedules `callback` to run every `period_ms`, floored to the minimum period.
    pub fn schedule_interval<F>(&self, callback: F, period_ms: u64) -> TimerHandle
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        let period = period_ms.max(self.config.min_interval_ms);
        if period != period_ms {
            log::debug!("Interval period {period_ms}ms raised to {period}ms.");
        }
        self.insert_timer(TimerKind::Interval, Box::new(callback), period)
    }

    fn insert_timer(&self, kind: TimerKind, callback: TimerCallback, delay_ms: u64) -> TimerHandle {
        let now = self.now_ms();
        let cap = match kind {
            TimerKind::Timeout => self.config.max_timeouts,
            TimerKind::Interval => self.config.max_intervals,
        };

        let mut state = lock(&self.state);
        let evicted = evict_oldest_half(state.timers_mut(kind), cap);
        if evicted > 0 {
            state.timer_evictions += evicted as u64;
            log::warn!("Timer pool full ({cap} {kind:?}s), evicted {evicted} oldest.");
        }

        let id = state.allocate_id();
        state.timers_mut(kind).insert(
            id,
            TimerEntry {
                delay_ms,
                created_at: now,
                deadline: now.saturating_add(delay_ms),
                callback: Some(callback),
            },
        );
        TimerHandle { id, kind }
    }

    /// Cancels a timer. Cancelling an unknown, fired, or already cancelled
    /// handle is a no-op that returns `false`.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        lock(&self.state)
            .timers_mut(handle.kind)
            .remove(&handle.id)
            .is_some()
    }

    /// Returns `true` if the timer is still tracked.
    pub fn is_scheduled(&self, handle: TimerHandle) -> bool {
        lock(&self.state).timers_mut(handle.kind).contains_key(&handle.id)
    }

    /// Cancels every tracked timer and returns how many were dropped.
    pub fn cleanup_all(&self) -> usize {
        let mut state = lock(&self.state);
        let dropped = state.timeouts.len() + state.intervals.len();
        state.timeouts.clear();
        state.intervals.clear();
        if dropped > 0 {
            log::info!("Resource pool flushed {dropped} timers.");
        }
        dropped
    }

    /// Runs every timer whose deadline has passed, in deadline order.
    ///
    /// One-shot timers are reclaimed whether or not their callback succeeds.
    /// Repeating timers are rescheduled one period after now, unless they were
    /// cancelled while their callback ran. Returns the number of callbacks run.
    pub fn fire_due(&self) -> usize {
        let now = self.now_ms();
        let mut due: Vec<(u64, u64, TimerKind, TimerCallback)> = Vec::new();
        {
            let mut state = lock(&self.state);
            for kind in [TimerKind::Timeout, TimerKind::Interval] {
                for (&id, entry) in state.timers_mut(kind).iter_mut() {
                    if entry.deadline <= now {
                        if let Some(callback) = entry.callback.take() {
                            due.push((entry.deadline, id, kind, callback));
                        }
                    }
                }
            }
        }
        due.sort_by_key(|(deadline, id, _, _)| (*deadline, *id));

        let fired = due.len();
        for (_, id, kind, mut callback) in due {
            run_guarded("timer callback", || callback());

            let mut state = lock(&self.state);
            match kind {
                TimerKind::Timeout => {
                    state.timeouts.remove(&id);
                }
                TimerKind::Interval => {
                    if let Some(entry) = state.intervals.get_mut(&id) {
                        entry.deadline = now.saturating_add(entry.delay_ms);
                        entry.callback = Some(callback);
                    }
                }
            }
        }

        if fired > 0 {
            log::trace!("Fired {fired} timers.");
        }
        fired
    }

    /// Returns the earliest pending deadline, if any timer is waiting.
    pub fn next_deadline(&self) -> Option<u64> {
        let state = lock(&self.state);
        state
            .timeouts
            .values()
            .chain(state.intervals.values())
            .filter(|e| e.callback.is_some())
            .map(|e| e.deadline)
            .min()
    }

    /// Returns the age in milliseconds of the oldest live timer.
    pub fn oldest_timer_age_ms(&self) -> Option<u64> {
        let now = self.now_ms();
        let state = lock(&self.state);
        state
            .timeouts
            .values()
            .chain(state.intervals.values())
            .map(|e| now.saturating_sub(e.created_at))
            .max()
    }

    /// Returns the current occupancy.
    pub fn stats(&self) -> PoolStats {
        let state = lock(&self.state);
        PoolStats {
            timeouts: state.timeouts.len(),
            intervals: state.intervals.len(),
            listeners: state.listeners.len(),
            max_timeouts: self.config.max_timeouts,
            max_intervals: self.config.max_intervals,
            max_listeners: self.config.max_listeners,
            timer_evictions: state.timer_evictions,
            listener_evictions: state.listener_evictions,
        }
    }
}

impl std::fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vigil_core::testing::FakeClock;

    fn pool_with(config: PoolConfig) -> (Arc<ResourcePool>, FakeClock) {
        let clock = FakeClock::default();
        let pool = Arc::new(ResourcePool::new(config, Arc::new(clock.clone())));
        (pool, clock)
    }

    fn pool() -> (Arc<ResourcePool>, FakeClock) {
        pool_with(PoolConfig::default())
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> anyhow::Result<()> + Send + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        (hits, move || {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn caps_hold_after_every_schedule() {
        let (pool, _) = pool();
        for i in 0..500u64 {
            if i % 3 == 0 {
                pool.schedule_interval(|| Ok(()), 2_000);
            } else {
                pool.schedule_timeout(|| Ok(()), 1_000);
            }
            let stats = pool.stats();
            assert!(stats.timeouts <= stats.max_timeouts);
            assert!(stats.intervals <= stats.max_intervals);
        }
    }

    #[test]
    fn full_pool_evicts_oldest_half() {
        let (pool, _) = pool_with(PoolConfig {
            max_timeouts: 4,
            ..Default::default()
        });
        let handles: Vec<_> = (0..4).map(|_| pool.schedule_timeout(|| Ok(()), 10)).collect();
        let newest = pool.schedule_timeout(|| Ok(()), 10);

        assert!(!pool.is_scheduled(handles[0]));
        assert!(!pool.is_scheduled(handles[1]));
        assert!(pool.is_scheduled(handles[2]));
        assert!(pool.is_scheduled(handles[3]));
        assert!(pool.is_scheduled(newest));
        assert_eq!(pool.stats().timer_evictions, 2);
    }

    #[test]
    fn cap_of_one_still_evicts() {
        let (pool, _) = pool_with(PoolConfig {
            max_intervals: 1,
            ..Default::default()
        });
        let first = pool.schedule_interval(|| Ok(()), 1_000);
        let second = pool.schedule_interval(|| Ok(()), 1_000);
        assert!(!pool.is_scheduled(first));
        assert!(pool.is_scheduled(second));
        assert_eq!(pool.stats().intervals, 1);
    }

    #[test]
    fn cancel_twice_is_a_no_op() {
        let (pool, _) = pool();
        let keep = pool.schedule_timeout(|| Ok(()), 100);
        let handle = pool.schedule_timeout(|| Ok(()), 100);

        assert!(pool.cancel(handle));
        let after_first = pool.stats();
        assert!(!pool.cancel(handle));
        assert_eq!(pool.stats(), after_first);
        assert!(pool.is_scheduled(keep));
    }

    #[test]
    fn interval_period_is_floored() {
        let (pool, clock) = pool();
        let (hits, callback) = counter();
        pool.schedule_interval(callback, 10);

        clock.advance(999);
        assert_eq!(pool.fire_due(), 0);
        clock.advance(1);
        assert_eq!(pool.fire_due(), 1);
        clock.advance(10);
        assert_eq!(pool.fire_due(), 0);
        clock.advance(990);
        pool.fire_due();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn timeout_delay_is_clamped() {
        let (pool, clock) = pool();
        let (hits, callback) = counter();
        pool.schedule_timeout(callback, 10_000_000);

        clock.advance(300_000);
        pool.fire_due();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn timeout_fires_once_and_is_reclaimed() {
        let (pool, clock) = pool();
        let (hits, callback) = counter();
        let handle = pool.schedule_timeout(callback, 50);

        clock.advance(50);
        assert_eq!(pool.fire_due(), 1);
        clock.advance(50);
        assert_eq!(pool.fire_due(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!pool.is_scheduled(handle));
        assert!(!pool.cancel(handle));
    }

    #[test]
    fn failing_callbacks_are_still_reclaimed() {
        let (pool, clock) = pool();
        let failing = pool.schedule_timeout(|| Err(anyhow::anyhow!("boom")), 10);
        let panicking = pool.schedule_timeout(|| panic!("kaboom"), 10);
        let (hits, callback) = counter();
        pool.schedule_timeout(callback, 10);

        clock.advance(10);
        assert_eq!(pool.fire_due(), 3);
        assert!(!pool.is_scheduled(failing));
        assert!(!pool.is_scheduled(panicking));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().timeouts, 0);
    }

    #[test]
    fn failing_interval_keeps_running() {
        let (pool, clock) = pool();
        let handle = pool.schedule_interval(|| Err(anyhow::anyhow!("flaky")), 1_000);
        clock.advance(1_000);
        pool.fire_due();
        assert!(pool.is_scheduled(handle));
        assert_eq!(pool.next_deadline(), Some(clock.now_ms() + 1_000));
    }

    #[test]
    fn callback_may_schedule_and_cancel() {
        let (pool, clock) = pool();
        let inner = Arc::clone(&pool);
        let slot: Arc<Mutex<Option<TimerHandle>>> = Arc::new(Mutex::new(None));
        let own = Arc::clone(&slot);
        let handle = pool.schedule_interval(
            move || {
                inner.schedule_timeout(|| Ok(()), 10);
                if let Some(me) = *own.lock().unwrap() {
                    inner.cancel(me);
                }
                Ok(())
            },
            1_000,
        );
        *slot.lock().unwrap() = Some(handle);

        clock.advance(1_000);
        assert_eq!(pool.fire_due(), 1);
        assert!(!pool.is_scheduled(handle));
        assert_eq!(pool.stats().timeouts, 1);
    }

    #[test]
    fn cleanup_all_drops_every_timer() {
        let (pool, clock) = pool();
        let (hits, callback) = counter();
        pool.schedule_timeout(callback, 10);
        pool.schedule_interval(|| Ok(()), 1_000);

        assert_eq!(pool.cleanup_all(), 2);
        clock.advance(5_000);
        assert_eq!(pool.fire_due(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn due_timers_fire_in_deadline_order() {
        let (pool, clock) = pool();
        let order = Arc::new(Mutex::new(Vec::new()));
        for (label, delay) in [("late", 30u64), ("early", 10), ("middle", 20)] {
            let sink = Arc::clone(&order);
            pool.schedule_timeout(
                move || {
                    sink.lock().unwrap().push(label);
                    Ok(())
                },
                delay,
            );
        }
        clock.advance(30);
        pool.fire_due();
        assert_eq!(*order.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn huge_periods_saturate_the_deadline() {
        let (pool, clock) = pool();
        clock.advance(1);
        let (hits, callback) = counter();
        let handle = pool.schedule_interval(callback, u64::MAX);

        assert!(pool.is_scheduled(handle));
        assert_eq!(pool.fire_due(), 0);
        assert_eq!(pool.next_deadline(), Some(u64::MAX));

        clock.set(u64::MAX);
        assert_eq!(pool.fire_due(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(pool.is_scheduled(handle));
        assert_eq!(pool.next_deadline(), Some(u64::MAX));
    }

    #[test]
    fn oldest_timer_age_tracks_creation() {
        let (pool, clock) = pool();
        assert_eq!(pool.oldest_timer_age_ms(), None);
        pool.schedule_interval(|| Ok(()), 5_000);
        clock.advance(1_500);
        assert_eq!(pool.oldest_timer_age_ms(), Some(1_500));
    }
}
