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

use super::{evict_oldest_half, ResourcePool};
use std::any::Any;
use std::sync::{Arc, Weak};
use vigil_core::guard::run_guarded;
use vigil_core::sync::lock;

/// A listener handler. Errors and panics are contained by the pool.
pub type ListenerHandler = Box<dyn FnMut(&ListenerEvent) -> anyhow::Result<()> + Send>;

/// The event delivered to listener handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerEvent {
    /// The event name the listener registered for.
    pub name: String,
    /// Arbitrary payload supplied by the dispatcher.
    pub payload: serde_json::Value,
}

/// Identifies a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    /// The pool-unique id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

pub(crate) struct ListenerEntry {
    target: Weak<dyn Any + Send + Sync>,
    address: usize,
    event: String,
    // Taken out while the handler runs.
    handler: Option<ListenerHandler>,
}

impl ListenerEntry {
    fn is_stale(&self) -> bool {
        self.target.strong_count() == 0
    }
}

fn address_of<T: ?Sized>(target: &Arc<T>) -> usize {
    Arc::as_ptr(target) as *const () as usize
}

impl ResourcePool {
    /// Attaches `handler` to `event` on `target`.
    ///
    /// The pool only holds a weak reference to the target, so a listener never
    /// keeps its target alive. Listeners whose target is gone are pruned on the
    /// next dispatch or [`prune_stale`](Self::prune_stale).
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
        let weak: Weak<dyn Any + Send + Sync> = {
            let erased: Arc<dyn Any + Send + Sync> = target.clone();
            Arc::downgrade(&erased)
        };
        let cap = self.config().max_listeners;
        let warn_threshold = self.config().listener_warn_threshold;

        let mut state = lock(&self.state);
        let evicted = evict_oldest_half(&mut state.listeners, cap);
        if evicted > 0 {
            state.listener_evictions += evicted as u64;
            log::warn!("Listener pool full ({cap}), evicted {evicted} oldest.");
        }

        let id = state.allocate_id();
        state.listeners.insert(
            id,
            ListenerEntry {
                target: weak,
                address: address_of(target),
                event: event.into(),
                handler: Some(Box::new(handler)),
            },
        );
        let live = state.listeners.len();
        if live > warn_threshold {
            log::warn!("{live} live listeners exceeds the warning threshold of {warn_threshold}.");
        }
        ListenerHandle(id)
    }

    /// Detaches a listener. Unknown or already removed handles return `false`.
    pub fn unregister_listener(&self, handle: ListenerHandle) -> bool {
        lock(&self.state).listeners.remove(&handle.0).is_some()
    }

    /// Delivers `event` to every live handler registered for it on `target`.
    ///
    /// Handlers run without the pool lock held. Returns how many handlers ran.
    pub fn dispatch<T>(&self, target: &Arc<T>, event: &str, payload: serde_json::Value) -> usize
    where
        T: Any + Send + Sync,
    {
        let address = address_of(target);
        let mut matched: Vec<(u64, ListenerHandler)> = Vec::new();
        {
            let mut state = lock(&self.state);
            prune_locked(&mut state.listeners);
            for (&id, entry) in state.listeners.iter_mut() {
                if entry.address == address && entry.event == event {
                    if let Some(handler) = entry.handler.take() {
                        matched.push((id, handler));
                    }
                }
            }
        }

        let delivered = ListenerEvent {
            name: event.to_owned(),
            payload,
        };
        let count = matched.len();
        for (id, mut handler) in matched {
            run_guarded("listener handler", || handler(&delivered));
            if let Some(entry) = lock(&self.state).listeners.get_mut(&id) {
                entry.handler = Some(handler);
            }
        }
        count
    }

    /// Drops listeners whose target no longer exists. Returns how many were dropped.
    pub fn prune_stale(&self) -> usize {
        let pruned = prune_locked(&mut lock(&self.state).listeners);
        if pruned > 0 {
            log::debug!("Pruned {pruned} stale listeners.");
        }
        pruned
    }

    /// Removes every listener and returns how many were dropped.
    pub fn cleanup_listeners(&self) -> usize {
        let mut state = lock(&self.state);
        let dropped = state.listeners.len();
        state.listeners.clear();
        if dropped > 0 {
            log::info!("Resource pool flushed {dropped} listeners.");
        }
        dropped
    }
}

fn prune_locked(listeners: &mut std::collections::BTreeMap<u64, ListenerEntry>) -> usize {
    let before = listeners.len();
    listeners.retain(|_, entry| !entry.is_stale());
    before - listeners.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use vigil_core::config::PoolConfig;
    use vigil_core::testing::FakeClock;

    struct Button;

    fn pool_with(config: PoolConfig) -> ResourcePool {
        ResourcePool::new(config, Arc::new(FakeClock::default()))
    }

    #[test]
    fn dispatch_reaches_matching_listeners_only() {
        let pool = pool_with(PoolConfig::default());
        let ok = Arc::new(Button);
        let cancel = Arc::new(Button);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        pool.register_listener(&ok, "click", move |event| {
            sink.lock().unwrap().push(event.payload.clone());
            Ok(())
        });
        pool.register_listener(&ok, "hover", |_| Ok(()));
        pool.register_listener(&cancel, "click", |_| Ok(()));

        let ran = pool.dispatch(&ok, "click", serde_json::json!({ "x": 3 }));
        assert_eq!(ran, 1);
        assert_eq!(*seen.lock().unwrap(), vec![serde_json::json!({ "x": 3 })]);
    }

    #[test]
    fn dropped_targets_are_pruned() {
        let pool = pool_with(PoolConfig::default());
        let kept = Arc::new(Button);
        let dropped = Arc::new(Button);
        pool.register_listener(&kept, "click", |_| Ok(()));
        pool.register_listener(&dropped, "click", |_| Ok(()));
        drop(dropped);

        assert_eq!(pool.prune_stale(), 1);
        assert_eq!(pool.stats().listeners, 1);
    }

    #[test]
    fn listener_does_not_keep_target_alive() {
        let pool = pool_with(PoolConfig::default());
        let target = Arc::new(Button);
        pool.register_listener(&target, "click", |_| Ok(()));
        assert_eq!(Arc::strong_count(&target), 1);
    }

    #[test]
    fn unregister_listener_is_idempotent() {
        let pool = pool_with(PoolConfig::default());
        let target = Arc::new(Button);
        let handle = pool.register_listener(&target, "click", |_| Ok(()));
        assert!(pool.unregister_listener(handle));
        assert!(!pool.unregister_listener(handle));
        assert_eq!(pool.dispatch(&target, "click", serde_json::Value::Null), 0);
    }

    #[test]
    fn listener_cap_evicts_oldest_half() {
        let pool = pool_with(PoolConfig {
            max_listeners: 10,
            listener_warn_threshold: 5,
            ..Default::default()
        });
        let target = Arc::new(Button);
        for _ in 0..25 {
            pool.register_listener(&target, "scroll", |_| Ok(()));
            assert!(pool.stats().listeners <= 10);
        }
        assert!(pool.stats().listener_evictions > 0);
    }

    #[test]
    fn panicking_handler_keeps_its_registration() {
        let pool = pool_with(PoolConfig::default());
        let target = Arc::new(Button);
        let calls = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&calls);
        pool.register_listener(&target, "click", move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
            panic!("handler exploded");
        });

        pool.dispatch(&target, "click", serde_json::Value::Null);
        pool.dispatch(&target, "click", serde_json::Value::Null);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(pool.stats().listeners, 1);
    }

    #[test]
    fn cleanup_listeners_leaves_timers() {
        let pool = pool_with(PoolConfig::default());
        let target = Arc::new(Button);
        pool.register_listener(&target, "click", |_| Ok(()));
        pool.schedule_timeout(|| Ok(()), 100);

        assert_eq!(pool.cleanup_listeners(), 1);
        assert_eq!(pool.stats().timeouts, 1);
    }
}
