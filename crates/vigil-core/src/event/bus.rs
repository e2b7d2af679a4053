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

use super::types::{EventKind, GovernorEvent};
use crate::guard::run_guarded;
use crate::sync::lock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Handler = Arc<dyn Fn(&GovernorEvent) + Send + Sync>;

/// Identifies a subscription so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

struct Subscriber {
    id: SubscriptionId,
    kind: EventKind,
    handler: Handler,
}

/// Owns the governor's subscribers and delivers events to them.
///
/// Handlers run synchronously on the publishing thread, in subscription order,
/// and never under the bus lock, so a handler may subscribe or unsubscribe.
/// A panicking handler is logged and does not prevent delivery to the others.
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
    taps: Mutex<Vec<flume::Sender<GovernorEvent>>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        log::debug!("Governor EventBus initialized.");
        Self {
            subscribers: Mutex::new(Vec::new()),
            taps: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler` for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&GovernorEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push(Subscriber {
            id,
            kind,
            handler: Arc::new(handler),
        });
        log::trace!("Subscribed {:?} to '{}'.", id, kind);
        id
    }

    /// Registers the same handler for every event kind.
    pub fn subscribe_all<F>(&self, handler: F) -> Vec<SubscriptionId>
    where
        F: Fn(&GovernorEvent) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        EventKind::ALL
            .iter()
            .map(|&kind| {
                let handler = Arc::clone(&handler);
                self.subscribe(kind, move |event| handler(event))
            })
            .collect()
    }

    /// Removes a subscription. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    /// Opens a bounded channel that receives a copy of every event.
    ///
    /// When the channel is full new events are dropped for that tap only.
    /// Dropping the receiver closes the tap.
    pub fn channel(&self, capacity: usize) -> flume::Receiver<GovernorEvent> {
        let (sender, receiver) = flume::bounded(capacity);
        lock(&self.taps).push(sender);
        receiver
    }

    /// Delivers `event` to every matching subscriber, then to every open tap.
    pub fn publish(&self, event: GovernorEvent) {
        let kind = event.kind();
        log::trace!("Publishing '{}'.", kind);

        let handlers: Vec<Handler> = lock(&self.subscribers)
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| Arc::clone(&s.handler))
            .collect();

        for handler in handlers {
            run_guarded("event handler", || {
                handler(&event);
                Ok(())
            });
        }

        let mut taps = lock(&self.taps);
        taps.retain(|tap| match tap.try_send(event.clone()) {
            Ok(()) => true,
            Err(flume::TrySendError::Full(_)) => {
                log::warn!("Event tap full, dropping '{}'.", kind);
                true
            }
            Err(flume::TrySendError::Disconnected(_)) => false,
        });
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("taps", &lock(&self.taps).len())
            .finish()
    }
}
