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

//! Deterministic stand-ins for the clock and the host, for tests and benches.

use crate::clock::Clock;
use crate::platform::{ConnectionInfo, DocumentStats, HeapStats, PlatformProbe, ProbeCapabilities};
use crate::sync::lock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: Arc<AtomicU64>,
}

impl FakeClock {
    /// Creates a clock frozen at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jumps the clock to an absolute time.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ProbeScript {
    heap: Option<HeapStats>,
    used_after_reclaim: Option<u64>,
    reclaim_supported: bool,
    reclaim_calls: usize,
    connection: Option<ConnectionInfo>,
    failed_requests: usize,
    document: Option<DocumentStats>,
    document_error: Option<String>,
    document_hook: Option<Hook>,
    debug_tooling: bool,
}

/// A probe whose answers are set by the test.
///
/// Clones share the same script, so a test can keep a handle and change the
/// host's state after handing the probe to the governor.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    script: Arc<Mutex<ProbeScript>>,
}

impl ScriptedProbe {
    /// A probe without heap introspection or any other capability.
    pub fn new() -> Self {
        Self::default()
    }

    /// A probe reporting `used_bytes` out of `limit_bytes`.
    pub fn with_heap(used_bytes: u64, limit_bytes: u64) -> Self {
        let probe = Self::new();
        probe.set_heap(used_bytes, limit_bytes);
        probe
    }

    /// Sets the heap figures; `total_bytes` mirrors `used_bytes`.
    pub fn set_heap(&self, used_bytes: u64, limit_bytes: u64) {
        lock(&self.script).heap = Some(HeapStats {
            used_bytes,
            total_bytes: used_bytes,
            limit_bytes,
        });
    }

    /// Sets only the used bytes, keeping the limit.
    pub fn set_used(&self, used_bytes: u64) {
        let mut script = lock(&self.script);
        if let Some(heap) = script.heap.as_mut() {
            heap.used_bytes = used_bytes;
            heap.total_bytes = heap.total_bytes.max(used_bytes);
        }
    }

    /// Removes heap introspection.
    pub fn clear_heap(&self) {
        lock(&self.script).heap = None;
    }

    /// Makes reclaim hints supported; when `used_after` is set, a reclaim drops usage to it.
    pub fn support_reclaim(&self, used_after: Option<u64>) {
        let mut script = lock(&self.script);
        script.reclaim_supported = true;
        script.used_after_reclaim = used_after;
    }

    /// Number of reclaim hints received so far.
    pub fn reclaim_calls(&self) -> usize {
        lock(&self.script).reclaim_calls
    }

    /// Sets the connection information.
    pub fn set_connection(&self, connection: Option<ConnectionInfo>) {
        lock(&self.script).connection = connection;
    }

    /// Sets the failed request count.
    pub fn set_failed_requests(&self, count: usize) {
        lock(&self.script).failed_requests = count;
    }

    /// Sets the document statistics.
    pub fn set_document(&self, document: Option<DocumentStats>) {
        lock(&self.script).document = document;
    }

    /// Makes document measurement fail with `message`.
    pub fn fail_document(&self, message: impl Into<String>) {
        lock(&self.script).document_error = Some(message.into());
    }

    /// Runs `hook` every time the document is measured, before answering.
    pub fn on_document<F: Fn() + Send + Sync + 'static>(&self, hook: F) {
        lock(&self.script).document_hook = Some(Arc::new(hook));
    }

    /// Sets whether debug tooling is attached.
    pub fn set_debug_tooling(&self, active: bool) {
        lock(&self.script).debug_tooling = active;
    }
}

impl std::fmt::Debug for ScriptedProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let script = lock(&self.script);
        f.debug_struct("ScriptedProbe")
            .field("heap", &script.heap)
            .field("reclaim_calls", &script.reclaim_calls)
            .finish()
    }
}

impl PlatformProbe for ScriptedProbe {
    fn capabilities(&self) -> ProbeCapabilities {
        let script = lock(&self.script);
        ProbeCapabilities {
            heap: script.heap.is_some(),
            reclaim: script.reclaim_supported,
            connection: script.connection.is_some(),
            document: script.document.is_some(),
        }
    }

    fn heap_stats(&self) -> Option<HeapStats> {
        lock(&self.script).heap
    }

    fn request_reclaim(&self) -> bool {
        let mut script = lock(&self.script);
        script.reclaim_calls += 1;
        let used_after = script.used_after_reclaim;
        if let (Some(after), Some(heap)) = (used_after, script.heap.as_mut()) {
            heap.used_bytes = heap.used_bytes.min(after);
        }
        script.reclaim_supported
    }

    fn connection(&self) -> Option<ConnectionInfo> {
        lock(&self.script).connection
    }

    fn failed_requests(&self) -> usize {
        lock(&self.script).failed_requests
    }

    fn document_stats(&self) -> anyhow::Result<Option<DocumentStats>> {
        let hook = lock(&self.script).document_hook.clone();
        if let Some(hook) = hook {
            hook();
        }
        let script = lock(&self.script);
        match &script.document_error {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(script.document),
        }
    }

    fn debug_tooling_active(&self) -> bool {
        lock(&self.script).debug_tooling
    }
}
