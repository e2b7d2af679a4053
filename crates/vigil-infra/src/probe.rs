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

//! sysinfo-based implementation of the PlatformProbe trait.

use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};
use vigil_core::platform::{HeapStats, PlatformProbe, ProbeCapabilities};
use vigil_core::sync::lock;

/// A probe reporting this process's resident memory through `sysinfo`.
///
/// The limit is the host's total memory unless overridden. Network, document
/// and reclaim queries are not available on a native host and report so.
pub struct SysinfoProbe {
    system: Mutex<System>,
    pid: Option<Pid>,
    limit_override: Option<u64>,
}

impl SysinfoProbe {
    /// Creates a probe for the current process.
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                log::warn!("Cannot resolve the current process id ({e}); heap stats disabled.");
                None
            }
        };
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
            pid,
            limit_override: None,
        }
    }

    /// Uses `limit_bytes` instead of total host memory as the heap limit.
    pub fn with_limit(mut self, limit_bytes: u64) -> Self {
        self.limit_override = Some(limit_bytes);
        self
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SysinfoProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoProbe")
            .field("pid", &self.pid)
            .field("limit_override", &self.limit_override)
            .finish()
    }
}

impl PlatformProbe for SysinfoProbe {
    fn capabilities(&self) -> ProbeCapabilities {
        ProbeCapabilities {
            heap: self.pid.is_some(),
            ..Default::default()
        }
    }

    fn heap_stats(&self) -> Option<HeapStats> {
        let pid = self.pid?;
        let mut system = lock(&self.system);
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        let used_bytes = system.process(pid)?.memory();
        let limit_bytes = self.limit_override.unwrap_or_else(|| system.total_memory());
        if limit_bytes == 0 {
            return None;
        }
        Some(HeapStats {
            used_bytes,
            total_bytes: used_bytes,
            limit_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_own_process_memory() {
        let probe = SysinfoProbe::new();
        if !probe.capabilities().heap {
            return;
        }
        let stats = probe.heap_stats().expect("own process should be visible");
        assert!(stats.used_bytes > 0);
        assert!(stats.limit_bytes >= stats.used_bytes);
    }

    #[test]
    fn limit_override_is_used() {
        let probe = SysinfoProbe::new().with_limit(u64::MAX);
        if let Some(stats) = probe.heap_stats() {
            assert_eq!(stats.limit_bytes, u64::MAX);
        }
    }

    #[test]
    fn optional_capabilities_are_absent() {
        let probe = SysinfoProbe::new();
        assert!(!probe.request_reclaim());
        assert!(probe.connection().is_none());
        assert!(probe.document_stats().unwrap().is_none());
    }
}
