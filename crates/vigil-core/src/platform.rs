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

//! Provides abstractions over host capabilities.
//!
//! The governor never probes the host directly. Heap statistics, connection
//! quality and document-tree shape all come through a [`PlatformProbe`], whose
//! methods return `None` when the host does not expose the capability.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Raw heap figures reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeapStats {
    /// Bytes currently in use.
    pub used_bytes: u64,
    /// Bytes currently reserved from the system.
    pub total_bytes: u64,
    /// The ceiling the heap may grow to.
    pub limit_bytes: u64,
}

/// Effective connection class, as reported by the host's network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectiveConnection {
    /// Very slow, high latency link.
    Slow2g,
    /// 2G-class link.
    #[serde(rename = "2g")]
    TwoG,
    /// 3G-class link.
    #[serde(rename = "3g")]
    ThreeG,
    /// 4G-class or better link.
    #[serde(rename = "4g")]
    FourG,
}

impl EffectiveConnection {
    /// Returns the conventional short name of the class (e.g. "slow-2g").
    pub fn name(self) -> &'static str {
        match self {
            EffectiveConnection::Slow2g => "slow-2g",
            EffectiveConnection::TwoG => "2g",
            EffectiveConnection::ThreeG => "3g",
            EffectiveConnection::FourG => "4g",
        }
    }
}

/// A snapshot of the host's network conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// The effective connection class.
    pub effective_type: EffectiveConnection,
    /// `true` if the user asked for reduced data usage.
    pub save_data: bool,
}

/// Shape of the host's document tree, when one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    /// Total number of nodes.
    pub node_count: usize,
    /// Maximum nesting depth.
    pub max_depth: usize,
    /// Mutations observed over the last second.
    pub mutations_per_second: usize,
}

/// Which optional capabilities a probe can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeCapabilities {
    /// Heap introspection is available.
    pub heap: bool,
    /// The host honours reclaim hints.
    pub reclaim: bool,
    /// Connection information is available.
    pub connection: bool,
    /// A document tree exists and can be measured.
    pub document: bool,
}

/// The host capability interface.
///
/// A real implementation lives in `vigil-infra`; tests use
/// `testing::ScriptedProbe` behind the `testing` feature.
pub trait PlatformProbe: Send + Sync + Debug + 'static {
    /// Describes which of the optional queries below return data.
    fn capabilities(&self) -> ProbeCapabilities;

    /// Returns heap figures, or `None` if the host exposes no heap introspection.
    fn heap_stats(&self) -> Option<HeapStats>;

    /// Hints the runtime to give memory back. Returns `false` when unsupported.
    fn request_reclaim(&self) -> bool {
        false
    }

    /// Returns current connection information, if known.
    fn connection(&self) -> Option<ConnectionInfo> {
        None
    }

    /// Returns the number of recent requests that failed.
    fn failed_requests(&self) -> usize {
        0
    }

    /// Measures the document tree. `Ok(None)` means the host has no document.
    fn document_stats(&self) -> anyhow::Result<Option<DocumentStats>> {
        Ok(None)
    }

    /// Returns `true` if debugging tooling is attached to the running instance.
    fn debug_tooling_active(&self) -> bool {
        false
    }
}

/// The flavour of build the governor runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildProfile {
    /// Local development build.
    Development,
    /// Shipped build.
    #[default]
    Production,
}

impl BuildProfile {
    /// Picks the profile matching how this binary was compiled.
    pub fn current() -> Self {
        if cfg!(debug_assertions) {
            BuildProfile::Development
        } else {
            BuildProfile::Production
        }
    }
}
