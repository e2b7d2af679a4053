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

//! # Vigil SDK
//!
//! The public entry point of the resource governor. Build a [`Governor`],
//! register sessions, route timers and listeners through it, and call
//! [`Governor::tick`] from the host loop or let a [`GovernorDriver`] do it.
//!
//! ```no_run
//! use vigil_sdk::{EventKind, Governor, GovernorConfig};
//!
//! let governor = Governor::new(GovernorConfig::default())?;
//! governor.subscribe(EventKind::ThrottleRequested, |event| {
//!     log::warn!("back off: {event:?}");
//! });
//! governor.register("lesson-42");
//! governor.track_activity("lesson-42");
//! governor.tick();
//! # Ok::<(), vigil_sdk::ConfigError>(())
//! ```

#![warn(missing_docs)]

pub mod driver;
pub mod governor;
pub mod schedule;

pub use driver::GovernorDriver;
pub use governor::{Governor, GovernorBuilder, TickReport};
pub use schedule::Cadence;

pub use vigil_control::{SessionMetrics, SessionSummary};
pub use vigil_core::{
    Category, Clock, ConfigError, EventKind, Finding, FindingStatus, GovernorConfig,
    GovernorEvent, HealthReport, HistoryStore, PlatformProbe, PressureSeverity, Severity,
    SubscriptionId,
};
pub use vigil_data::{ListenerEvent, ListenerHandle, PoolStats, TimerHandle, TimerKind};
pub use vigil_infra::{logging, JsonFileHistory, SysinfoProbe, SystemClock};
pub use vigil_telemetry::{InMemoryHistory, MemorySample, PerformanceReport};
