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

use crate::health::HealthReport;
use std::fmt::{self, Display};
use std::sync::Arc;

/// How urgent a memory-pressure notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressureSeverity {
    /// A single session outgrew its growth budget.
    Elevated,
    /// The whole heap crossed the critical threshold.
    High,
}

/// Every event the governor can emit. The set is closed.
#[derive(Debug, Clone)]
pub enum GovernorEvent {
    /// A session went quiet for longer than the freeze threshold.
    FreezeDetected {
        /// The stalled session.
        session_id: String,
        /// How long the session had been idle, in milliseconds.
        idle_ms: u64,
        /// Emission time.
        timestamp: u64,
    },
    /// Recovery ran for a frozen session.
    RecoveryAttempted {
        /// The recovered session.
        session_id: String,
        /// Emission time.
        timestamp: u64,
    },
    /// A session is producing activity faster than the runaway cap allows.
    /// The caller is expected to back off.
    ThrottleRequested {
        /// The runaway session.
        session_id: String,
        /// Activity count at the time of the request.
        activity_count: u64,
        /// Emission time.
        timestamp: u64,
    },
    /// A session should shed memory.
    MemoryPressure {
        /// The session asked to shed memory.
        session_id: String,
        /// Why the request was raised.
        severity: PressureSeverity,
        /// Growth over the session baseline, when the request is session specific.
        growth_bytes: Option<u64>,
        /// Emission time.
        timestamp: u64,
    },
    /// The host thread itself stalled and a global recovery ran.
    UiFreezeRecovery {
        /// Sessions whose counters were reset.
        session_ids: Vec<String>,
        /// Measured gap between two heartbeats, in milliseconds.
        stall_ms: u64,
        /// Emission time.
        timestamp: u64,
    },
    /// A scheduled sweep scored below the alert threshold.
    SystemHealthAlert {
        /// The degraded report.
        report: Arc<HealthReport>,
        /// Emission time.
        timestamp: u64,
    },
}

impl GovernorEvent {
    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            GovernorEvent::FreezeDetected { .. } => EventKind::FreezeDetected,
            GovernorEvent::RecoveryAttempted { .. } => EventKind::RecoveryAttempted,
            GovernorEvent::ThrottleRequested { .. } => EventKind::ThrottleRequested,
            GovernorEvent::MemoryPressure { .. } => EventKind::MemoryPressure,
            GovernorEvent::UiFreezeRecovery { .. } => EventKind::UiFreezeRecovery,
            GovernorEvent::SystemHealthAlert { .. } => EventKind::SystemHealthAlert,
        }
    }

    /// Returns the emission time carried by every payload.
    pub fn timestamp(&self) -> u64 {
        match self {
            GovernorEvent::FreezeDetected { timestamp, .. }
            | GovernorEvent::RecoveryAttempted { timestamp, .. }
            | GovernorEvent::ThrottleRequested { timestamp, .. }
            | GovernorEvent::MemoryPressure { timestamp, .. }
            | GovernorEvent::UiFreezeRecovery { timestamp, .. }
            | GovernorEvent::SystemHealthAlert { timestamp, .. } => *timestamp,
        }
    }

    /// Returns the session the event is about, for session-scoped events.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            GovernorEvent::FreezeDetected { session_id, .. }
            | GovernorEvent::RecoveryAttempted { session_id, .. }
            | GovernorEvent::ThrottleRequested { session_id, .. }
            | GovernorEvent::MemoryPressure { session_id, .. } => Some(session_id),
            GovernorEvent::UiFreezeRecovery { .. } | GovernorEvent::SystemHealthAlert { .. } => {
                None
            }
        }
    }
}

/// Discriminant of [`GovernorEvent`], used as a subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`GovernorEvent::FreezeDetected`].
    FreezeDetected,
    /// See [`GovernorEvent::RecoveryAttempted`].
    RecoveryAttempted,
    /// See [`GovernorEvent::ThrottleRequested`].
    ThrottleRequested,
    /// See [`GovernorEvent::MemoryPressure`].
    MemoryPressure,
    /// See [`GovernorEvent::UiFreezeRecovery`].
    UiFreezeRecovery,
    /// See [`GovernorEvent::SystemHealthAlert`].
    SystemHealthAlert,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::FreezeDetected,
        EventKind::RecoveryAttempted,
        EventKind::ThrottleRequested,
        EventKind::MemoryPressure,
        EventKind::UiFreezeRecovery,
        EventKind::SystemHealthAlert,
    ];

    /// Returns the wire name of the kind (e.g. "freeze-detected").
    pub fn name(self) -> &'static str {
        match self {
            EventKind::FreezeDetected => "freeze-detected",
            EventKind::RecoveryAttempted => "recovery-attempted",
            EventKind::ThrottleRequested => "throttle-requested",
            EventKind::MemoryPressure => "memory-pressure",
            EventKind::UiFreezeRecovery => "ui-freeze-recovery",
            EventKind::SystemHealthAlert => "system-health-alert",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
