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

//! # Vigil Core
//!
//! Foundational crate containing the traits, core types, and interface contracts
//! shared by every layer of the resource governor.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod guard;
pub mod health;
pub mod history;
pub mod platform;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::Clock;
pub use config::GovernorConfig;
pub use error::{ConfigError, HistoryError};
pub use event::{EventBus, EventKind, GovernorEvent, PressureSeverity, SubscriptionId};
pub use health::{Category, Finding, FindingStatus, HealthReport, Severity};
pub use history::HistoryStore;
pub use platform::PlatformProbe;
