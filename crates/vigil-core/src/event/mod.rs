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

//! Typed publish/subscribe for governor events.
//!
//! The governor emits a closed set of [`GovernorEvent`]s. UI collaborators
//! subscribe to the kinds they care about on the [`EventBus`] and receive
//! events synchronously, in emission order. A bounded channel tap is also
//! available for consumers living on another thread.

mod bus;
mod types;

pub use self::bus::{EventBus, SubscriptionId};
pub use self::types::{EventKind, GovernorEvent, PressureSeverity};
