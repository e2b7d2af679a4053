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

//! Time source abstraction.
//!
//! Every component reads time through a [`Clock`] so that watchdog and cadence
//! logic can be driven deterministically by a fake clock in tests.

use std::fmt::Debug;

/// A monotonic source of wall-aligned milliseconds.
///
/// Implementations must never go backwards between two calls.
pub trait Clock: Send + Sync + Debug + 'static {
    /// Returns the current time in milliseconds since the UNIX epoch.
    fn now_ms(&self) -> u64;
}
