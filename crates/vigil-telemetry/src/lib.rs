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

//! # Vigil Telemetry
//!
//! Memory sampling with pressure notification and leak history, plus a light
//! render-performance log. Everything here observes; nothing here acts.

#![warn(missing_docs)]

pub mod history;
pub mod performance;
pub mod sampler;

pub use history::{InMemoryHistory, RollingWindow};
pub use performance::{ComponentTiming, PerformanceLog, PerformanceReport};
pub use sampler::{MemorySample, MemorySampler, PressureCallback};
