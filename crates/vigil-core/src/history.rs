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

//! Persistence contract for the rolling memory-usage history.

use crate::error::HistoryError;
use std::fmt::Debug;

/// A small key-value style store for the leak heuristic's usage ratios.
///
/// The sampler loads the buffer once at construction and saves it after every
/// poll. Implementations only need to round-trip a short list of floats.
pub trait HistoryStore: Send + Sync + Debug + 'static {
    /// Loads the persisted ratios, oldest first. A missing store is an empty history.
    fn load(&self) -> Result<Vec<f64>, HistoryError>;

    /// Replaces the persisted ratios.
    fn save(&self, ratios: &[f64]) -> Result<(), HistoryError>;
}
