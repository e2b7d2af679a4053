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

//! Rolling storage for sampled ratios.

use std::collections::VecDeque;
use std::sync::Mutex;
use vigil_core::sync::lock;
use vigil_core::{HistoryError, HistoryStore};

/// A bounded window of samples, oldest first. Pushing into a full window
/// drops the oldest value.
#[derive(Debug, Clone, Default)]
pub struct RollingWindow {
    data: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Creates an empty window holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Creates a window seeded with the newest `capacity` values of `values`.
    pub fn from_slice(values: &[f64], capacity: usize) -> Self {
        let mut window = Self::new(capacity);
        let skip = values.len().saturating_sub(capacity);
        for &value in &values[skip..] {
            window.push(value);
        }
        window
    }

    /// Pushes a new value, overwriting the oldest if full.
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    /// Returns the number of samples held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if no sample is held.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.data.iter()
    }

    /// Copies the samples out, oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    /// Arithmetic mean, or 0.0 when empty.
    pub fn average(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    /// Largest sample, if any.
    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }

    /// Average of the newest half minus the average of the oldest half.
    ///
    /// Positive when increasing. 0.0 with fewer than two samples.
    pub fn trend(&self) -> f64 {
        match self.half_averages() {
            Some((first, last)) => last - first,
            None => 0.0,
        }
    }

    /// [`trend`](Self::trend) relative to the oldest half's average.
    ///
    /// `None` with fewer than `min_samples` samples, or when the oldest half
    /// averages to zero.
    pub fn relative_trend(&self, min_samples: usize) -> Option<f64> {
        if self.data.len() < min_samples.max(2) {
            return None;
        }
        let (first, last) = self.half_averages()?;
        if first <= f64::EPSILON {
            return None;
        }
        Some((last - first) / first)
    }

    fn half_averages(&self) -> Option<(f64, f64)> {
        let count = self.data.len();
        if count < 2 {
            return None;
        }
        let half = count / 2;
        let first = self.data.iter().take(half).sum::<f64>() / half as f64;
        let last = self.data.iter().skip(count - half).sum::<f64>() / half as f64;
        Some((first, last))
    }
}

/// A [`HistoryStore`] that lives only as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    ratios: Mutex<Vec<f64>>,
}

impl InMemoryHistory {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with `ratios`.
    pub fn seeded(ratios: Vec<f64>) -> Self {
        Self {
            ratios: Mutex::new(ratios),
        }
    }
}

impl HistoryStore for InMemoryHistory {
    fn load(&self) -> Result<Vec<f64>, HistoryError> {
        Ok(lock(&self.ratios).clone())
    }

    fn save(&self, ratios: &[f64]) -> Result<(), HistoryError> {
        *lock(&self.ratios) = ratios.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_window_drops_oldest() {
        let mut window = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        assert_eq!(window.to_vec(), vec![2.0, 3.0, 4.0]);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn from_slice_keeps_newest() {
        let window = RollingWindow::from_slice(&[0.1, 0.2, 0.3, 0.4, 0.5], 2);
        assert_eq!(window.to_vec(), vec![0.4, 0.5]);
    }

    #[test]
    fn trend_compares_halves() {
        let window = RollingWindow::from_slice(&[1.0, 1.1, 2.0, 2.1], 4);
        // (2.0 + 2.1) / 2 - (1.0 + 1.1) / 2
        assert!((window.trend() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn relative_trend_needs_enough_samples() {
        let mut window = RollingWindow::new(20);
        window.push(0.4);
        window.push(0.5);
        assert_eq!(window.relative_trend(3), None);

        window.push(0.6);
        // odd count: middle sample belongs to neither half
        let trend = window.relative_trend(3).unwrap();
        assert!((trend - 0.5).abs() < 1e-9);
    }

    #[test]
    fn relative_trend_ignores_zero_baseline() {
        let window = RollingWindow::from_slice(&[0.0, 0.0, 0.3, 0.4], 4);
        assert_eq!(window.relative_trend(3), None);
    }

    #[test]
    fn empty_window_is_neutral() {
        let window = RollingWindow::new(4);
        assert_eq!(window.average(), 0.0);
        assert_eq!(window.trend(), 0.0);
        assert_eq!(window.max(), None);
        assert!(window.is_empty());
    }

    #[test]
    fn in_memory_history_round_trips() {
        let store = InMemoryHistory::new();
        assert!(store.load().unwrap().is_empty());
        store.save(&[0.2, 0.3]).unwrap();
        assert_eq!(store.load().unwrap(), vec![0.2, 0.3]);
    }
}
