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

//! Fixed-rate cadences for the work the governor does on `tick()`.

/// A fixed-rate schedule measured in clock milliseconds.
///
/// A cadence that fell behind fires once and then resumes from the current
/// time; missed periods are not replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    interval_ms: u64,
    next_due: u64,
}

impl Cadence {
    /// A cadence first due at `first_due`.
    pub fn new(interval_ms: u64, first_due: u64) -> Self {
        Self {
            interval_ms,
            next_due: first_due,
        }
    }

    /// A cadence due immediately.
    pub fn immediate(interval_ms: u64, now: u64) -> Self {
        Self::new(interval_ms, now)
    }

    /// A cadence first due one interval after `now`.
    pub fn delayed(interval_ms: u64, now: u64) -> Self {
        Self::new(interval_ms, now.saturating_add(interval_ms))
    }

    /// Returns `true` and advances when the cadence is due at `now`.
    pub fn poll(&mut self, now: u64) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now.saturating_add(self.interval_ms);
        true
    }

    /// The next time the cadence is due.
    pub fn next_due(&self) -> u64 {
        self.next_due
    }

    /// The period of the cadence.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_cadence_fires_at_once() {
        let mut cadence = Cadence::immediate(100, 1_000);
        assert!(cadence.poll(1_000));
        assert!(!cadence.poll(1_050));
        assert!(cadence.poll(1_100));
    }

    #[test]
    fn delayed_cadence_waits_one_interval() {
        let mut cadence = Cadence::delayed(600_000, 0);
        assert!(!cadence.poll(599_999));
        assert!(cadence.poll(600_000));
        assert_eq!(cadence.next_due(), 1_200_000);
    }

    #[test]
    fn late_cadence_fires_once_then_resumes_from_now() {
        let mut cadence = Cadence::immediate(100, 0);
        assert!(cadence.poll(0));
        assert!(cadence.poll(1_000));
        assert!(!cadence.poll(1_050));
        assert_eq!(cadence.next_due(), 1_100);
    }
}
