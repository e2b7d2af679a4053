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

//! Background thread that ticks a governor.

use crate::governor::Governor;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vigil_core::guard::run_guarded;

/// Ticks a [`Governor`] from a dedicated thread until stopped or dropped.
#[derive(Debug)]
pub struct GovernorDriver {
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
    interval: Duration,
}

impl GovernorDriver {
    /// Starts ticking at the configured heartbeat interval.
    pub fn start(governor: Arc<Governor>) -> std::io::Result<Self> {
        let interval = Duration::from_millis(governor.config().monitor.heartbeat_interval_ms);
        Self::with_interval(governor, interval)
    }

    /// Starts ticking every `interval`.
    pub fn with_interval(governor: Arc<Governor>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("vigil-governor".into())
            .spawn(move || {
                log::info!("Governor driver started ({}ms tick).", interval.as_millis());
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            run_guarded("governor tick", || {
                                governor.tick();
                                Ok(())
                            });
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::info!("Governor driver stopped.");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            interval,
        })
    }

    /// The tick period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `true` until [`stop`](Self::stop) has been called.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the thread and waits for the current tick to finish. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            if stop_tx.send(()).is_err() {
                log::trace!("Governor driver thread already exited.");
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Governor driver thread panicked.");
            }
        }
    }
}

impl Drop for GovernorDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::testing::{FakeClock, ScriptedProbe};

    #[test]
    fn driver_fires_timers_and_stops() {
        let clock = FakeClock::default();
        let governor = Arc::new(
            Governor::builder()
                .clock(Arc::new(clock.clone()))
                .probe(Arc::new(ScriptedProbe::new()))
                .build()
                .unwrap(),
        );
        let (fired_tx, fired_rx) = crossbeam_channel::bounded(1);
        governor.schedule_timeout(
            move || {
                let _ = fired_tx.try_send(());
                Ok(())
            },
            0,
        );

        let mut driver = GovernorDriver::with_interval(governor, Duration::from_millis(5)).unwrap();
        assert!(driver.is_running());
        assert!(fired_rx.recv_timeout(Duration::from_secs(5)).is_ok());

        driver.stop();
        driver.stop();
        assert!(!driver.is_running());
    }

    #[test]
    fn dropping_the_driver_releases_the_governor() {
        let governor = Arc::new(
            Governor::builder()
                .clock(Arc::new(FakeClock::default()))
                .probe(Arc::new(ScriptedProbe::new()))
                .build()
                .unwrap(),
        );
        let driver =
            GovernorDriver::with_interval(governor.clone(), Duration::from_millis(5)).unwrap();
        assert_eq!(Arc::strong_count(&governor), 2);

        drop(driver);
        assert_eq!(Arc::strong_count(&governor), 1);
    }

    #[test]
    fn stop_tolerates_an_exited_thread() {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        drop(stop_rx);
        let mut driver = GovernorDriver {
            stop_tx: Some(stop_tx),
            handle: None,
            interval: Duration::from_millis(5),
        };

        driver.stop();
        assert!(!driver.is_running());
        assert!(driver.stop_tx.is_none());
    }
}
