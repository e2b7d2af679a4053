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

//! Panic-isolated invocation of user supplied callbacks.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Runs a fallible callback, catching both `Err` results and panics.
///
/// Failures are logged under `label` and reported as `false`. Nothing escapes,
/// so a registry can keep its bookkeeping consistent around the call.
pub fn run_guarded<F>(label: &str, callback: F) -> bool
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::error!("{label} failed: {e:#}");
            false
        }
        Err(payload) => {
            log::error!("{label} panicked: {}", panic_message(payload.as_ref()));
            false
        }
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_callback_reports_success() {
        assert!(run_guarded("ok", || Ok(())));
    }

    #[test]
    fn err_callback_is_contained() {
        assert!(!run_guarded("err", || Err(anyhow::anyhow!("boom"))));
    }

    #[test]
    fn panicking_callback_is_contained() {
        assert!(!run_guarded("panic", || panic!("kaboom")));
    }

    #[test]
    fn panic_message_handles_owned_strings() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
