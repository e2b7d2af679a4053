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

//! Error types shared across the governor crates.

use thiserror::Error;

/// An error raised while loading or validating a [`GovernorConfig`](crate::GovernorConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration could not be parsed or serialized.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is outside its allowed range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// An error raised by a [`HistoryStore`](crate::HistoryStore) backend.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The backing storage could not be read or written.
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The stored history is not valid JSON.
    #[error("history format error: {0}")]
    Format(#[from] serde_json::Error),
    /// The backend is not usable on this host.
    #[error("history store unavailable: {0}")]
    Unavailable(String),
}
