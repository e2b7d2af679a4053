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

//! File-backed leak history.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use vigil_core::{HistoryError, HistoryStore};

/// Stores the usage-ratio history as a JSON array in a single file.
///
/// A missing file reads as an empty history.
#[derive(Debug, Clone)]
pub struct JsonFileHistory {
    path: PathBuf,
}

impl JsonFileHistory {
    /// Creates a store backed by `path`. Nothing is touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for JsonFileHistory {
    fn load(&self) -> Result<Vec<f64>, HistoryError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let ratios: Vec<f64> = serde_json::from_str(&json)?;
        log::trace!("Loaded {} history samples from {}", ratios.len(), self.path.display());
        Ok(ratios)
    }

    fn save(&self, ratios: &[f64]) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        // Staged write, then rename over the target.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_vec(ratios)?)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}
