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

// Demo runtime: wires the governor to the real host, simulates a busy session
// and prints the resulting health report as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vigil_sdk::{Governor, GovernorConfig, GovernorDriver};

#[derive(Parser, Debug)]
#[command(name = "vigil-runtime", version, about = "Run a simulated session under the resource governor")]
struct Args {
    /// JSON configuration file; defaults are used when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Persist the memory history to this JSON file.
    #[arg(long)]
    history: Option<PathBuf>,

    /// Number of simulated activities.
    #[arg(long, default_value_t = 150)]
    activities: u32,

    /// Pause between two activities, in milliseconds.
    #[arg(long, default_value_t = 20)]
    pace_ms: u64,

    /// Write the default configuration to this path and exit.
    #[arg(long)]
    write_default_config: Option<PathBuf>,
}

/// Listener target standing in for a UI element.
struct Panel;

const SESSION: &str = "demo-session";

fn main() -> Result<()> {
    vigil_sdk::logging::init();
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        GovernorConfig::default()
            .to_file(path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => GovernorConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GovernorConfig::default(),
    };
    let mut builder = Governor::builder().config(config);
    if let Some(path) = &args.history {
        builder = builder.history_file(path);
    }
    let governor = Arc::new(builder.build()?);
    let events = governor.event_stream(1_024);
    let mut driver = GovernorDriver::start(Arc::clone(&governor))?;

    let panel = Arc::new(Panel);
    governor.register_listener(&panel, "refresh", |event| {
        log::trace!("panel refresh {}", event.payload);
        Ok(())
    });
    governor.register(SESSION);

    for frame in 0..args.activities {
        let render = Duration::from_millis(5 + u64::from(frame % 7) * 10);
        governor.track_activity(SESSION);
        governor.record_render("Panel", render);
        governor.dispatch(&panel, "refresh", serde_json::json!({ "frame": frame }));
        thread::sleep(Duration::from_millis(args.pace_ms));
    }

    let summary = governor.unregister(SESSION);
    driver.stop();

    for event in events.try_iter() {
        log::info!(
            "{} at {} ({})",
            event.kind(),
            event.timestamp(),
            event.session_id().unwrap_or("host")
        );
    }

    let report = governor.run_full();
    let output = serde_json::json!({
        "session": summary,
        "report": &*report,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    governor.shutdown();
    Ok(())
}
