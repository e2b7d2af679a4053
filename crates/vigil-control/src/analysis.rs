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

//! Scoring of diagnostic findings.
//!
//! Turns the raw findings of a sweep into the numbers of a [`HealthReport`]:
//! the overall score, the render performance score, the network health and the
//! deduplicated recommendation list.

use vigil_core::platform::{ConnectionInfo, EffectiveConnection};
use vigil_core::{Category, Finding, HealthReport, Severity};
use vigil_telemetry::{MemorySample, PerformanceReport};

/// Score lost per critical finding.
const CRITICAL_PENALTY: i32 = 30;
/// Score lost per high finding.
const HIGH_PENALTY: i32 = 15;
/// Score lost per medium finding.
const MEDIUM_PENALTY: i32 = 5;
/// Network health when the connection class is unknown.
const UNKNOWN_NETWORK_HEALTH: u8 = 75;

const MEMORY_ADVICE: &str =
    "Release caches and large objects held by inactive views to lower memory pressure.";
const PERFORMANCE_ADVICE: &str =
    "Split heavy components and defer non-critical rendering to keep interactions responsive.";

/// `100 − 30·critical − 15·high − 5·medium`, clamped to `[0, 100]`.
///
/// Every finding counts, including the ones auto-fix marked as fixed.
pub fn overall_score(findings: &[Finding]) -> u8 {
    let penalty: i32 = findings
        .iter()
        .map(|f| match f.severity {
            Severity::Critical => CRITICAL_PENALTY,
            Severity::High => HIGH_PENALTY,
            Severity::Medium => MEDIUM_PENALTY,
            Severity::Low => 0,
        })
        .sum();
    (100 - penalty).clamp(0, 100) as u8
}

/// `100 − average_render_ms / 2`, floored at zero.
pub fn performance_score(average_render_ms: f64) -> f64 {
    (100.0 - average_render_ms / 2.0).clamp(0.0, 100.0)
}

/// Maps the connection class to a 0..=100 health figure.
pub fn network_health(connection: Option<ConnectionInfo>) -> u8 {
    match connection.map(|c| c.effective_type) {
        Some(EffectiveConnection::FourG) => 100,
        Some(EffectiveConnection::ThreeG) => 75,
        Some(EffectiveConnection::TwoG) => 50,
        Some(EffectiveConnection::Slow2g) => 25,
        None => UNKNOWN_NETWORK_HEALTH,
    }
}

/// Finding recommendations in order of first appearance, without duplicates,
/// followed by general advice for memory or performance trouble.
pub fn recommendations(findings: &[Finding]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for recommendation in findings.iter().filter_map(|f| f.recommendation.as_deref()) {
        if !out.iter().any(|r| r == recommendation) {
            out.push(recommendation.to_owned());
        }
    }

    let serious_in = |category: Category| {
        findings
            .iter()
            .any(|f| f.category == category && f.severity >= Severity::High)
    };
    for (category, advice) in [
        (Category::Memory, MEMORY_ADVICE),
        (Category::Performance, PERFORMANCE_ADVICE),
    ] {
        if serious_in(category) && !out.iter().any(|r| r == advice) {
            out.push(advice.to_owned());
        }
    }
    out
}

/// Assembles the immutable report of one sweep.
pub fn assemble_report(
    findings: Vec<Finding>,
    memory: Option<MemorySample>,
    performance: &PerformanceReport,
    connection: Option<ConnectionInfo>,
    generated_at: u64,
) -> HealthReport {
    HealthReport {
        overall_score: overall_score(&findings),
        recommendations: recommendations(&findings),
        memory_usage_pct: memory.map(|s| s.usage_ratio * 100.0),
        performance_score: performance_score(performance.average_render_ms),
        network_health: network_health(connection),
        findings,
        generated_at,
    }
}
