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

//! Findings and health reports produced by a diagnostic sweep.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational.
    Low,
    /// Worth watching.
    Medium,
    /// Needs attention soon.
    High,
    /// Needs attention now.
    Critical,
}

/// Remediation state of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingStatus {
    /// Found and left for the caller to act on.
    Detected,
    /// Remediated by the auto-fix pass and verified.
    Fixed,
    /// Below action level, kept under observation.
    Monitoring,
}

/// The area a finding belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Heap usage and growth.
    Memory,
    /// Timer and listener registries.
    ResourcePool,
    /// Render timings and bundle size.
    Performance,
    /// Document tree shape and churn.
    Dom,
    /// Connection quality and failed requests.
    Network,
    /// Build and tooling state.
    Runtime,
    /// The sweep itself.
    Diagnostics,
}

impl Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Memory => "memory",
            Category::ResourcePool => "resource-pool",
            Category::Performance => "performance",
            Category::Dom => "dom",
            Category::Network => "network",
            Category::Runtime => "runtime",
            Category::Diagnostics => "diagnostics",
        };
        f.write_str(name)
    }
}

/// One diagnosed issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Area of the issue.
    pub category: Category,
    /// Short issue title.
    pub issue: String,
    /// How serious it is.
    pub severity: Severity,
    /// Remediation state.
    pub status: FindingStatus,
    /// Measured values backing the finding.
    pub details: String,
    /// Suggested follow-up, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

impl Finding {
    /// Creates a finding without a recommendation.
    pub fn new(
        category: Category,
        issue: impl Into<String>,
        severity: Severity,
        status: FindingStatus,
        details: impl Into<String>,
    ) -> Self {
        Self {
            category,
            issue: issue.into(),
            severity,
            status,
            details: details.into(),
            recommendation: None,
        }
    }

    /// Attaches a recommendation.
    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// The aggregated result of one diagnostic sweep. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// 0 (unusable) to 100 (perfect).
    pub overall_score: u8,
    /// Every finding of the sweep.
    pub findings: Vec<Finding>,
    /// Heap usage in percent of the limit, `None` when unknown.
    pub memory_usage_pct: Option<f64>,
    /// Render performance score, 0 to 100.
    pub performance_score: f64,
    /// Network quality score, 0 to 100.
    pub network_health: u8,
    /// Deduplicated follow-up actions.
    pub recommendations: Vec<String>,
    /// Milliseconds since the UNIX epoch at which the sweep finished.
    pub generated_at: u64,
}

impl HealthReport {
    /// A perfect report with no findings, used before the first sweep completes.
    pub fn empty(generated_at: u64) -> Self {
        Self {
            overall_score: 100,
            findings: Vec::new(),
            memory_usage_pct: None,
            performance_score: 100.0,
            network_health: 75,
            recommendations: Vec::new(),
            generated_at,
        }
    }

    /// Counts findings of the given severity.
    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }

    /// Returns the findings of one category.
    pub fn findings_in(&self, category: Category) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_seriousness() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn report_serializes_with_kebab_categories() {
        let mut report = HealthReport::empty(42);
        report.findings.push(
            Finding::new(
                Category::ResourcePool,
                "Timer pool overflow",
                Severity::Critical,
                FindingStatus::Fixed,
                "3 timers evicted",
            )
            .with_recommendation("Cancel timers on teardown"),
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["findings"][0]["category"], "resource-pool");
        assert_eq!(json["findings"][0]["severity"], "critical");
        assert_eq!(json["findings"][0]["status"], "fixed");
        assert_eq!(json["generated_at"], 42);
        assert_eq!(report.count(Severity::Critical), 1);
    }

    #[test]
    fn missing_recommendation_is_omitted() {
        let finding = Finding::new(
            Category::Memory,
            "Elevated memory usage",
            Severity::Medium,
            FindingStatus::Monitoring,
            "55.0%",
        );
        let json = serde_json::to_value(&finding).unwrap();
        assert!(json.get("recommendation").is_none());
    }
}
