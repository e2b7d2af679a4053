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

//! The per-category rules of the diagnostic sweep.
//!
//! Each check reads its inputs from a [`SweepContext`] and appends findings.
//! A check may fail; the sweep records the failure and moves on.

use vigil_core::config::DiagnosticsConfig;
use vigil_core::platform::{BuildProfile, EffectiveConnection};
use vigil_core::{Category, Finding, FindingStatus, PlatformProbe, Severity};
use vigil_data::PoolStats;
use vigil_telemetry::{MemorySample, PerformanceReport};

/// Issue title of the critical memory finding.
pub(crate) const CRITICAL_MEMORY: &str = "Critical memory usage";
/// Issue title of a timer eviction finding.
pub(crate) const TIMER_OVERFLOW: &str = "Resource pool overflow";
/// Issue title of a listener eviction finding.
pub(crate) const LISTENER_OVERFLOW: &str = "Listener pool overflow";
/// Issue title of the synthetic finding raised when a check fails.
pub(crate) const CHECK_FAILED: &str = "Diagnostic check failed";

/// Everything the checks look at, gathered once per sweep.
pub(crate) struct SweepContext<'a> {
    pub config: &'a DiagnosticsConfig,
    pub warning_ratio: f64,
    pub critical_ratio: f64,
    pub memory: Option<MemorySample>,
    pub leak_trend: Option<f64>,
    pub pool: PoolStats,
    pub timer_evictions: u64,
    pub listener_evictions: u64,
    pub performance: &'a PerformanceReport,
    pub probe: &'a dyn PlatformProbe,
}

pub(crate) type Check = fn(&SweepContext<'_>, &mut Vec<Finding>) -> anyhow::Result<()>;

/// Checks in sweep order.
pub(crate) const CHECKS: [(Category, Check); 6] = [
    (Category::Memory, check_memory),
    (Category::ResourcePool, check_resource_pool),
    (Category::Performance, check_performance),
    (Category::Dom, check_dom),
    (Category::Network, check_network),
    (Category::Runtime, check_runtime),
];

const MIB: f64 = 1024.0 * 1024.0;

pub(crate) fn check_memory(ctx: &SweepContext<'_>, out: &mut Vec<Finding>) -> anyhow::Result<()> {
    match ctx.memory {
        None => out.push(Finding::new(
            Category::Memory,
            "Memory usage unknown",
            Severity::Low,
            FindingStatus::Monitoring,
            "The platform does not expose heap statistics.",
        )),
        Some(sample) => {
            let pct = sample.usage_ratio * 100.0;
            let details = format!(
                "{:.1}% of limit ({:.1} MiB of {:.1} MiB)",
                pct,
                sample.used_bytes as f64 / MIB,
                sample.limit_bytes as f64 / MIB
            );
            if sample.usage_ratio >= ctx.critical_ratio {
                out.push(
                    Finding::new(
                        Category::Memory,
                        CRITICAL_MEMORY,
                        Severity::Critical,
                        FindingStatus::Detected,
                        details,
                    )
                    .with_recommendation("Close unused sessions and release cached data."),
                );
            } else if sample.usage_ratio >= ctx.warning_ratio {
                out.push(
                    Finding::new(
                        Category::Memory,
                        "High memory usage",
                        Severity::High,
                        FindingStatus::Detected,
                        details,
                    )
                    .with_recommendation("Reduce retained state in long-running views."),
                );
            } else if sample.usage_ratio > ctx.config.elevated_memory_ratio {
                out.push(Finding::new(
                    Category::Memory,
                    "Elevated memory usage",
                    Severity::Medium,
                    FindingStatus::Monitoring,
                    details,
                ));
            }
        }
    }

    if let Some(trend) = ctx.leak_trend {
        let severity = if trend > ctx.config.leak_trend_high_ratio {
            Some(Severity::High)
        } else if trend > ctx.config.leak_trend_ratio {
            Some(Severity::Medium)
        } else {
            None
        };
        if let Some(severity) = severity {
            out.push(
                Finding::new(
                    Category::Memory,
                    "Potential memory leak",
                    severity,
                    FindingStatus::Monitoring,
                    format!("Usage grew {:.0}% across the sample history.", trend * 100.0),
                )
                .with_recommendation("Check for listeners and timers that outlive their views."),
            );
        }
    }
    Ok(())
}

pub(crate) fn check_resource_pool(
    ctx: &SweepContext<'_>,
    out: &mut Vec<Finding>,
) -> anyhow::Result<()> {
    let pool = &ctx.pool;
    let recommendation = "Cancel timers and detach listeners when their owner goes away.";

    if ctx.timer_evictions > 0 {
        out.push(
            Finding::new(
                Category::ResourcePool,
                TIMER_OVERFLOW,
                Severity::Critical,
                FindingStatus::Detected,
                format!("{} timers evicted since the last sweep.", ctx.timer_evictions),
            )
            .with_recommendation(recommendation),
        );
    }
    if ctx.listener_evictions > 0 {
        out.push(
            Finding::new(
                Category::ResourcePool,
                LISTENER_OVERFLOW,
                Severity::Critical,
                FindingStatus::Detected,
                format!(
                    "{} listeners evicted since the last sweep.",
                    ctx.listener_evictions
                ),
            )
            .with_recommendation(recommendation),
        );
    }

    for (label, live, cap) in [
        ("Timeout", pool.timeouts, pool.max_timeouts),
        ("Interval", pool.intervals, pool.max_intervals),
    ] {
        if cap == 0 {
            continue;
        }
        let details = format!("{live} of {cap} slots in use.");
        if live >= cap {
            out.push(
                Finding::new(
                    Category::ResourcePool,
                    format!("{label} pool at capacity"),
                    Severity::High,
                    FindingStatus::Detected,
                    details,
                )
                .with_recommendation(recommendation),
            );
        } else if live as f64 >= cap as f64 * ctx.config.pool_usage_warn_ratio {
            out.push(Finding::new(
                Category::ResourcePool,
                format!("{label} pool nearly full"),
                Severity::Medium,
                FindingStatus::Monitoring,
                details,
            ));
        }
    }

    let listeners = pool.listeners;
    if listeners > ctx.config.listener_limit {
        out.push(
            Finding::new(
                Category::ResourcePool,
                "Excessive event listeners",
                Severity::High,
                FindingStatus::Detected,
                format!("{listeners} live listeners."),
            )
            .with_recommendation(recommendation),
        );
    } else if listeners > ctx.config.listener_warn {
        out.push(Finding::new(
            Category::ResourcePool,
            "Many event listeners",
            Severity::Medium,
            FindingStatus::Monitoring,
            format!("{listeners} live listeners."),
        ));
    }
    Ok(())
}

pub(crate) fn check_performance(
    ctx: &SweepContext<'_>,
    out: &mut Vec<Finding>,
) -> anyhow::Result<()> {
    let perf = ctx.performance;
    if perf.render_samples > 0 && perf.average_render_ms > ctx.config.slow_render_ms {
        out.push(
            Finding::new(
                Category::Performance,
                "Slow rendering",
                Severity::High,
                FindingStatus::Detected,
                format!(
                    "Average render {:.1}ms over {} renders.",
                    perf.average_render_ms, perf.render_samples
                ),
            )
            .with_recommendation("Memoize expensive components and avoid redundant renders."),
        );
    }

    let slow: Vec<String> = perf
        .slowest_components
        .iter()
        .filter(|c| c.worst_ms > ctx.config.slow_component_ms)
        .map(|c| format!("{} ({:.1}ms)", c.component, c.worst_ms))
        .collect();
    if !slow.is_empty() {
        out.push(
            Finding::new(
                Category::Performance,
                "Slow components",
                Severity::Medium,
                FindingStatus::Detected,
                slow.join(", "),
            )
            .with_recommendation("Profile the listed components and split their work."),
        );
    }

    if perf.total_bundle_bytes > ctx.config.bundle_size_limit_bytes {
        out.push(
            Finding::new(
                Category::Performance,
                "Large bundle size",
                Severity::Medium,
                FindingStatus::Detected,
                format!("{:.1} MiB loaded.", perf.total_bundle_bytes as f64 / MIB),
            )
            .with_recommendation("Lazy-load routes and trim unused dependencies."),
        );
    }
    Ok(())
}

pub(crate) fn check_dom(ctx: &SweepContext<'_>, out: &mut Vec<Finding>) -> anyhow::Result<()> {
    let Some(doc) = ctx.probe.document_stats()? else {
        return Ok(());
    };
    let config = ctx.config;

    if doc.node_count > config.dom_node_limit {
        out.push(
            Finding::new(
                Category::Dom,
                "Excessive document size",
                Severity::High,
                FindingStatus::Detected,
                format!("{} nodes.", doc.node_count),
            )
            .with_recommendation("Virtualize long lists and unmount hidden views."),
        );
    } else if doc.node_count > config.dom_node_warn {
        out.push(Finding::new(
            Category::Dom,
            "Large document",
            Severity::Medium,
            FindingStatus::Monitoring,
            format!("{} nodes.", doc.node_count),
        ));
    }
    if doc.max_depth > config.dom_depth_limit {
        out.push(
            Finding::new(
                Category::Dom,
                "Deep document nesting",
                Severity::Medium,
                FindingStatus::Detected,
                format!("Maximum depth {}.", doc.max_depth),
            )
            .with_recommendation("Flatten wrapper elements."),
        );
    }
    if doc.mutations_per_second > config.dom_mutation_limit {
        out.push(
            Finding::new(
                Category::Dom,
                "High document churn",
                Severity::Medium,
                FindingStatus::Detected,
                format!("{} mutations per second.", doc.mutations_per_second),
            )
            .with_recommendation("Batch updates instead of mutating per item."),
        );
    }
    Ok(())
}

pub(crate) fn check_network(ctx: &SweepContext<'_>, out: &mut Vec<Finding>) -> anyhow::Result<()> {
    if let Some(connection) = ctx.probe.connection() {
        if matches!(
            connection.effective_type,
            EffectiveConnection::TwoG | EffectiveConnection::Slow2g
        ) {
            out.push(
                Finding::new(
                    Category::Network,
                    "Slow network connection",
                    Severity::High,
                    FindingStatus::Detected,
                    format!("Effective connection {}.", connection.effective_type.name()),
                )
                .with_recommendation("Defer non-essential requests and lower media quality."),
            );
        }
        if connection.save_data {
            out.push(Finding::new(
                Category::Network,
                "Data saver enabled",
                Severity::Medium,
                FindingStatus::Monitoring,
                "The user asked for reduced data usage.",
            ));
        }
    }

    let failed = ctx.probe.failed_requests();
    if failed > 0 {
        out.push(
            Finding::new(
                Category::Network,
                "Failed network requests",
                Severity::Medium,
                FindingStatus::Detected,
                format!("{failed} recent requests failed."),
            )
            .with_recommendation("Retry idempotent requests with backoff."),
        );
    }
    Ok(())
}

pub(crate) fn check_runtime(ctx: &SweepContext<'_>, out: &mut Vec<Finding>) -> anyhow::Result<()> {
    if ctx.config.profile == BuildProfile::Production && ctx.probe.debug_tooling_active() {
        out.push(
            Finding::new(
                Category::Runtime,
                "Debug tooling active in production",
                Severity::Medium,
                FindingStatus::Detected,
                "Debugging tools are attached to a production build.",
            )
            .with_recommendation("Disable debugging hooks in shipped builds."),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::platform::{ConnectionInfo, DocumentStats};
    use vigil_core::testing::ScriptedProbe;
    use vigil_telemetry::ComponentTiming;

    fn sample(ratio: f64) -> MemorySample {
        let limit = 1_000_000u64;
        let used = (limit as f64 * ratio) as u64;
        MemorySample {
            timestamp: 0,
            used_bytes: used,
            total_bytes: used,
            limit_bytes: limit,
            usage_ratio: ratio,
        }
    }

    fn pool_stats() -> PoolStats {
        PoolStats {
            max_timeouts: 50,
            max_intervals: 20,
            max_listeners: 200,
            ..Default::default()
        }
    }

    fn run(check: Check, ctx: &SweepContext<'_>) -> Vec<Finding> {
        let mut out = Vec::new();
        check(ctx, &mut out).unwrap();
        out
    }

    macro_rules! context {
        ($config:expr, $perf:expr, $probe:expr) => {
            SweepContext {
                config: $config,
                warning_ratio: 0.75,
                critical_ratio: 0.90,
                memory: None,
                leak_trend: None,
                pool: pool_stats(),
                timer_evictions: 0,
                listener_evictions: 0,
                performance: $perf,
                probe: $probe,
            }
        };
    }

    #[test]
    fn memory_bands() {
        let config = DiagnosticsConfig::default();
        let perf = PerformanceReport::default();
        let probe = ScriptedProbe::new();
        let mut ctx = context!(&config, &perf, &probe);

        let severity_at = |ctx: &mut SweepContext<'_>, ratio: Option<f64>| {
            ctx.memory = ratio.map(sample);
            run(check_memory, ctx)
                .first()
                .map(|f| (f.severity, f.status))
        };
        assert_eq!(
            severity_at(&mut ctx, None),
            Some((Severity::Low, FindingStatus::Monitoring))
        );
        assert_eq!(
            severity_at(&mut ctx, Some(0.95)),
            Some((Severity::Critical, FindingStatus::Detected))
        );
        assert_eq!(
            severity_at(&mut ctx, Some(0.80)),
            Some((Severity::High, FindingStatus::Detected))
        );
        assert_eq!(
            severity_at(&mut ctx, Some(0.60)),
            Some((Severity::Medium, FindingStatus::Monitoring))
        );
        assert_eq!(severity_at(&mut ctx, Some(0.30)), None);
    }

    #[test]
    fn leak_trend_bands() {
        let config = DiagnosticsConfig::default();
        let perf = PerformanceReport::default();
        let probe = ScriptedProbe::new();
        let mut ctx = context!(&config, &perf, &probe);
        ctx.memory = Some(sample(0.2));

        ctx.leak_trend = Some(0.05);
        assert!(run(check_memory, &ctx).is_empty());
        ctx.leak_trend = Some(0.15);
        assert_eq!(run(check_memory, &ctx)[0].severity, Severity::Medium);
        ctx.leak_trend = Some(0.30);
        let findings = run(check_memory, &ctx);
        assert_eq!(findings[0].issue, "Potential memory leak");
        assert_eq!(findings[0].severity, Severity::High);
    }

    #[test]
    fn pool_evictions_are_critical() {
        let config = DiagnosticsConfig::default();
        let perf = PerformanceReport::default();
        let probe = ScriptedProbe::new();
        let mut ctx = context!(&config, &perf, &probe);
        ctx.timer_evictions = 25;
        ctx.listener_evictions = 3;

        let findings = run(check_resource_pool, &ctx);
        let critical: Vec<_> = findings
            .iter()
            .filter(|f| f.severity == Severity::Critical)
            .map(|f| f.issue.as_str())
            .collect();
        assert_eq!(critical, vec![TIMER_OVERFLOW, LISTENER_OVERFLOW]);
    }

    #[test]
    fn pool_fill_levels() {
        let config = DiagnosticsConfig::default();
        let perf = PerformanceReport::default();
        let probe = ScriptedProbe::new();
        let mut ctx = context!(&config, &perf, &probe);
        ctx.pool.timeouts = 50;
        ctx.pool.intervals = 17;
        ctx.pool.listeners = 60;

        let findings = run(check_resource_pool, &ctx);
        let summary: Vec<_> = findings
            .iter()
            .map(|f| (f.issue.as_str(), f.severity))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Timeout pool at capacity", Severity::High),
                ("Interval pool nearly full", Severity::Medium),
                ("Many event listeners", Severity::Medium),
            ]
        );

        ctx.pool.listeners = 101;
        assert!(run(check_resource_pool, &ctx)
            .iter()
            .any(|f| f.issue == "Excessive event listeners" && f.severity == Severity::High));
    }

    #[test]
    fn performance_rules() {
        let config = DiagnosticsConfig::default();
        let perf = PerformanceReport {
            average_render_ms: 140.0,
            render_samples: 10,
            slowest_components: vec![
                ComponentTiming {
                    component: "Chart".into(),
                    worst_ms: 180.0,
                },
                ComponentTiming {
                    component: "Badge".into(),
                    worst_ms: 4.0,
                },
            ],
            total_bundle_bytes: 6 * 1024 * 1024,
        };
        let probe = ScriptedProbe::new();
        let ctx = context!(&config, &perf, &probe);

        let findings = run(check_performance, &ctx);
        assert_eq!(findings.len(), 3);
        assert_eq!(findings[0].severity, Severity::High);
        assert!(findings[1].details.contains("Chart"));
        assert!(!findings[1].details.contains("Badge"));
        assert_eq!(findings[2].issue, "Large bundle size");
    }

    #[test]
    fn dom_rules() {
        let config = DiagnosticsConfig::default();
        let perf = PerformanceReport::default();
        let probe = ScriptedProbe::new();
        probe.set_document(Some(DocumentStats {
            node_count: 12_000,
            max_depth: 25,
            mutations_per_second: 150,
        }));
        let ctx = context!(&config, &perf, &probe);

        let severities: Vec<_> = run(check_dom, &ctx).iter().map(|f| f.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::High, Severity::Medium, Severity::Medium]
        );

        probe.set_document(Some(DocumentStats {
            node_count: 6_000,
            max_depth: 5,
            mutations_per_second: 1,
        }));
        let findings = run(check_dom, &ctx);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].status, FindingStatus::Monitoring);
    }

    #[test]
    fn dom_failure_propagates() {
        let config = DiagnosticsConfig::default();
        let perf = PerformanceReport::default();
        let probe = ScriptedProbe::new();
        probe.fail_document("document detached");
        let ctx = context!(&config, &perf, &probe);

        let mut out = Vec::new();
        assert!(check_dom(&ctx, &mut out).is_err());
    }

    #[test]
    fn network_rules() {
        let config = DiagnosticsConfig::default();
        let perf = PerformanceReport::default();
        let probe = ScriptedProbe::new();
        probe.set_connection(Some(ConnectionInfo {
            effective_type: EffectiveConnection::TwoG,
            save_data: true,
        }));
        probe.set_failed_requests(2);
        let ctx = context!(&config, &perf, &probe);

        let findings = run(check_network, &ctx);
        let severities: Vec<_> = findings.iter().map(|f| f.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::High, Severity::Medium, Severity::Medium]
        );
        assert_eq!(findings[1].status, FindingStatus::Monitoring);
    }

    #[test]
    fn debug_tooling_only_matters_in_production() {
        let probe = ScriptedProbe::new();
        probe.set_debug_tooling(true);
        let perf = PerformanceReport::default();

        let production = DiagnosticsConfig {
            profile: BuildProfile::Production,
            ..Default::default()
        };
        assert_eq!(run(check_runtime, &context!(&production, &perf, &probe)).len(), 1);

        let development = DiagnosticsConfig {
            profile: BuildProfile::Development,
            ..Default::default()
        };
        assert!(run(check_runtime, &context!(&development, &perf, &probe)).is_empty());
    }
}
