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

//! Automatic remediation of critical findings.

use super::checks::{CRITICAL_MEMORY, LISTENER_OVERFLOW, TIMER_OVERFLOW};
use vigil_core::{Category, Finding, FindingStatus, Severity};
use vigil_data::ResourcePool;
use vigil_telemetry::MemorySampler;

fn is_fixable(finding: &Finding) -> bool {
    finding.severity == Severity::Critical
        && matches!(finding.category, Category::Memory | Category::ResourcePool)
}

/// Reclaims memory and flushes the pool when a critical memory or pool finding
/// is present, then re-verifies each such finding.
///
/// A finding is marked [`FindingStatus::Fixed`] only when a fresh measurement
/// confirms it. Returns the number of findings fixed.
pub(crate) fn auto_fix(
    findings: &mut [Finding],
    pool: &ResourcePool,
    sampler: &MemorySampler,
) -> usize {
    if !findings.iter().any(is_fixable) {
        return 0;
    }

    let flush_listeners = findings
        .iter()
        .filter(|f| is_fixable(f))
        .any(|f| f.category == Category::Memory || f.issue == LISTENER_OVERFLOW);

    log::info!("Critical findings present, running automatic remediation.");
    sampler.force_reclaim();
    pool.cleanup_all();
    if flush_listeners {
        pool.cleanup_listeners();
    }

    let fresh = sampler.sample();
    let stats = pool.stats();
    let critical_ratio = sampler.config().critical_ratio;

    let mut fixed = 0;
    for finding in findings.iter_mut().filter(|f| is_fixable(f)) {
        let verified = match finding.issue.as_str() {
            CRITICAL_MEMORY => fresh.is_some_and(|s| s.usage_ratio < critical_ratio),
            TIMER_OVERFLOW => stats.timeouts == 0 && stats.intervals == 0,
            LISTENER_OVERFLOW => stats.listeners == 0,
            _ => false,
        };
        if verified {
            finding.status = FindingStatus::Fixed;
            fixed += 1;
        } else {
            log::warn!("Remediation of '{}' could not be verified.", finding.issue);
        }
    }
    fixed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_core::config::{PoolConfig, SamplerConfig};
    use vigil_core::testing::{FakeClock, ScriptedProbe};
    use vigil_telemetry::InMemoryHistory;

    struct Target;

    fn fixture(probe: &ScriptedProbe) -> (ResourcePool, MemorySampler) {
        let clock = Arc::new(FakeClock::default());
        let pool = ResourcePool::new(PoolConfig::default(), clock.clone());
        let sampler = MemorySampler::new(
            SamplerConfig::default(),
            Arc::new(probe.clone()),
            clock,
            Arc::new(InMemoryHistory::new()),
        );
        (pool, sampler)
    }

    fn critical(category: Category, issue: &str) -> Finding {
        Finding::new(category, issue, Severity::Critical, FindingStatus::Detected, "")
    }

    #[test]
    fn non_critical_findings_are_left_alone() {
        let probe = ScriptedProbe::with_heap(80, 100);
        let (pool, sampler) = fixture(&probe);
        pool.schedule_timeout(|| Ok(()), 100);
        let mut findings = vec![Finding::new(
            Category::Memory,
            "High memory usage",
            Severity::High,
            FindingStatus::Detected,
            "",
        )];

        assert_eq!(auto_fix(&mut findings, &pool, &sampler), 0);
        assert_eq!(pool.stats().timeouts, 1);
        assert_eq!(probe.reclaim_calls(), 0);
    }

    #[test]
    fn memory_is_fixed_when_reclaim_helps() {
        let probe = ScriptedProbe::with_heap(95, 100);
        probe.support_reclaim(Some(40));
        let (pool, sampler) = fixture(&probe);
        let target = Arc::new(Target);
        pool.register_listener(&target, "resize", |_| Ok(()));
        let mut findings = vec![critical(Category::Memory, CRITICAL_MEMORY)];

        assert_eq!(auto_fix(&mut findings, &pool, &sampler), 1);
        assert_eq!(findings[0].status, FindingStatus::Fixed);
        assert_eq!(pool.stats().listeners, 0);
    }

    #[test]
    fn memory_stays_detected_when_reclaim_does_not_help() {
        let probe = ScriptedProbe::with_heap(95, 100);
        let (pool, sampler) = fixture(&probe);
        let mut findings = vec![critical(Category::Memory, CRITICAL_MEMORY)];

        assert_eq!(auto_fix(&mut findings, &pool, &sampler), 0);
        assert_eq!(findings[0].status, FindingStatus::Detected);
        assert_eq!(probe.reclaim_calls(), 1);
    }

    #[test]
    fn timer_overflow_flushes_timers_but_keeps_listeners() {
        let probe = ScriptedProbe::new();
        let (pool, sampler) = fixture(&probe);
        let target = Arc::new(Target);
        pool.register_listener(&target, "resize", |_| Ok(()));
        pool.schedule_interval(|| Ok(()), 1_000);
        let mut findings = vec![critical(Category::ResourcePool, TIMER_OVERFLOW)];

        assert_eq!(auto_fix(&mut findings, &pool, &sampler), 1);
        assert_eq!(findings[0].status, FindingStatus::Fixed);
        assert_eq!(pool.stats().intervals, 0);
        assert_eq!(pool.stats().listeners, 1);
    }
}
