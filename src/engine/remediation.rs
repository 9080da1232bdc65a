//! Bounded-concurrency execution of synthesized fixes.
//!
//! Approval gating is decided up front. The remaining fixes are scheduled on
//! a worker pool of `max_concurrent_fixes` permits and awaited together, so the
//! returned list keeps the original order no matter which fix finishes first.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;

use crate::models::{Fix, FixStatus, OverallStatus};
use crate::policy::RemediationPolicy;

/// Result reported by a remediation backend for a single fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixOutcome {
    pub succeeded: bool,
    pub duration: Duration,
}

/// Performs (or models) the real-world action behind a fix.
///
/// Failures are reported through [`FixOutcome::succeeded`]; they are expected
/// results, not errors.
#[async_trait]
pub trait OutcomePredictor: Send + Sync {
    async fn remediate(&self, fix: &Fix) -> FixOutcome;
}

/// Stand-in backend with a fixed success probability and random latency.
pub struct SimulatedBackend {
    reliability: f64,
    min_latency_ms: u64,
    max_latency_ms: u64,
    rng: Mutex<StdRng>,
}

impl SimulatedBackend {
    pub fn new(reliability: f64, min_latency_ms: u64, max_latency_ms: u64, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self {
            reliability: reliability.clamp(0.0, 1.0),
            min_latency_ms: min_latency_ms.min(max_latency_ms),
            max_latency_ms,
            rng: Mutex::new(rng),
        }
    }
}

#[async_trait]
impl OutcomePredictor for SimulatedBackend {
    async fn remediate(&self, fix: &Fix) -> FixOutcome {
        let (succeeded, latency_ms) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            (
                rng.gen_bool(self.reliability),
                rng.gen_range(self.min_latency_ms..=self.max_latency_ms),
            )
        };

        let duration = Duration::from_millis(latency_ms);
        tokio::time::sleep(duration).await;

        debug!(
            "Simulated remediation of {} ({}) {} after {latency_ms}ms",
            fix.fix_id,
            fix.fix_type,
            if succeeded { "succeeded" } else { "failed" }
        );

        FixOutcome {
            succeeded,
            duration,
        }
    }
}

/// Outcome of one executor run.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub fixes: Vec<Fix>,
    pub success_rate: u32,
    pub overall_status: OverallStatus,
}

pub struct RemediationExecutor {
    predictor: Arc<dyn OutcomePredictor>,
}

impl RemediationExecutor {
    pub fn new(predictor: Arc<dyn OutcomePredictor>) -> Self {
        Self { predictor }
    }

    /// Resolves every fix and computes the aggregate status.
    ///
    /// Fixes requiring approval are left at `requires-approval` unless
    /// `auto_approve` is set. Aggregates are computed only after every
    /// scheduled fix has resolved.
    pub async fn execute(
        &self,
        mut fixes: Vec<Fix>,
        policy: &RemediationPolicy,
        auto_approve: bool,
    ) -> ExecutionReport {
        for fix in &mut fixes {
            fix.status = if fix.approval_required && !auto_approve {
                FixStatus::RequiresApproval
            } else {
                FixStatus::Pending
            };
        }

        let scheduled = fixes
            .iter()
            .filter(|f| f.status == FixStatus::Pending)
            .count();
        let workers = policy.max_concurrent_fixes.max(1);
        info!(
            "Executing {scheduled} of {} fixes with up to {workers} in parallel",
            fixes.len()
        );

        let semaphore = Semaphore::new(workers);
        let futures: Vec<_> = fixes
            .into_iter()
            .map(|fix| self.run_fix(fix, &semaphore))
            .collect();

        let fixes = futures::future::join_all(futures).await;

        let report = ExecutionReport {
            success_rate: success_rate(&fixes),
            overall_status: overall_status(&fixes),
            fixes,
        };

        info!(
            "Execution finished: {} ({}% success)",
            report.overall_status, report.success_rate
        );

        report
    }

    async fn run_fix(&self, mut fix: Fix, semaphore: &Semaphore) -> Fix {
        if fix.status != FixStatus::Pending {
            debug!("Skipping {} awaiting approval", fix.fix_id);
            return fix;
        }

        // One permit per executing fix
        let Ok(_permit) = semaphore.acquire().await else {
            warn!("Worker pool closed before {} could run", fix.fix_id);
            fix.status = FixStatus::Failed;
            return fix;
        };

        fix.status = FixStatus::Executing;
        let outcome = self.predictor.remediate(&fix).await;

        fix.status = if outcome.succeeded {
            FixStatus::Completed
        } else {
            FixStatus::Failed
        };
        fix.execution_time_ms =
            Some(u64::try_from(outcome.duration.as_millis()).unwrap_or(u64::MAX));
        fix
    }
}

fn count(fixes: &[Fix], status: FixStatus) -> usize {
    fixes.iter().filter(|f| f.status == status).count()
}

/// Percentage of completed fixes over all fixes, rounded; 0 when nothing ran.
pub fn success_rate(fixes: &[Fix]) -> u32 {
    let completed = count(fixes, FixStatus::Completed);
    let executed = completed + count(fixes, FixStatus::Failed);
    if executed == 0 {
        return 0;
    }

    let total = fixes.len();
    // Integer rounding of 100 * completed / total
    let rate = (200 * completed + total) / (2 * total);
    u32::try_from(rate).unwrap_or(100)
}

pub fn overall_status(fixes: &[Fix]) -> OverallStatus {
    let completed = count(fixes, FixStatus::Completed);
    let failed = count(fixes, FixStatus::Failed);

    if count(fixes, FixStatus::RequiresApproval) > 0 {
        OverallStatus::AwaitingApproval
    } else if count(fixes, FixStatus::Executing) > 0 {
        OverallStatus::InProgress
    } else if failed > 0 && completed > 0 {
        OverallStatus::PartialSuccess
    } else if failed > 0 {
        OverallStatus::Failed
    } else {
        OverallStatus::Completed
    }
}
