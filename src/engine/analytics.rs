use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    FixExecution, FixStatus, GitOpsTracking, PreDeploymentAnalysis, Recommendation,
};

const MIN_HEALTHY_SUCCESS_RATE: f64 = 85.0;
const MAX_APPROVAL_RATIO: f64 = 0.30;
const MAX_BLOCK_RATIO: f64 = 0.10;

/// Everything recorded for one pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineRecords {
    pub analyses: Vec<PreDeploymentAnalysis>,
    pub executions: Vec<FixExecution>,
    pub tracking: Option<GitOpsTracking>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub generated_at: DateTime<Utc>,
    pub total_pipelines: usize,
    pub total_analyses: usize,
    pub total_executions: usize,
    pub total_fixes: usize,
    pub average_success_rate: f64,
    pub blocked_deployments: usize,
    pub auto_applied_fixes: usize,
    pub approval_gated_fixes: usize,
    pub total_commits: usize,
    pub recommendations: Vec<String>,
}

#[allow(clippy::cast_precision_loss)]
fn ratio(count: usize, total: usize) -> f64 {
    if total > 0 {
        count as f64 / total as f64
    } else {
        0.0
    }
}

/// Aggregates the history of every configured pipeline.
pub fn summarize(pipelines: &[PipelineRecords]) -> AnalyticsSummary {
    let analyses = pipelines.iter().flat_map(|p| &p.analyses);
    let executions: Vec<&FixExecution> = pipelines.iter().flat_map(|p| &p.executions).collect();
    let fixes = executions.iter().flat_map(|e| &e.fixes);

    let total_analyses: usize = pipelines.iter().map(|p| p.analyses.len()).sum();
    let blocked_deployments = analyses
        .filter(|a| a.recommendation == Recommendation::BlockDeployment)
        .count();

    let total_fixes: usize = executions.iter().map(|e| e.fixes.len()).sum();
    let auto_applied_fixes = fixes.clone().filter(|f| f.auto_applied).count();
    let approval_gated_fixes = fixes.filter(|f| f.approval_required).count();

    // Runs where every fix waited for approval have no meaningful rate.
    let rated: Vec<&FixExecution> = executions
        .iter()
        .copied()
        .filter(|e| {
            e.fixes
                .iter()
                .any(|f| matches!(f.status, FixStatus::Completed | FixStatus::Failed))
        })
        .collect();

    #[allow(clippy::cast_precision_loss)]
    let average_success_rate = if rated.is_empty() {
        0.0
    } else {
        rated.iter().map(|e| f64::from(e.success_rate)).sum::<f64>() / rated.len() as f64
    };

    let total_commits: usize = pipelines
        .iter()
        .filter_map(|p| p.tracking.as_ref())
        .map(|t| t.commits.len())
        .sum();

    let mut summary = AnalyticsSummary {
        generated_at: Utc::now(),
        total_pipelines: pipelines.len(),
        total_analyses,
        total_executions: executions.len(),
        total_fixes,
        average_success_rate,
        blocked_deployments,
        auto_applied_fixes,
        approval_gated_fixes,
        total_commits,
        recommendations: Vec::new(),
    };
    summary.recommendations = recommendations(&summary, rated.len());
    summary
}

fn recommendations(summary: &AnalyticsSummary, rated_executions: usize) -> Vec<String> {
    let mut advice = Vec::new();

    if rated_executions > 0 && summary.average_success_rate < MIN_HEALTHY_SUCCESS_RATE {
        advice.push(format!(
            "Average fix success rate is {:.1}% (below {MIN_HEALTHY_SUCCESS_RATE:.0}%): raise confidence thresholds",
            summary.average_success_rate
        ));
    }

    #[allow(clippy::cast_precision_loss)]
    let approval_limit = summary.auto_applied_fixes as f64 * MAX_APPROVAL_RATIO;
    #[allow(clippy::cast_precision_loss)]
    let gated = summary.approval_gated_fixes as f64;
    if summary.approval_gated_fixes > 0 && gated > approval_limit {
        advice.push(format!(
            "{} fixes waited for approval against {} auto-applied: review the approval policy",
            summary.approval_gated_fixes, summary.auto_applied_fixes
        ));
    }

    if ratio(summary.blocked_deployments, summary.total_analyses) > MAX_BLOCK_RATIO {
        advice.push(format!(
            "{} of {} analyses blocked deployment: investigate recurring issues",
            summary.blocked_deployments, summary.total_analyses
        ));
    }

    if advice.is_empty() {
        advice.push("Remediation pipeline is healthy; no policy changes suggested".to_string());
    }

    advice
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::models::{
        Environment, Fix, FixStatus, OverallStatus, RollbackPlan, RollbackStrategy, Severity,
    };

    fn analysis(recommendation: Recommendation) -> PreDeploymentAnalysis {
        PreDeploymentAnalysis {
            analysis_id: "analysis-1".to_string(),
            timestamp: Utc::now(),
            environment: Environment::Staging,
            risk_score: 0,
            issues: Vec::new(),
            recommendation,
            ai_confidence: 90,
            meets_required_confidence: true,
            estimated_fix_time: "0s".to_string(),
            rollback_plan: RollbackPlan {
                available: true,
                strategy: RollbackStrategy::Automated,
                estimated_time: "0s".to_string(),
            },
        }
    }

    fn fix(auto_applied: bool, approval_required: bool) -> Fix {
        Fix {
            fix_id: "fix-1".to_string(),
            fix_type: "OOMKilled".to_string(),
            description: String::new(),
            status: FixStatus::Completed,
            confidence: 95,
            risk_level: Severity::Medium,
            auto_applied,
            approval_required,
            rollback_available: true,
            execution_time_ms: None,
        }
    }

    fn execution(success_rate: u32, fixes: Vec<Fix>) -> FixExecution {
        FixExecution {
            execution_id: "execution-1".to_string(),
            pipeline_id: "web".to_string(),
            analysis_id: "analysis-1".to_string(),
            timestamp: Utc::now(),
            fixes,
            overall_status: OverallStatus::Completed,
            success_rate,
            gitops_commit: None,
        }
    }

    #[test]
    fn test_empty_history() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_pipelines, 0);
        assert_eq!(summary.average_success_rate, 0.0);
        assert_eq!(summary.recommendations.len(), 1);
        assert!(summary.recommendations[0].contains("healthy"));
    }

    #[test]
    fn test_counts_across_pipelines() {
        let web = PipelineRecords {
            analyses: vec![
                analysis(Recommendation::Proceed),
                analysis(Recommendation::BlockDeployment),
            ],
            executions: vec![execution(100, vec![fix(true, false), fix(true, false)])],
            tracking: None,
        };
        let api = PipelineRecords {
            analyses: vec![analysis(Recommendation::FixThenDeploy)],
            executions: vec![execution(50, vec![fix(false, true)])],
            tracking: None,
        };

        let summary = summarize(&[web, api]);
        assert_eq!(summary.total_pipelines, 2);
        assert_eq!(summary.total_analyses, 3);
        assert_eq!(summary.total_executions, 2);
        assert_eq!(summary.total_fixes, 3);
        assert_eq!(summary.average_success_rate, 75.0);
        assert_eq!(summary.blocked_deployments, 1);
        assert_eq!(summary.auto_applied_fixes, 2);
        assert_eq!(summary.approval_gated_fixes, 1);
        assert_eq!(summary.total_commits, 0);
    }

    #[test]
    fn test_all_advice_triggers() {
        let records = PipelineRecords {
            analyses: vec![
                analysis(Recommendation::BlockDeployment),
                analysis(Recommendation::Proceed),
            ],
            executions: vec![execution(50, vec![fix(true, false), fix(false, true)])],
            tracking: None,
        };

        let advice = summarize(&[records]).recommendations;
        assert_eq!(advice.len(), 3);
        assert!(advice[0].contains("raise confidence thresholds"));
        assert!(advice[1].contains("review the approval policy"));
        assert!(advice[2].contains("investigate recurring issues"));
    }

    #[test]
    fn test_unexecuted_runs_do_not_lower_average() {
        let mut waiting = fix(false, true);
        waiting.status = FixStatus::RequiresApproval;
        let records = PipelineRecords {
            analyses: vec![analysis(Recommendation::Proceed)],
            executions: vec![
                execution(100, vec![fix(true, false)]),
                execution(0, vec![waiting.clone()]),
                execution(0, Vec::new()),
            ],
            tracking: None,
        };

        let summary = summarize(&[records]);
        assert_eq!(summary.total_executions, 3);
        assert_eq!(summary.average_success_rate, 100.0);
        assert!(!summary
            .recommendations
            .iter()
            .any(|r| r.contains("raise confidence thresholds")));

        let only_waiting = PipelineRecords {
            executions: vec![execution(0, vec![waiting])],
            ..PipelineRecords::default()
        };
        let summary = summarize(&[only_waiting]);
        assert_eq!(summary.average_success_rate, 0.0);
        assert!(!summary
            .recommendations
            .iter()
            .any(|r| r.contains("raise confidence thresholds")));
    }

    #[test]
    fn test_failed_fixes_count_toward_average() {
        let mut failed = fix(true, false);
        failed.status = FixStatus::Failed;
        let records = PipelineRecords {
            executions: vec![execution(100, vec![fix(true, false)]), execution(0, vec![failed])],
            ..PipelineRecords::default()
        };

        let summary = summarize(&[records]);
        assert_eq!(summary.average_success_rate, 50.0);
        assert!(summary.recommendations[0].contains("raise confidence thresholds"));
    }

    #[test]
    fn test_approval_ratio_within_limit() {
        let mut fixes: Vec<_> = (0..10).map(|_| fix(true, false)).collect();
        fixes.push(fix(false, true));
        let records = PipelineRecords {
            analyses: vec![analysis(Recommendation::Proceed)],
            executions: vec![execution(100, fixes)],
            tracking: None,
        };

        let advice = summarize(&[records]).recommendations;
        assert_eq!(advice.len(), 1);
        assert!(advice[0].contains("healthy"));
    }
}
