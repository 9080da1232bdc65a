//! Risk scoring and deployment recommendation for a set of detected issues.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{
    Environment, Issue, PreDeploymentAnalysis, Recommendation, RollbackPlan, RollbackStrategy,
    Severity,
};
use crate::policy::{PipelineConfig, PreDeploymentPolicy};

const MAX_RISK_SCORE: u32 = 100;
const CAUTION_SCORE: u32 = 30;

const BASE_CONFIDENCE: i64 = 90;
const PRODUCTION_PENALTY: i64 = 5;
const PER_ISSUE_PENALTY: i64 = 3;
const MAX_ISSUE_PENALTY: i64 = 20;
const PER_CRITICAL_PENALTY: i64 = 10;
const MIN_CONFIDENCE: i64 = 60;

fn severity_weight(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 40,
        Severity::High => 25,
        Severity::Medium => 15,
        Severity::Low => 5,
    }
}

fn fix_duration_secs(severity: Severity) -> u64 {
    match severity {
        Severity::Critical => 300,
        Severity::High => 180,
        Severity::Medium => 120,
        Severity::Low => 60,
    }
}

/// Sum of severity weights, capped at 100.
pub fn risk_score(issues: &[Issue]) -> u32 {
    issues
        .iter()
        .fold(0u32, |score, issue| {
            score.saturating_add(severity_weight(issue.severity))
        })
        .min(MAX_RISK_SCORE)
}

pub fn recommend(issues: &[Issue], risk_score: u32, policy: &PreDeploymentPolicy) -> Recommendation {
    let has = |severity: Severity| issues.iter().any(|i| i.severity == severity);

    if has(Severity::Critical) && policy.auto_block_on_critical {
        Recommendation::BlockDeployment
    } else if risk_score > policy.risk_threshold {
        Recommendation::FixThenDeploy
    } else if has(Severity::High) || risk_score > CAUTION_SCORE {
        Recommendation::ProceedWithCaution
    } else {
        Recommendation::Proceed
    }
}

/// Confidence in the analysis itself, floored at 60.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn ai_confidence(environment: Environment, issues: &[Issue]) -> u32 {
    let issue_count = i64::try_from(issues.len()).unwrap_or(i64::MAX);
    let critical_count = i64::try_from(
        issues
            .iter()
            .filter(|i| i.severity == Severity::Critical)
            .count(),
    )
    .unwrap_or(i64::MAX);

    let mut confidence = BASE_CONFIDENCE;
    if environment == Environment::Production {
        confidence -= PRODUCTION_PENALTY;
    }
    confidence -= issue_count.saturating_mul(PER_ISSUE_PENALTY).min(MAX_ISSUE_PENALTY);
    confidence = confidence.saturating_sub(critical_count.saturating_mul(PER_CRITICAL_PENALTY));

    confidence.max(MIN_CONFIDENCE) as u32
}

/// Total time to apply all auto-fixable issues, in seconds.
pub fn estimated_fix_secs(issues: &[Issue]) -> u64 {
    issues
        .iter()
        .filter(|i| i.auto_fix_available)
        .map(|i| fix_duration_secs(i.severity))
        .sum()
}

/// Renders seconds as `XmYs`, dropping the minutes when there are none.
pub fn format_duration(total_secs: u64) -> String {
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes == 0 {
        format!("{seconds}s")
    } else {
        format!("{minutes}m{seconds}s")
    }
}

fn rollback_plan(issues: &[Issue], estimated_fix_time: &str) -> RollbackPlan {
    let strategy = if issues.iter().all(|i| i.auto_fix_available) {
        RollbackStrategy::Automated
    } else {
        RollbackStrategy::Manual
    };

    RollbackPlan {
        available: true,
        strategy,
        estimated_time: estimated_fix_time.to_string(),
    }
}

/// Produces a new analysis. Persisting it is up to the caller.
pub fn analyze(
    environment: Environment,
    issues: Vec<Issue>,
    config: &PipelineConfig,
) -> PreDeploymentAnalysis {
    let policy = &config.pre_deployment;
    let risk_score = risk_score(&issues);
    let recommendation = recommend(&issues, risk_score, policy);
    let ai_confidence = ai_confidence(environment, &issues);
    let estimated_fix_time = format_duration(estimated_fix_secs(&issues));
    let rollback_plan = rollback_plan(&issues, &estimated_fix_time);

    PreDeploymentAnalysis {
        analysis_id: format!("analysis-{}", Uuid::new_v4()),
        timestamp: Utc::now(),
        environment,
        risk_score,
        issues,
        recommendation,
        ai_confidence,
        meets_required_confidence: ai_confidence >= policy.required_confidence,
        estimated_fix_time,
        rollback_plan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn issue(severity: Severity) -> Issue {
        Issue {
            issue_type: format!("{severity}-issue"),
            severity,
            description: String::new(),
            affected_resources: Vec::new(),
            auto_fix_available: true,
            estimated_impact: String::new(),
        }
    }

    fn issues(severities: &[Severity]) -> Vec<Issue> {
        severities.iter().copied().map(issue).collect()
    }

    fn policy(risk_threshold: u32, auto_block_on_critical: bool) -> PreDeploymentPolicy {
        PreDeploymentPolicy {
            risk_threshold,
            required_confidence: 75,
            auto_block_on_critical,
        }
    }

    fn severity_strategy() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Low),
            Just(Severity::Medium),
            Just(Severity::High),
            Just(Severity::Critical),
        ]
    }

    fn environment_strategy() -> impl Strategy<Value = Environment> {
        prop_oneof![
            Just(Environment::Development),
            Just(Environment::Staging),
            Just(Environment::Production),
        ]
    }

    mod risk_score {
        use super::*;

        #[test]
        fn empty_list_scores_zero() {
            assert_eq!(risk_score(&[]), 0);
        }

        #[test]
        fn sums_severity_weights() {
            let list = issues(&[Severity::Low, Severity::Medium, Severity::High]);
            assert_eq!(risk_score(&list), 45);
        }

        #[test]
        fn caps_at_one_hundred() {
            let list = issues(&[Severity::Critical; 4]);
            assert_eq!(risk_score(&list), 100);
        }
    }

    mod recommendation {
        use super::*;

        #[test]
        fn critical_issue_blocks_when_auto_block_set() {
            let config = PipelineConfig::new("web", Environment::Staging);
            let analysis = analyze(Environment::Staging, issues(&[Severity::Critical]), &config);
            assert_eq!(analysis.risk_score, 40);
            assert_eq!(analysis.recommendation, Recommendation::BlockDeployment);
        }

        #[test]
        fn low_risk_issues_proceed() {
            let list = issues(&[Severity::Medium, Severity::Low]);
            let score = risk_score(&list);
            assert_eq!(score, 20);
            assert_eq!(recommend(&list, score, &policy(70, true)), Recommendation::Proceed);
        }

        #[test]
        fn critical_without_auto_block_falls_through() {
            let list = issues(&[Severity::Critical]);
            let score = risk_score(&list);
            assert_eq!(
                recommend(&list, score, &policy(70, false)),
                Recommendation::ProceedWithCaution
            );
            assert_eq!(
                recommend(&list, score, &policy(30, false)),
                Recommendation::FixThenDeploy
            );
        }

        #[test]
        fn score_above_threshold_requires_fixes() {
            let list = issues(&[Severity::High, Severity::High, Severity::Medium]);
            assert_eq!(
                recommend(&list, risk_score(&list), &policy(60, true)),
                Recommendation::FixThenDeploy
            );
        }

        #[test]
        fn high_issue_triggers_caution() {
            let list = issues(&[Severity::High]);
            assert_eq!(
                recommend(&list, risk_score(&list), &policy(70, true)),
                Recommendation::ProceedWithCaution
            );
        }

        #[test]
        fn moderate_score_triggers_caution() {
            // 15 + 15 + 5 = 35 > 30, no high issue
            let list = issues(&[Severity::Medium, Severity::Medium, Severity::Low]);
            assert_eq!(
                recommend(&list, risk_score(&list), &policy(70, true)),
                Recommendation::ProceedWithCaution
            );
        }
    }

    mod confidence {
        use super::*;

        #[test]
        fn no_issues_outside_production() {
            assert_eq!(ai_confidence(Environment::Staging, &[]), 90);
        }

        #[test]
        fn production_penalty() {
            assert_eq!(ai_confidence(Environment::Production, &[]), 85);
        }

        #[test]
        fn issue_penalty_is_capped() {
            let list = issues(&[Severity::Low; 10]);
            assert_eq!(ai_confidence(Environment::Development, &list), 70);
        }

        #[test]
        fn critical_penalty_and_floor() {
            // 90 - 5 - 6 - 20 = 59 -> floored
            let list = issues(&[Severity::Critical, Severity::Critical]);
            assert_eq!(ai_confidence(Environment::Production, &list), 60);

            // 90 - 3 - 10 = 77
            let list = issues(&[Severity::Critical]);
            assert_eq!(ai_confidence(Environment::Staging, &list), 77);
        }
    }

    mod fix_time {
        use super::*;

        #[test]
        fn formats_minutes_and_seconds() {
            assert_eq!(format_duration(0), "0s");
            assert_eq!(format_duration(45), "45s");
            assert_eq!(format_duration(60), "1m0s");
            assert_eq!(format_duration(420), "7m0s");
            assert_eq!(format_duration(125), "2m5s");
        }

        #[test]
        fn only_auto_fixable_issues_count() {
            let mut list = issues(&[Severity::Critical, Severity::High]);
            list[1].auto_fix_available = false;
            assert_eq!(estimated_fix_secs(&list), 300);
        }

        #[test]
        fn rollback_is_manual_when_any_issue_needs_hands() {
            let config = PipelineConfig::new("web", Environment::Staging);
            let mut list = issues(&[Severity::Low, Severity::Medium]);
            list[0].auto_fix_available = false;

            let analysis = analyze(Environment::Staging, list, &config);
            assert_eq!(analysis.estimated_fix_time, "2m0s");
            assert!(analysis.rollback_plan.available);
            assert_eq!(analysis.rollback_plan.strategy, RollbackStrategy::Manual);
        }
    }

    #[test]
    fn test_required_confidence_flag() {
        let mut config = PipelineConfig::new("web", Environment::Production);
        config.pre_deployment.required_confidence = 80;

        let analysis = analyze(Environment::Production, Vec::new(), &config);
        assert_eq!(analysis.ai_confidence, 85);
        assert!(analysis.meets_required_confidence);

        let analysis = analyze(Environment::Production, issues(&[Severity::Critical]), &config);
        assert!(!analysis.meets_required_confidence);
    }

    proptest! {
        #[test]
        fn score_stays_in_range(severities in prop::collection::vec(severity_strategy(), 0..40)) {
            let score = risk_score(&issues(&severities));
            prop_assert!(score <= 100);
        }

        #[test]
        fn adding_an_issue_never_lowers_score(
            severities in prop::collection::vec(severity_strategy(), 0..20),
            extra in severity_strategy(),
        ) {
            let before = risk_score(&issues(&severities));
            let mut more = severities.clone();
            more.push(extra);
            prop_assert!(risk_score(&issues(&more)) >= before);
        }

        #[test]
        fn raising_a_severity_never_lowers_score(
            severities in prop::collection::vec(severity_strategy(), 1..20),
            index in any::<prop::sample::Index>(),
        ) {
            let i = index.index(severities.len());
            let before = risk_score(&issues(&severities));
            let mut raised = severities.clone();
            raised[i] = Severity::Critical;
            prop_assert!(risk_score(&issues(&raised)) >= before);
        }

        #[test]
        fn block_iff_critical_and_auto_block(
            severities in prop::collection::vec(severity_strategy(), 0..10),
            threshold in 0u32..=100,
            auto_block in any::<bool>(),
        ) {
            let list = issues(&severities);
            let recommendation = recommend(&list, risk_score(&list), &policy(threshold, auto_block));
            let has_critical = severities.contains(&Severity::Critical);
            prop_assert_eq!(
                recommendation == Recommendation::BlockDeployment,
                has_critical && auto_block
            );
        }

        #[test]
        fn confidence_stays_within_bounds(
            severities in prop::collection::vec(severity_strategy(), 0..50),
            environment in environment_strategy(),
        ) {
            let confidence = ai_confidence(environment, &issues(&severities));
            prop_assert!((60..=100).contains(&confidence));
        }
    }
}
