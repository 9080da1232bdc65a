use uuid::Uuid;

use crate::models::{Environment, Fix, FixStatus, Issue, Severity};
use crate::policy::RemediationPolicy;

/// Base confidence of a generated fix. Simpler, lower-severity fixes are
/// trusted more than critical ones.
pub fn base_confidence(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 85,
        Severity::High => 90,
        Severity::Medium => 95,
        Severity::Low => 98,
    }
}

/// One candidate fix per issue, in issue order.
pub fn synthesize(issues: &[Issue], policy: &RemediationPolicy, environment: Environment) -> Vec<Fix> {
    issues
        .iter()
        .map(|issue| synthesize_fix(issue, policy, environment))
        .collect()
}

fn synthesize_fix(issue: &Issue, policy: &RemediationPolicy, environment: Environment) -> Fix {
    let confidence = base_confidence(issue.severity);
    let approval_required = policy.requires_approval(issue.severity, environment);
    let auto_applied = !approval_required && confidence >= policy.confidence_threshold;

    Fix {
        fix_id: format!("fix-{}", Uuid::new_v4()),
        fix_type: issue.issue_type.clone(),
        description: issue.description.clone(),
        status: if approval_required {
            FixStatus::RequiresApproval
        } else {
            FixStatus::Pending
        },
        confidence,
        risk_level: issue.severity,
        auto_applied,
        approval_required,
        rollback_available: true,
        execution_time_ms: None,
    }
}
