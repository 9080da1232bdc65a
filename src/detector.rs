use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info};

use crate::error::Result;
use crate::models::{Environment, Issue, Severity};

/// Source of the issues a pre-deployment analysis scores.
#[async_trait]
pub trait IssueDetector: Send + Sync {
    async fn detect(&self, environment: Environment, manifest_refs: &[String])
        -> Result<Vec<Issue>>;
}

/// Known failure signature in workload logs.
struct Signature {
    pattern: &'static str,
    issue_type: &'static str,
    severity: Severity,
    suggestion: &'static str,
    root_cause: &'static str,
    default_resource: &'static str,
}

const SIGNATURES: &[Signature] = &[
    Signature {
        pattern: "CrashLoopBackOff",
        issue_type: "CrashLoopBackOff",
        severity: Severity::High,
        suggestion: "Restart the pod or check livenessProbe configuration",
        root_cause: "Application is failing to start due to missing configuration",
        default_resource: "deployment/frontend",
    },
    Signature {
        pattern: "ImagePull",
        issue_type: "ImagePullBackOff",
        severity: Severity::Medium,
        suggestion: "Verify image name and ensure pull secrets are configured correctly",
        root_cause: "Container image not found in registry",
        default_resource: "deployment/backend-api",
    },
    Signature {
        pattern: "OOMKilled",
        issue_type: "OOMKilled",
        severity: Severity::Critical,
        suggestion: "Increase memory limits for the container",
        root_cause: "Container exceeded memory limits",
        default_resource: "statefulset/database",
    },
    Signature {
        pattern: "NetworkPolicy",
        issue_type: "NetworkPolicyBlocked",
        severity: Severity::High,
        suggestion: "Update network policy to allow required traffic",
        root_cause: "Network policy is blocking required connections",
        default_resource: "deployment/auth-service",
    },
    Signature {
        pattern: "Unschedulable",
        issue_type: "PodUnschedulable",
        severity: Severity::Medium,
        suggestion: "Check node resources or adjust pod resource requests",
        root_cause: "Insufficient resources available on nodes",
        default_resource: "job/analytics",
    },
];

/// Detects issues by scanning workload logs for known failure signatures.
///
/// Each signature produces at most one issue, in the order it first appears in
/// the logs.
pub struct LogIssueDetector {
    lines: Vec<String>,
}

impl LogIssueDetector {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// Reads log lines from a file. Invalid UTF-8 is replaced, not rejected.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read log file: {}", path.display()))?;
        let contents = String::from_utf8_lossy(&bytes);
        Ok(Self::new(contents.lines().map(str::to_owned).collect()))
    }

    fn matching_signatures(&self) -> Vec<&'static Signature> {
        let mut found: Vec<&'static Signature> = Vec::new();
        for line in &self.lines {
            for signature in SIGNATURES {
                if line.contains(signature.pattern)
                    && !found.iter().any(|s| s.issue_type == signature.issue_type)
                {
                    found.push(signature);
                }
            }
        }
        found
    }
}

#[async_trait]
impl IssueDetector for LogIssueDetector {
    async fn detect(
        &self,
        environment: Environment,
        manifest_refs: &[String],
    ) -> Result<Vec<Issue>> {
        debug!(
            "Scanning {} log lines for {environment} failure signatures",
            self.lines.len()
        );

        let issues: Vec<Issue> = self
            .matching_signatures()
            .into_iter()
            .map(|signature| Issue {
                issue_type: signature.issue_type.to_string(),
                severity: signature.severity,
                description: signature.suggestion.to_string(),
                affected_resources: if manifest_refs.is_empty() {
                    vec![signature.default_resource.to_string()]
                } else {
                    manifest_refs.to_vec()
                },
                auto_fix_available: true,
                estimated_impact: signature.root_cause.to_string(),
            })
            .collect();

        info!("Detected {} issues in logs", issues.len());
        Ok(issues)
    }
}

/// Returns a fixed issue list, e.g. the output of an external scanner.
pub struct StaticIssueDetector {
    issues: Vec<Issue>,
}

impl StaticIssueDetector {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self { issues }
    }

    /// Loads a JSON array of issues.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read issues file: {}", path.display()))?;
        let issues = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse issues file: {}", path.display()))?;
        Ok(Self::new(issues))
    }
}

#[async_trait]
impl IssueDetector for StaticIssueDetector {
    async fn detect(
        &self,
        _environment: Environment,
        _manifest_refs: &[String],
    ) -> Result<Vec<Issue>> {
        Ok(self.issues.clone())
    }
}
