use std::fmt;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Deployment target of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration or runtime problem reported by an issue detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub affected_resources: Vec<String>,
    #[serde(default)]
    pub auto_fix_available: bool,
    #[serde(default)]
    pub estimated_impact: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    Proceed,
    ProceedWithCaution,
    FixThenDeploy,
    BlockDeployment,
}

impl Recommendation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::ProceedWithCaution => "proceed-with-caution",
            Self::FixThenDeploy => "fix-then-deploy",
            Self::BlockDeployment => "block-deployment",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStrategy {
    /// Every issue has an automated fix, so the rollback can be automated too.
    Automated,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub available: bool,
    pub strategy: RollbackStrategy,
    pub estimated_time: String,
}

/// Outcome of one pre-deployment analysis run. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreDeploymentAnalysis {
    pub analysis_id: String,
    pub timestamp: DateTime<Utc>,
    pub environment: Environment,
    pub risk_score: u32,
    pub issues: Vec<Issue>,
    pub recommendation: Recommendation,
    pub ai_confidence: u32,
    pub meets_required_confidence: bool,
    pub estimated_fix_time: String,
    pub rollback_plan: RollbackPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    RequiresApproval,
}

impl FixStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RequiresApproval => "requires-approval",
        }
    }
}

impl fmt::Display for FixStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate remediation derived from a single issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    pub fix_id: String,
    #[serde(rename = "type")]
    pub fix_type: String,
    pub description: String,
    pub status: FixStatus,
    pub confidence: u32,
    pub risk_level: Severity,
    pub auto_applied: bool,
    pub approval_required: bool,
    pub rollback_available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    InProgress,
    Completed,
    PartialSuccess,
    Failed,
    AwaitingApproval,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::PartialSuccess => "partial-success",
            Self::Failed => "failed",
            Self::AwaitingApproval => "awaiting-approval",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remediation run against an analysis. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixExecution {
    pub execution_id: String,
    pub pipeline_id: String,
    pub analysis_id: String,
    pub timestamp: DateTime<Utc>,
    pub fixes: Vec<Fix>,
    pub overall_status: OverallStatus,
    pub success_rate: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitops_commit: Option<CommitResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    AutoApproved,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::AutoApproved => "auto-approved",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Synced,
    OutOfSync,
    SyncFailed,
    SyncInProgress,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::OutOfSync => "out-of-sync",
            Self::SyncFailed => "sync-failed",
            Self::SyncInProgress => "sync-in-progress",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub hash: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub ai_generated: bool,
    pub fixes_applied: Vec<String>,
    pub files_changed: Vec<String>,
    pub review_status: ReviewStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    #[default]
    FastForward,
    ManualReview,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub has_conflicts: bool,
    pub conflicting_files: Vec<String>,
    pub strategy: ConflictStrategy,
}

/// Change history of one pipeline against its GitOps repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitOpsTracking {
    pub tracking_id: String,
    pub pipeline_id: String,
    pub repository: String,
    pub branch: String,
    pub commits: Vec<Commit>,
    pub sync_status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub conflict_resolution: ConflictResolution,
}

/// What the change tracker decided to commit for an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    pub committed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    pub files_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_status: Option<ReviewStatus>,
}

impl CommitResult {
    pub fn nothing_to_commit() -> Self {
        Self {
            committed: false,
            commit_hash: None,
            files_changed: Vec::new(),
            message: None,
            review_status: None,
        }
    }
}
