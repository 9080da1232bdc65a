use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{DeployGuardError, Result};
use crate::models::{
    Commit, CommitResult, ConflictResolution, ConflictStrategy, Fix, FixStatus, GitOpsTracking,
    ReviewStatus, SyncStatus,
};
use crate::policy::PipelineConfig;
use crate::store::RecordStore;

const COMMIT_AUTHOR: &str = "deployguard-bot";

/// Decides what to commit for an execution and keeps each pipeline's
/// [`GitOpsTracking`] record.
///
/// Callers hold the pipeline lock while committing or reviewing.
pub struct ChangeTracker {
    store: Arc<dyn RecordStore<GitOpsTracking>>,
}

impl ChangeTracker {
    pub fn new(store: Arc<dyn RecordStore<GitOpsTracking>>) -> Self {
        Self { store }
    }

    pub async fn tracking(&self, pipeline_id: &str) -> Result<Option<GitOpsTracking>> {
        self.store.get(pipeline_id).await
    }

    /// Records completed fixes as a commit.
    ///
    /// Without completed fixes nothing is committed and the tracking record is
    /// left untouched. Pipelines without `auto-commit` stage the commit for
    /// review: it is stored, but `committed` stays false and no hash is
    /// returned until it is approved.
    pub async fn commit(
        &self,
        pipeline_id: &str,
        fixes: &[Fix],
        config: &PipelineConfig,
    ) -> Result<CommitResult> {
        let completed: Vec<&Fix> = fixes
            .iter()
            .filter(|f| f.status == FixStatus::Completed)
            .collect();

        if completed.is_empty() {
            debug!("No completed fixes for {pipeline_id}, nothing to commit");
            return Ok(CommitResult::nothing_to_commit());
        }

        let now = Utc::now();
        let mut tracking = match self.store.get(pipeline_id).await? {
            Some(tracking) => tracking,
            None => new_tracking(pipeline_id, config),
        };
        // Follow the pipeline if its sync target was reconfigured.
        tracking.repository.clone_from(&config.sync.repository);
        tracking.branch.clone_from(&config.sync.branch);

        let parent = tracking.commits.last().map(|c| c.hash.as_str());
        let commit = build_commit(pipeline_id, &completed, config, parent, now);
        tracking.commits.push(commit.clone());
        refresh_sync_state(&mut tracking, now);

        if tracking.conflict_resolution.has_conflicts {
            warn!(
                "Commit {} for {pipeline_id} conflicts on: {}",
                short_hash(&commit.hash),
                tracking.conflict_resolution.conflicting_files.join(", ")
            );
        }

        self.store.put(pipeline_id, tracking).await?;

        let published = config.sync.auto_commit;
        info!(
            "{} commit {} on {}@{} with {} fixes",
            if published { "Published" } else { "Staged" },
            short_hash(&commit.hash),
            config.sync.repository,
            config.sync.branch,
            completed.len()
        );

        Ok(CommitResult {
            committed: published,
            commit_hash: published.then(|| commit.hash.clone()),
            files_changed: commit.files_changed,
            message: Some(commit.message),
            review_status: Some(commit.review_status),
        })
    }

    /// Drops a commit whose execution could not be recorded.
    pub async fn discard(&self, pipeline_id: &str, hash: &str) -> Result<()> {
        let Some(mut tracking) = self.store.get(pipeline_id).await? else {
            return Ok(());
        };
        let before = tracking.commits.len();
        tracking.commits.retain(|c| c.hash != hash);
        if tracking.commits.len() == before {
            return Ok(());
        }

        refresh_sync_state(&mut tracking, Utc::now());
        self.store.put(pipeline_id, tracking).await?;
        warn!("Discarded commit {} of {pipeline_id}", short_hash(hash));
        Ok(())
    }

    /// Approves or rejects a commit that is pending review.
    pub async fn review(
        &self,
        pipeline_id: &str,
        hash: &str,
        approve: bool,
    ) -> Result<GitOpsTracking> {
        let not_found = || DeployGuardError::CommitNotFound {
            pipeline_id: pipeline_id.to_string(),
            hash: hash.to_string(),
        };

        let mut tracking = self.store.get(pipeline_id).await?.ok_or_else(not_found)?;
        let commit = tracking
            .commits
            .iter_mut()
            .find(|c| c.hash == hash)
            .ok_or_else(not_found)?;

        if commit.review_status != ReviewStatus::Pending {
            return Err(DeployGuardError::CommitAlreadyReviewed(hash.to_string()));
        }

        commit.review_status = if approve {
            ReviewStatus::Approved
        } else {
            ReviewStatus::Rejected
        };
        info!(
            "Commit {} of {pipeline_id} {}",
            short_hash(hash),
            commit.review_status
        );

        refresh_sync_state(&mut tracking, Utc::now());
        self.store.put(pipeline_id, tracking.clone()).await?;
        Ok(tracking)
    }
}

fn new_tracking(pipeline_id: &str, config: &PipelineConfig) -> GitOpsTracking {
    GitOpsTracking {
        tracking_id: format!("tracking-{}", Uuid::new_v4()),
        pipeline_id: pipeline_id.to_string(),
        repository: config.sync.repository.clone(),
        branch: config.sync.branch.clone(),
        commits: Vec::new(),
        sync_status: SyncStatus::Synced,
        last_sync: None,
        conflict_resolution: ConflictResolution::default(),
    }
}

/// File a fix of the given type writes to, e.g. `remediations/oomkilled.yaml`.
pub fn remediation_file(fix_type: &str) -> String {
    let slug: String = fix_type
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    format!("remediations/{slug}.yaml")
}

fn build_commit(
    pipeline_id: &str,
    completed: &[&Fix],
    config: &PipelineConfig,
    parent: Option<&str>,
    timestamp: DateTime<Utc>,
) -> Commit {
    let files_changed: Vec<String> = completed
        .iter()
        .map(|f| remediation_file(&f.fix_type))
        .collect();
    let fixes_applied: Vec<String> = completed.iter().map(|f| f.fix_id.clone()).collect();

    let message = format!(
        "Apply {} automated {} for {pipeline_id}",
        completed.len(),
        if completed.len() == 1 { "fix" } else { "fixes" }
    );

    let mut hasher = Sha256::new();
    hasher.update(parent.unwrap_or_default().as_bytes());
    hasher.update(config.sync.repository.as_bytes());
    hasher.update(config.sync.branch.as_bytes());
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(message.as_bytes());
    for id in &fixes_applied {
        hasher.update(id.as_bytes());
    }
    let hash: String = format!("{:x}", hasher.finalize()).chars().take(40).collect();

    Commit {
        hash,
        message,
        timestamp,
        author: COMMIT_AUTHOR.to_string(),
        ai_generated: true,
        fixes_applied,
        files_changed,
        review_status: if config.sync.auto_commit {
            ReviewStatus::AutoApproved
        } else {
            ReviewStatus::Pending
        },
    }
}

/// Files touched by a pending commit and by at least one other live commit.
/// Rejected commits no longer count.
pub fn detect_conflicts(commits: &[Commit]) -> Vec<String> {
    let mut touches: BTreeMap<&str, (usize, bool)> = BTreeMap::new();

    for commit in commits
        .iter()
        .filter(|c| c.review_status != ReviewStatus::Rejected)
    {
        let pending = commit.review_status == ReviewStatus::Pending;
        let files: BTreeSet<&str> = commit.files_changed.iter().map(String::as_str).collect();
        for file in files {
            let entry = touches.entry(file).or_insert((0, false));
            entry.0 += 1;
            entry.1 |= pending;
        }
    }

    touches
        .into_iter()
        .filter(|(_, (count, pending))| *count > 1 && *pending)
        .map(|(file, _)| file.to_string())
        .collect()
}

fn refresh_sync_state(tracking: &mut GitOpsTracking, now: DateTime<Utc>) {
    let conflicting_files = detect_conflicts(&tracking.commits);
    let has_conflicts = !conflicting_files.is_empty();

    tracking.conflict_resolution = ConflictResolution {
        has_conflicts,
        conflicting_files,
        strategy: if has_conflicts {
            ConflictStrategy::ManualReview
        } else {
            ConflictStrategy::FastForward
        },
    };
    tracking.sync_status = if has_conflicts {
        SyncStatus::OutOfSync
    } else {
        SyncStatus::Synced
    };
    tracking.last_sync = Some(now);
}

fn short_hash(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Environment, Severity};
    use crate::store::MemoryStore;

    fn fix(fix_type: &str, status: FixStatus) -> Fix {
        Fix {
            fix_id: format!("fix-{fix_type}"),
            fix_type: fix_type.to_string(),
            description: String::new(),
            status,
            confidence: 95,
            risk_level: Severity::Medium,
            auto_applied: true,
            approval_required: false,
            rollback_available: true,
            execution_time_ms: Some(10),
        }
    }

    fn config(auto_commit: bool) -> PipelineConfig {
        let mut config = PipelineConfig::new("web", Environment::Staging);
        config.sync.repository = "git@example.com:ops/web.git".to_string();
        config.sync.auto_commit = auto_commit;
        config
    }

    fn tracker() -> ChangeTracker {
        ChangeTracker::new(Arc::new(MemoryStore::<GitOpsTracking>::new()))
    }

    #[tokio::test]
    async fn test_nothing_completed_leaves_tracking_untouched() {
        let tracker = tracker();
        let fixes = vec![
            fix("OOMKilled", FixStatus::Failed),
            fix("ImagePullBackOff", FixStatus::RequiresApproval),
        ];

        let result = tracker.commit("web", &fixes, &config(true)).await.unwrap();

        assert!(!result.committed);
        assert!(result.files_changed.is_empty());
        assert!(result.commit_hash.is_none());
        assert!(tracker.tracking("web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auto_commit_publishes_hash() {
        let tracker = tracker();
        let fixes = vec![
            fix("OOMKilled", FixStatus::Completed),
            fix("CrashLoopBackOff", FixStatus::Failed),
            fix("PodUnschedulable", FixStatus::Completed),
        ];

        let result = tracker.commit("web", &fixes, &config(true)).await.unwrap();

        assert!(result.committed);
        assert_eq!(result.review_status, Some(ReviewStatus::AutoApproved));
        assert_eq!(
            result.files_changed,
            vec![
                "remediations/oomkilled.yaml".to_string(),
                "remediations/podunschedulable.yaml".to_string(),
            ]
        );

        let tracking = tracker.tracking("web").await.unwrap().unwrap();
        assert_eq!(tracking.repository, "git@example.com:ops/web.git");
        assert_eq!(tracking.branch, "main");
        assert_eq!(tracking.commits.len(), 1);
        assert_eq!(tracking.sync_status, SyncStatus::Synced);
        assert!(tracking.last_sync.is_some());

        let commit = &tracking.commits[0];
        assert_eq!(result.commit_hash.as_deref(), Some(commit.hash.as_str()));
        assert_eq!(commit.hash.len(), 40);
        assert!(commit.ai_generated);
        assert_eq!(commit.fixes_applied, vec!["fix-OOMKilled", "fix-PodUnschedulable"]);
        assert!(commit.message.contains("2 automated fixes"));
    }

    #[tokio::test]
    async fn test_manual_pipeline_stages_without_hash() {
        let tracker = tracker();
        let fixes = vec![fix("OOMKilled", FixStatus::Completed)];

        let result = tracker.commit("web", &fixes, &config(false)).await.unwrap();

        assert!(!result.committed);
        assert!(result.commit_hash.is_none());
        assert_eq!(result.files_changed.len(), 1);
        assert_eq!(result.review_status, Some(ReviewStatus::Pending));

        let tracking = tracker.tracking("web").await.unwrap().unwrap();
        assert_eq!(tracking.commits[0].review_status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn test_commits_are_appended() {
        let tracker = tracker();
        let config = config(true);

        tracker
            .commit("web", &[fix("A", FixStatus::Completed)], &config)
            .await
            .unwrap();
        let first = tracker.tracking("web").await.unwrap().unwrap();

        tracker
            .commit("web", &[fix("B", FixStatus::Completed)], &config)
            .await
            .unwrap();
        let second = tracker.tracking("web").await.unwrap().unwrap();

        assert_eq!(second.tracking_id, first.tracking_id);
        assert_eq!(second.commits.len(), 2);
        assert_eq!(second.commits[0], first.commits[0]);
    }

    #[tokio::test]
    async fn test_commit_follows_reconfigured_target() {
        let tracker = tracker();
        let mut config = config(true);
        tracker
            .commit("web", &[fix("A", FixStatus::Completed)], &config)
            .await
            .unwrap();

        config.sync.repository = "git@example.com:ops/new.git".to_string();
        config.sync.branch = "release".to_string();
        tracker
            .commit("web", &[fix("B", FixStatus::Completed)], &config)
            .await
            .unwrap();

        let tracking = tracker.tracking("web").await.unwrap().unwrap();
        assert_eq!(tracking.repository, "git@example.com:ops/new.git");
        assert_eq!(tracking.branch, "release");
        assert_eq!(tracking.commits.len(), 2);
    }

    #[tokio::test]
    async fn test_discard_removes_commit_and_clears_conflict() {
        let tracker = tracker();
        let config = config(false);
        let fixes = vec![fix("OOMKilled", FixStatus::Completed)];

        tracker.commit("web", &fixes, &config).await.unwrap();
        tracker.commit("web", &fixes, &config).await.unwrap();
        let tracking = tracker.tracking("web").await.unwrap().unwrap();
        assert!(tracking.conflict_resolution.has_conflicts);
        let last = tracking.commits[1].hash.clone();

        tracker.discard("web", &last).await.unwrap();

        let tracking = tracker.tracking("web").await.unwrap().unwrap();
        assert_eq!(tracking.commits.len(), 1);
        assert_ne!(tracking.commits[0].hash, last);
        assert!(!tracking.conflict_resolution.has_conflicts);
        assert_eq!(tracking.sync_status, SyncStatus::Synced);

        tracker.discard("web", "deadbeef").await.unwrap();
        tracker.discard("api", &last).await.unwrap();
        assert_eq!(tracker.tracking("web").await.unwrap().unwrap().commits.len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_pending_commits_flag_conflict() {
        let tracker = tracker();
        let config = config(false);
        let fixes = vec![fix("OOMKilled", FixStatus::Completed)];

        tracker.commit("web", &fixes, &config).await.unwrap();
        tracker.commit("web", &fixes, &config).await.unwrap();

        let tracking = tracker.tracking("web").await.unwrap().unwrap();
        assert!(tracking.conflict_resolution.has_conflicts);
        assert_eq!(
            tracking.conflict_resolution.conflicting_files,
            vec!["remediations/oomkilled.yaml".to_string()]
        );
        assert_eq!(tracking.conflict_resolution.strategy, ConflictStrategy::ManualReview);
        assert_eq!(tracking.sync_status, SyncStatus::OutOfSync);
    }

    #[tokio::test]
    async fn test_review_resolves_conflict() {
        let tracker = tracker();
        let config = config(false);
        let fixes = vec![fix("OOMKilled", FixStatus::Completed)];

        tracker.commit("web", &fixes, &config).await.unwrap();
        tracker.commit("web", &fixes, &config).await.unwrap();
        let tracking = tracker.tracking("web").await.unwrap().unwrap();
        let first = tracking.commits[0].hash.clone();
        let second = tracking.commits[1].hash.clone();

        let tracking = tracker.review("web", &first, false).await.unwrap();
        assert_eq!(tracking.commits[0].review_status, ReviewStatus::Rejected);
        assert!(!tracking.conflict_resolution.has_conflicts);
        assert_eq!(tracking.sync_status, SyncStatus::Synced);

        let tracking = tracker.review("web", &second, true).await.unwrap();
        assert_eq!(tracking.commits[1].review_status, ReviewStatus::Approved);

        let err = tracker.review("web", &second, true).await.unwrap_err();
        assert!(matches!(err, DeployGuardError::CommitAlreadyReviewed(_)));
    }

    #[tokio::test]
    async fn test_review_unknown_commit() {
        let tracker = tracker();
        let err = tracker.review("web", "deadbeef", true).await.unwrap_err();
        assert!(matches!(err, DeployGuardError::CommitNotFound { .. }));
    }

    #[test]
    fn test_remediation_file_naming() {
        assert_eq!(remediation_file("OOMKilled"), "remediations/oomkilled.yaml");
        assert_eq!(
            remediation_file("Network Policy/Blocked"),
            "remediations/network-policy-blocked.yaml"
        );
    }

    #[test]
    fn test_approved_commits_do_not_conflict() {
        let commit = |status: ReviewStatus| Commit {
            hash: "h".to_string(),
            message: String::new(),
            timestamp: Utc::now(),
            author: COMMIT_AUTHOR.to_string(),
            ai_generated: true,
            fixes_applied: Vec::new(),
            files_changed: vec!["remediations/a.yaml".to_string()],
            review_status: status,
        };

        assert!(detect_conflicts(&[
            commit(ReviewStatus::AutoApproved),
            commit(ReviewStatus::Approved)
        ])
        .is_empty());
        assert_eq!(
            detect_conflicts(&[commit(ReviewStatus::AutoApproved), commit(ReviewStatus::Pending)]),
            vec!["remediations/a.yaml".to_string()]
        );
    }
}
