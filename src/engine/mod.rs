//! Deployment gate and remediation engine.
//!
//! [`Orchestrator`] wires the components together:
//! policy -> risk analysis -> fix synthesis -> remediation -> change tracking,
//! with analytics reading the accumulated history.

pub mod analytics;
pub mod gitops;
pub mod remediation;
pub mod risk;
pub mod synthesis;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

use crate::detector::IssueDetector;
use crate::error::{DeployGuardError, Result};
use crate::models::{
    CommitResult, Environment, Fix, FixExecution, GitOpsTracking, PreDeploymentAnalysis,
    Recommendation,
};
use crate::policy::{PipelineConfig, PipelineConfigPatch, PolicyStore};
use crate::store::{HistoryStore, JsonFileStore, MemoryStore, PipelineLocks, RecordStore};

use analytics::{AnalyticsSummary, PipelineRecords};
use gitops::ChangeTracker;
use remediation::{OutcomePredictor, RemediationExecutor};

/// History backends used by the orchestrator.
pub struct Stores {
    pub analyses: Arc<dyn HistoryStore<PreDeploymentAnalysis>>,
    pub executions: Arc<dyn HistoryStore<FixExecution>>,
    pub tracking: Arc<dyn RecordStore<GitOpsTracking>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            analyses: Arc::new(MemoryStore::<PreDeploymentAnalysis>::new()),
            executions: Arc::new(MemoryStore::<FixExecution>::new()),
            tracking: Arc::new(MemoryStore::<GitOpsTracking>::new()),
        }
    }

    /// Opens durable stores below `state_dir`: `analyses/`, `executions/` and
    /// `gitops/`, one JSON file per pipeline each.
    ///
    /// # Errors
    ///
    /// Returns an error if a store directory cannot be created.
    pub fn durable(state_dir: &Path) -> Result<Self> {
        Ok(Self {
            analyses: Arc::new(JsonFileStore::<PreDeploymentAnalysis>::open(
                state_dir.join("analyses"),
            )?),
            executions: Arc::new(JsonFileStore::<FixExecution>::open(state_dir.join("executions"))?),
            tracking: Arc::new(JsonFileStore::<GitOpsTracking>::open(state_dir.join("gitops"))?),
        })
    }
}

/// Entry point for all deployment gate operations.
pub struct Orchestrator {
    policies: Arc<PolicyStore>,
    detector: Arc<dyn IssueDetector>,
    executor: RemediationExecutor,
    tracker: ChangeTracker,
    analyses: Arc<dyn HistoryStore<PreDeploymentAnalysis>>,
    executions: Arc<dyn HistoryStore<FixExecution>>,
    locks: PipelineLocks,
}

impl Orchestrator {
    pub fn new(
        policies: Arc<PolicyStore>,
        detector: Arc<dyn IssueDetector>,
        predictor: Arc<dyn OutcomePredictor>,
        stores: Stores,
    ) -> Self {
        Self {
            policies,
            detector,
            executor: RemediationExecutor::new(predictor),
            tracker: ChangeTracker::new(stores.tracking),
            analyses: stores.analyses,
            executions: stores.executions,
            locks: PipelineLocks::default(),
        }
    }

    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }

    /// Detects issues for `environment`, scores them and appends the analysis
    /// to the pipeline's history.
    ///
    /// # Errors
    ///
    /// Returns [`DeployGuardError::ConfigNotFound`] for an unknown pipeline, or
    /// a detector/store error.
    pub async fn run_pre_deployment_analysis(
        &self,
        pipeline_id: &str,
        environment: Environment,
        manifest_refs: &[String],
    ) -> Result<PreDeploymentAnalysis> {
        let config = self.policies.get(pipeline_id).await?;
        info!("Running pre-deployment analysis for {pipeline_id} ({environment})");

        let issues = self.detector.detect(environment, manifest_refs).await?;
        let analysis = risk::analyze(environment, issues, &config);

        if !analysis.meets_required_confidence {
            warn!(
                "Analysis confidence {}% is below the required {}% for {pipeline_id}",
                analysis.ai_confidence, config.pre_deployment.required_confidence
            );
        }

        {
            let _guard = self.locks.acquire(pipeline_id).await;
            self.analyses.append(pipeline_id, analysis.clone()).await?;
        }

        info!(
            "Analysis {} scored {} -> {}",
            analysis.analysis_id, analysis.risk_score, analysis.recommendation
        );
        Ok(analysis)
    }

    /// Synthesizes and executes fixes for a stored analysis, then records the
    /// outcome as a commit when the pipeline syncs to GitOps.
    ///
    /// # Errors
    ///
    /// - [`DeployGuardError::ConfigNotFound`] for an unknown pipeline
    /// - [`DeployGuardError::AnalysisNotFound`] if the analysis is not in history
    /// - [`DeployGuardError::DeploymentBlocked`] if the analysis blocks deployment
    pub async fn execute_fixes(
        &self,
        pipeline_id: &str,
        analysis_id: &str,
        auto_approve: bool,
    ) -> Result<FixExecution> {
        let config = self.policies.get(pipeline_id).await?;
        let _guard = self.locks.acquire(pipeline_id).await;

        let analysis = self
            .analyses
            .list(pipeline_id)
            .await?
            .into_iter()
            .find(|a| a.analysis_id == analysis_id)
            .ok_or_else(|| DeployGuardError::AnalysisNotFound {
                pipeline_id: pipeline_id.to_string(),
                analysis_id: analysis_id.to_string(),
            })?;

        if analysis.recommendation == Recommendation::BlockDeployment {
            return Err(DeployGuardError::DeploymentBlocked(analysis_id.to_string()));
        }

        let fixes = synthesis::synthesize(&analysis.issues, &config.remediation, analysis.environment);
        let report = self
            .executor
            .execute(fixes, &config.remediation, auto_approve)
            .await;

        let gitops_commit = self.record_commit(pipeline_id, &report.fixes, &config).await?;

        let execution = FixExecution {
            execution_id: format!("execution-{}", Uuid::new_v4()),
            pipeline_id: pipeline_id.to_string(),
            analysis_id: analysis_id.to_string(),
            timestamp: Utc::now(),
            fixes: report.fixes,
            overall_status: report.overall_status,
            success_rate: report.success_rate,
            gitops_commit,
        };

        if let Err(e) = self.executions.append(pipeline_id, execution.clone()).await {
            if execution.gitops_commit.is_some() {
                if let Err(discard_err) = self.discard_latest_commit(pipeline_id).await {
                    warn!("Orphan commit left in {pipeline_id} tracking: {discard_err}");
                }
            }
            return Err(e);
        }
        Ok(execution)
    }

    /// Called under the pipeline lock, so the latest commit is the one just made.
    async fn discard_latest_commit(&self, pipeline_id: &str) -> Result<()> {
        let latest = self
            .tracker
            .tracking(pipeline_id)
            .await?
            .and_then(|t| t.commits.last().map(|c| c.hash.clone()));
        match latest {
            Some(hash) => self.tracker.discard(pipeline_id, &hash).await,
            None => Ok(()),
        }
    }

    async fn record_commit(
        &self,
        pipeline_id: &str,
        fixes: &[Fix],
        config: &PipelineConfig,
    ) -> Result<Option<CommitResult>> {
        if !config.sync.enabled {
            return Ok(None);
        }

        let result = self.tracker.commit(pipeline_id, fixes, config).await?;
        // No files means nothing completed and nothing was recorded.
        Ok((!result.files_changed.is_empty()).then_some(result))
    }

    pub async fn get_analysis_history(&self, pipeline_id: &str) -> Result<Vec<PreDeploymentAnalysis>> {
        self.policies.get(pipeline_id).await?;
        self.analyses.list(pipeline_id).await
    }

    pub async fn get_execution_history(&self, pipeline_id: &str) -> Result<Vec<FixExecution>> {
        self.policies.get(pipeline_id).await?;
        self.executions.list(pipeline_id).await
    }

    pub async fn get_gitops_tracking(&self, pipeline_id: &str) -> Result<Option<GitOpsTracking>> {
        self.policies.get(pipeline_id).await?;
        self.tracker.tracking(pipeline_id).await
    }

    pub async fn update_pipeline_config(
        &self,
        pipeline_id: &str,
        patch: &PipelineConfigPatch,
    ) -> Result<PipelineConfig> {
        self.policies.update(pipeline_id, patch).await
    }

    /// Approves or rejects a staged commit.
    pub async fn review_commit(
        &self,
        pipeline_id: &str,
        hash: &str,
        approve: bool,
    ) -> Result<GitOpsTracking> {
        self.policies.get(pipeline_id).await?;
        let _guard = self.locks.acquire(pipeline_id).await;
        self.tracker.review(pipeline_id, hash, approve).await
    }

    pub async fn generate_analytics(&self) -> Result<AnalyticsSummary> {
        let mut records = Vec::new();
        for pipeline_id in self.policies.pipeline_ids().await {
            records.push(PipelineRecords {
                analyses: self.analyses.list(&pipeline_id).await?,
                executions: self.executions.list(&pipeline_id).await?,
                tracking: self.tracker.tracking(&pipeline_id).await?,
            });
        }

        Ok(analytics::summarize(&records))
    }
}
