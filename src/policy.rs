use std::collections::BTreeSet;

use clap::ValueEnum;
use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{DeployGuardError, Result};
use crate::models::{Environment, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AiIntegrationLevel {
    Basic,
    #[default]
    Standard,
    Advanced,
}

impl AiIntegrationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Advanced => "advanced",
        }
    }
}

/// Conditions under which a synthesized fix must wait for a human.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalRule {
    HighRisk,
    Production,
    CriticalFixes,
}

impl ApprovalRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighRisk => "high-risk",
            Self::Production => "production",
            Self::CriticalFixes => "critical-fixes",
        }
    }

    /// One row of the approval decision table.
    pub fn applies(self, severity: Severity, environment: Environment) -> bool {
        match self {
            Self::Production => environment == Environment::Production,
            Self::CriticalFixes => severity == Severity::Critical,
            Self::HighRisk => severity >= Severity::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PreDeploymentPolicy {
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: u32,

    #[serde(default = "default_required_confidence")]
    pub required_confidence: u32,

    #[serde(default = "default_true")]
    pub auto_block_on_critical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemediationPolicy {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: u32,

    #[serde(default = "default_max_concurrent_fixes")]
    pub max_concurrent_fixes: usize,

    #[serde(default = "default_approval_rules")]
    pub approval_required: BTreeSet<ApprovalRule>,
}

impl RemediationPolicy {
    pub fn requires_approval(&self, severity: Severity, environment: Environment) -> bool {
        self.approval_required
            .iter()
            .any(|rule| rule.applies(severity, environment))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub repository: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default)]
    pub auto_commit: bool,
}

/// Per-pipeline policy. Only changes through [`PolicyStore::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfig {
    /// Filled from the map key when loaded from a config file.
    #[serde(default, skip_serializing)]
    pub id: String,

    #[serde(default = "default_environment")]
    pub environment: Environment,

    #[serde(default)]
    pub ai_integration_level: AiIntegrationLevel,

    #[serde(default)]
    pub pre_deployment: PreDeploymentPolicy,

    #[serde(default)]
    pub remediation: RemediationPolicy,

    #[serde(default)]
    pub sync: SyncPolicy,
}

impl Default for PreDeploymentPolicy {
    fn default() -> Self {
        Self {
            risk_threshold: default_risk_threshold(),
            required_confidence: default_required_confidence(),
            auto_block_on_critical: true,
        }
    }
}

impl Default for RemediationPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_concurrent_fixes: default_max_concurrent_fixes(),
            approval_required: default_approval_rules(),
        }
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            repository: String::new(),
            branch: default_branch(),
            auto_commit: false,
        }
    }
}

impl PipelineConfig {
    pub fn new(id: impl Into<String>, environment: Environment) -> Self {
        Self {
            id: id.into(),
            environment,
            ai_integration_level: AiIntegrationLevel::default(),
            pre_deployment: PreDeploymentPolicy::default(),
            remediation: RemediationPolicy::default(),
            sync: SyncPolicy::default(),
        }
    }

    /// Checks that all thresholds are within range.
    ///
    /// # Errors
    ///
    /// Returns [`DeployGuardError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let percentages = [
            ("risk-threshold", self.pre_deployment.risk_threshold),
            ("required-confidence", self.pre_deployment.required_confidence),
            ("confidence-threshold", self.remediation.confidence_threshold),
        ];

        for (field, value) in percentages {
            if value > 100 {
                return Err(DeployGuardError::Config(format!(
                    "pipeline '{}': {field} must be within 0..=100, got {value}",
                    self.id
                )));
            }
        }

        if self.remediation.max_concurrent_fixes == 0 {
            return Err(DeployGuardError::Config(format!(
                "pipeline '{}': max-concurrent-fixes must be at least 1",
                self.id
            )));
        }

        Ok(())
    }

    pub fn apply(&mut self, patch: &PipelineConfigPatch) {
        if let Some(environment) = patch.environment {
            self.environment = environment;
        }
        if let Some(level) = patch.ai_integration_level {
            self.ai_integration_level = level;
        }
        if let Some(value) = patch.risk_threshold {
            self.pre_deployment.risk_threshold = value;
        }
        if let Some(value) = patch.required_confidence {
            self.pre_deployment.required_confidence = value;
        }
        if let Some(value) = patch.auto_block_on_critical {
            self.pre_deployment.auto_block_on_critical = value;
        }
        if let Some(value) = patch.confidence_threshold {
            self.remediation.confidence_threshold = value;
        }
        if let Some(value) = patch.max_concurrent_fixes {
            self.remediation.max_concurrent_fixes = value;
        }
        if let Some(rules) = &patch.approval_required {
            self.remediation.approval_required = rules.clone();
        }
        if let Some(value) = patch.sync_enabled {
            self.sync.enabled = value;
        }
        if let Some(repository) = &patch.repository {
            self.sync.repository = repository.clone();
        }
        if let Some(branch) = &patch.branch {
            self.sync.branch = branch.clone();
        }
        if let Some(value) = patch.auto_commit {
            self.sync.auto_commit = value;
        }
    }
}

/// Partial update of a [`PipelineConfig`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineConfigPatch {
    pub environment: Option<Environment>,
    pub ai_integration_level: Option<AiIntegrationLevel>,
    pub risk_threshold: Option<u32>,
    pub required_confidence: Option<u32>,
    pub auto_block_on_critical: Option<bool>,
    pub confidence_threshold: Option<u32>,
    pub max_concurrent_fixes: Option<usize>,
    pub approval_required: Option<BTreeSet<ApprovalRule>>,
    pub sync_enabled: Option<bool>,
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub auto_commit: Option<bool>,
}

impl PipelineConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Holds one [`PipelineConfig`] per pipeline identity.
pub struct PolicyStore {
    pipelines: RwLock<IndexMap<String, PipelineConfig>>,
}

impl PolicyStore {
    /// Builds a store from configs keyed by pipeline id.
    ///
    /// # Errors
    ///
    /// Returns an error if any config fails validation.
    pub fn new(pipelines: IndexMap<String, PipelineConfig>) -> Result<Self> {
        let pipelines = pipelines
            .into_iter()
            .map(|(id, mut config)| {
                config.id.clone_from(&id);
                config.validate().map(|()| (id, config))
            })
            .collect::<Result<IndexMap<_, _>>>()?;

        debug!("Policy store loaded with {} pipelines", pipelines.len());

        Ok(Self {
            pipelines: RwLock::new(pipelines),
        })
    }

    pub async fn get(&self, pipeline_id: &str) -> Result<PipelineConfig> {
        self.pipelines
            .read()
            .await
            .get(pipeline_id)
            .cloned()
            .ok_or_else(|| DeployGuardError::ConfigNotFound(pipeline_id.to_string()))
    }

    /// Applies `patch` to a pipeline. The stored config is left untouched if the
    /// patched result does not validate.
    pub async fn update(
        &self,
        pipeline_id: &str,
        patch: &PipelineConfigPatch,
    ) -> Result<PipelineConfig> {
        let mut pipelines = self.pipelines.write().await;
        let current = pipelines
            .get_mut(pipeline_id)
            .ok_or_else(|| DeployGuardError::ConfigNotFound(pipeline_id.to_string()))?;

        let mut updated = current.clone();
        updated.apply(patch);
        updated.validate()?;
        *current = updated.clone();

        info!("Updated configuration of pipeline {pipeline_id}");
        Ok(updated)
    }

    pub async fn pipeline_ids(&self) -> Vec<String> {
        self.pipelines.read().await.keys().cloned().collect()
    }

    pub async fn snapshot(&self) -> IndexMap<String, PipelineConfig> {
        self.pipelines.read().await.clone()
    }
}

fn default_environment() -> Environment {
    Environment::Staging
}

fn default_risk_threshold() -> u32 {
    70
}

fn default_required_confidence() -> u32 {
    75
}

fn default_confidence_threshold() -> u32 {
    90
}

fn default_max_concurrent_fixes() -> usize {
    3
}

fn default_approval_rules() -> BTreeSet<ApprovalRule> {
    BTreeSet::from([ApprovalRule::Production, ApprovalRule::CriticalFixes])
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_true() -> bool {
    true
}
