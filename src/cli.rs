use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Config, OutputFormat};
use crate::detector::{IssueDetector, LogIssueDetector, StaticIssueDetector};
use crate::engine::remediation::SimulatedBackend;
use crate::engine::{Orchestrator, Stores};
use crate::models::{Environment, FixExecution, PreDeploymentAnalysis, Recommendation};
use crate::output::{self, PhaseProgress};
use crate::policy::{AiIntegrationLevel, ApprovalRule, PipelineConfigPatch, PolicyStore};
use crate::store;

const DEFAULT_CONFIG_FILE: &str = "deployguard.toml";

#[derive(Parser)]
#[command(name = "deployguard")]
#[command(author, version, about = "Deployment risk gate and auto-remediation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./deployguard.{toml,json,yaml,yml})
    #[arg(short, long, global = true, env = "DEPLOYGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Write output to a file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    /// History directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "DEPLOYGUARD_STATE_DIR")]
    state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a pending deployment and record the analysis
    Analyze {
        #[arg(short = 'P', long)]
        pipeline: String,

        /// Defaults to the pipeline's configured environment
        #[arg(short, long, value_enum)]
        environment: Option<Environment>,

        /// Workload log file to scan for failure signatures
        #[arg(short, long, conflicts_with = "issues")]
        logs: Option<PathBuf>,

        /// JSON file with a list of already detected issues
        #[arg(short, long)]
        issues: Option<PathBuf>,

        /// Manifest references reported as affected resources
        #[arg(short, long = "manifest")]
        manifests: Vec<String>,

        /// Execute fixes right away unless deployment is blocked
        #[arg(long, default_value_t = false)]
        execute: bool,

        #[arg(long, default_value_t = false, requires = "execute")]
        auto_approve: bool,
    },
    /// Synthesize and apply fixes for a recorded analysis
    Execute {
        #[arg(short = 'P', long)]
        pipeline: String,

        #[arg(short, long)]
        analysis: String,

        /// Also run fixes that need approval
        #[arg(long, default_value_t = false)]
        auto_approve: bool,
    },
    /// List recorded analyses of a pipeline
    History {
        #[arg(short = 'P', long)]
        pipeline: String,
    },
    /// List recorded fix executions of a pipeline
    Executions {
        #[arg(short = 'P', long)]
        pipeline: String,
    },
    /// Show the GitOps commit log and sync state of a pipeline
    Tracking {
        #[arg(short = 'P', long)]
        pipeline: String,
    },
    /// Approve or reject a staged commit
    Review {
        #[arg(short = 'P', long)]
        pipeline: String,

        #[arg(long)]
        commit: String,

        #[arg(long, default_value_t = false)]
        reject: bool,
    },
    /// Inspect or change pipeline policies
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Aggregate metrics and policy advice across all pipelines
    Analytics,
    /// Remove all persisted history
    ClearState,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configured pipelines
    Show,
    /// Add a pipeline with default policies
    Init {
        pipeline: String,

        #[arg(short, long, value_enum, default_value = "staging")]
        environment: Environment,
    },
    /// Update policies of a configured pipeline
    Set {
        pipeline: String,

        #[command(flatten)]
        patch: PatchArgs,
    },
}

#[derive(Args)]
struct PatchArgs {
    #[arg(long, value_enum)]
    environment: Option<Environment>,

    #[arg(long, value_enum)]
    ai_integration_level: Option<AiIntegrationLevel>,

    #[arg(long)]
    risk_threshold: Option<u32>,

    #[arg(long)]
    required_confidence: Option<u32>,

    #[arg(long)]
    auto_block_on_critical: Option<bool>,

    #[arg(long)]
    confidence_threshold: Option<u32>,

    #[arg(long)]
    max_concurrent_fixes: Option<usize>,

    /// Comma separated approval rules
    #[arg(long, value_enum, value_delimiter = ',', conflicts_with = "no_approval")]
    approval_required: Option<Vec<ApprovalRule>>,

    /// Clear all approval rules
    #[arg(long, default_value_t = false)]
    no_approval: bool,

    #[arg(long)]
    sync_enabled: Option<bool>,

    #[arg(long)]
    repository: Option<String>,

    #[arg(long)]
    branch: Option<String>,

    #[arg(long)]
    auto_commit: Option<bool>,
}

impl PatchArgs {
    fn to_patch(&self) -> PipelineConfigPatch {
        let approval_required = if self.no_approval {
            Some(BTreeSet::new())
        } else {
            self.approval_required
                .as_ref()
                .map(|rules| rules.iter().copied().collect())
        };

        PipelineConfigPatch {
            environment: self.environment,
            ai_integration_level: self.ai_integration_level,
            risk_threshold: self.risk_threshold,
            required_confidence: self.required_confidence,
            auto_block_on_critical: self.auto_block_on_critical,
            confidence_threshold: self.confidence_threshold,
            max_concurrent_fixes: self.max_concurrent_fixes,
            approval_required,
            sync_enabled: self.sync_enabled,
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            auto_commit: self.auto_commit,
        }
    }
}

/// JSON shape of `analyze --execute`.
#[derive(Serialize)]
struct AnalysisWithExecution<'a> {
    analysis: &'a PreDeploymentAnalysis,
    execution: &'a FixExecution,
}

impl Cli {
    fn output_format(&self, config: &Config) -> OutputFormat {
        self.format.unwrap_or(config.output.format)
    }

    /// Writes `value` as JSON or as the rendered summary.
    fn emit<T: Serialize>(
        &self,
        config: &Config,
        value: &T,
        render: impl FnOnce(&T) -> String,
    ) -> Result<()> {
        let destination = self.output.as_deref();
        match self.output_format(config) {
            OutputFormat::Json => {
                output::write_json(value, self.pretty || config.output.pretty, destination)
            }
            OutputFormat::Summary => output::write_text(&render(value), destination),
        }
    }

    fn resolve_state_dir(&self, config: &Config) -> Result<PathBuf> {
        match self.state_dir.as_ref().or(config.storage.state_dir.as_ref()) {
            Some(dir) => Ok(dir.clone()),
            None => Ok(store::default_state_dir()?),
        }
    }

    fn stores(&self, config: &Config) -> Result<Stores> {
        if config.storage.durable {
            let state_dir = self.resolve_state_dir(config)?;
            info!("Using history at: {}", state_dir.display());
            Ok(Stores::durable(&state_dir)?)
        } else {
            info!("Durable storage disabled, history lives for this run only");
            Ok(Stores::in_memory())
        }
    }

    fn orchestrator(
        config: &Config,
        detector: Arc<dyn IssueDetector>,
        stores: Stores,
    ) -> Result<Orchestrator> {
        let backend = &config.remediation;
        let predictor = SimulatedBackend::new(
            backend.reliability,
            backend.min_latency_ms,
            backend.max_latency_ms,
            backend.seed,
        );
        let policies = PolicyStore::new(config.pipelines.clone())?;

        Ok(Orchestrator::new(
            Arc::new(policies),
            detector,
            Arc::new(predictor),
            stores,
        ))
    }

    fn reader(&self, config: &Config) -> Result<Orchestrator> {
        Self::orchestrator(
            config,
            Arc::new(StaticIssueDetector::new(Vec::new())),
            self.stores(config)?,
        )
    }

    fn detector(logs: Option<&Path>, issues: Option<&Path>) -> Result<Arc<dyn IssueDetector>> {
        Ok(match (logs, issues) {
            (Some(path), _) => Arc::new(LogIssueDetector::from_file(path)?),
            (None, Some(path)) => Arc::new(StaticIssueDetector::from_file(path)?),
            (None, None) => Arc::new(StaticIssueDetector::new(Vec::new())),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_analyze(
        &self,
        config: &Config,
        pipeline: &str,
        environment: Option<Environment>,
        logs: Option<&Path>,
        issues: Option<&Path>,
        manifests: &[String],
        execute: bool,
        auto_approve: bool,
    ) -> Result<()> {
        let orchestrator =
            Self::orchestrator(config, Self::detector(logs, issues)?, self.stores(config)?)?;

        let environment = match environment {
            Some(environment) => environment,
            None => orchestrator.policies().get(pipeline).await?.environment,
        };

        let total = if execute { 2 } else { 1 };
        let progress = PhaseProgress::start(total, "Analyzing deployment risk");
        let analysis = orchestrator
            .run_pre_deployment_analysis(pipeline, environment, manifests)
            .await?;

        if !execute {
            progress.finish();
            return self.emit(config, &analysis, |a| output::render_analysis(pipeline, a));
        }

        if analysis.recommendation == Recommendation::BlockDeployment {
            progress.finish();
            self.emit(config, &analysis, |a| output::render_analysis(pipeline, a))?;
            bail!("Deployment blocked by analysis {}", analysis.analysis_id);
        }

        let progress = progress.next("Executing fixes");
        let execution = orchestrator
            .execute_fixes(pipeline, &analysis.analysis_id, auto_approve)
            .await?;
        progress.finish();

        self.emit(
            config,
            &AnalysisWithExecution {
                analysis: &analysis,
                execution: &execution,
            },
            |both| {
                format!(
                    "{}\n{}",
                    output::render_analysis(pipeline, both.analysis),
                    output::render_execution(both.execution)
                )
            },
        )
    }

    async fn execute_fixes(
        &self,
        config: &Config,
        pipeline: &str,
        analysis: &str,
        auto_approve: bool,
    ) -> Result<()> {
        let orchestrator = self.reader(config)?;

        let progress = PhaseProgress::start(1, "Executing fixes");
        let execution = orchestrator
            .execute_fixes(pipeline, analysis, auto_approve)
            .await;
        progress.finish();

        self.emit(config, &execution?, output::render_execution)
    }

    async fn execute_config(&self, config: Config, action: &ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                self.emit(&config, &config.pipelines, output::render_pipelines)
            }
            ConfigAction::Init {
                pipeline,
                environment,
            } => {
                let mut config = config;
                config.add_pipeline(pipeline, *environment)?;
                let path = self.save(&config)?;
                info!("Pipeline '{pipeline}' added to {}", path.display());
                self.emit(&config, &config.pipelines, output::render_pipelines)
            }
            ConfigAction::Set { pipeline, patch } => {
                let patch = patch.to_patch();
                if patch.is_empty() {
                    bail!("Nothing to update; pass at least one policy option");
                }

                // Policy changes are validated by the store before they are saved.
                let orchestrator = Self::orchestrator(
                    &config,
                    Arc::new(StaticIssueDetector::new(Vec::new())),
                    Stores::in_memory(),
                )?;
                orchestrator.update_pipeline_config(pipeline, &patch).await?;

                let mut config = config;
                config.pipelines = orchestrator.policies().snapshot().await;
                let path = self.save(&config)?;
                info!("Pipeline '{pipeline}' updated in {}", path.display());
                self.emit(&config, &config.pipelines, output::render_pipelines)
            }
        }
    }

    fn save(&self, config: &Config) -> Result<PathBuf> {
        let path = Config::resolve_path(self.config.as_deref())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        config.save(&path)?;
        Ok(path)
    }

    /// `config init` may create the file named by `--config`; everything else
    /// requires it to exist.
    fn load_config(&self) -> Result<Config> {
        let creating = matches!(
            self.command,
            Commands::Config {
                action: ConfigAction::Init { .. }
            }
        );
        match &self.config {
            Some(path) if creating && !path.exists() => Ok(Config::default()),
            path => Config::load(path.as_deref()),
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.load_config()?;

        match &self.command {
            Commands::Analyze {
                pipeline,
                environment,
                logs,
                issues,
                manifests,
                execute,
                auto_approve,
            } => {
                info!("Analyzing deployment of pipeline: {pipeline}");
                self.execute_analyze(
                    &config,
                    pipeline,
                    *environment,
                    logs.as_deref(),
                    issues.as_deref(),
                    manifests,
                    *execute,
                    *auto_approve,
                )
                .await
            }
            Commands::Execute {
                pipeline,
                analysis,
                auto_approve,
            } => {
                info!("Executing fixes for {pipeline}, analysis {analysis}");
                self.execute_fixes(&config, pipeline, analysis, *auto_approve)
                    .await
            }
            Commands::History { pipeline } => {
                let analyses = self.reader(&config)?.get_analysis_history(pipeline).await?;
                self.emit(&config, &analyses, |a| {
                    output::render_analysis_history(pipeline, a)
                })
            }
            Commands::Executions { pipeline } => {
                let executions = self.reader(&config)?.get_execution_history(pipeline).await?;
                self.emit(&config, &executions, |e| {
                    output::render_execution_history(pipeline, e)
                })
            }
            Commands::Tracking { pipeline } => {
                let tracking = self.reader(&config)?.get_gitops_tracking(pipeline).await?;
                self.emit(&config, &tracking, |t| {
                    output::render_tracking(pipeline, t.as_ref())
                })
            }
            Commands::Review {
                pipeline,
                commit,
                reject,
            } => {
                let tracking = self
                    .reader(&config)?
                    .review_commit(pipeline, commit, !reject)
                    .await?;
                self.emit(&config, &tracking, |t| {
                    output::render_tracking(pipeline, Some(t))
                })
            }
            Commands::Config { action } => self.execute_config(config, action).await,
            Commands::Analytics => {
                let summary = self.reader(&config)?.generate_analytics().await?;
                self.emit(&config, &summary, output::render_analytics)
            }
            Commands::ClearState => {
                let state_dir = self.resolve_state_dir(&config)?;
                store::clear_state(&state_dir)?;
                Ok(())
            }
        }
    }
}
