use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::Environment;
use crate::policy::PipelineConfig;

const CANDIDATES: [&str; 4] = [
    "deployguard.toml",
    "deployguard.json",
    "deployguard.yaml",
    "deployguard.yml",
];

/// Configuration file structure for deployguard.
///
/// Holds the per-pipeline policies plus storage, remediation backend and
/// output preferences. Loaded from the current directory or a given path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Pipeline policies keyed by pipeline id, in file order
    #[serde(default)]
    pub pipelines: IndexMap<String, PipelineConfig>,

    /// Where execution history is kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Simulated remediation backend
    #[serde(default)]
    pub remediation: RemediationBackendConfig,

    /// Output format preferences
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// State directory (defaults to the platform data directory)
    pub state_dir: Option<PathBuf>,

    /// Persist history to disk; `false` keeps it in memory for one run
    #[serde(default = "default_true")]
    pub durable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemediationBackendConfig {
    /// Probability in 0..=1 that a fix succeeds
    #[serde(default = "default_reliability")]
    pub reliability: f64,

    #[serde(default = "default_min_latency_ms")]
    pub min_latency_ms: u64,

    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,

    /// Fixed seed for reproducible outcomes
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            durable: true,
        }
    }
}

impl Default for RemediationBackendConfig {
    fn default() -> Self {
        Self {
            reliability: default_reliability(),
            min_latency_ms: default_min_latency_ms(),
            max_latency_ms: default_max_latency_ms(),
            seed: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_reliability() -> f64 {
    0.9
}

fn default_min_latency_ms() -> u64 {
    100
}

fn default_max_latency_ms() -> u64 {
    500
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path (must exist)
    /// 2. ./deployguard.toml
    /// 3. ./deployguard.json
    /// 4. ./deployguard.yaml
    /// 5. ./deployguard.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match Self::resolve_path(path) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// The file `load` reads from, if any.
    pub fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = path {
            return Some(path.to_path_buf());
        }

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|candidate| candidate.exists())
            .map(Path::to_path_buf)
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let mut config: Self = match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?,
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?,
        };

        for (id, pipeline) in &mut config.pipelines {
            pipeline.id.clone_from(id);
        }

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Rejects out-of-range thresholds and backend settings.
    pub fn validate(&self) -> Result<()> {
        for pipeline in self.pipelines.values() {
            pipeline.validate()?;
        }

        let backend = &self.remediation;
        if !(0.0..=1.0).contains(&backend.reliability) {
            bail!(
                "remediation.reliability must be within 0..=1, got {}",
                backend.reliability
            );
        }
        if backend.min_latency_ms > backend.max_latency_ms {
            bail!(
                "remediation.min-latency-ms ({}) exceeds max-latency-ms ({})",
                backend.min_latency_ms,
                backend.max_latency_ms
            );
        }

        Ok(())
    }

    /// Adds a pipeline with default policies. Fails if the id is taken.
    pub fn add_pipeline(&mut self, id: &str, environment: Environment) -> Result<&PipelineConfig> {
        if self.pipelines.contains_key(id) {
            bail!("Pipeline '{id}' is already configured");
        }
        self.pipelines
            .insert(id.to_string(), PipelineConfig::new(id, environment));
        Ok(&self.pipelines[id])
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml" | "yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ApprovalRule;
    use std::collections::BTreeSet;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.pipelines.is_empty());
        assert!(config.storage.durable);
        assert_eq!(config.remediation.reliability, 0.9);
        assert!(matches!(config.output.format, OutputFormat::Summary));
        config.validate().unwrap();
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[pipelines.checkout]
environment = "production"
ai-integration-level = "advanced"

[pipelines.checkout.pre-deployment]
risk-threshold = 60

[pipelines.checkout.remediation]
approval-required = ["high-risk"]

[pipelines.checkout.sync]
repository = "git@example.com:ops/checkout.git"
auto-commit = true

[pipelines.search]

[storage]
durable = false

[remediation]
reliability = 1.0
seed = 7

[output]
format = "json"
pretty = true
"#;
        write!(temp_file, "{toml_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        let ids: Vec<_> = config.pipelines.keys().cloned().collect();
        assert_eq!(ids, vec!["checkout", "search"]);

        let checkout = &config.pipelines["checkout"];
        assert_eq!(checkout.id, "checkout");
        assert_eq!(checkout.environment, Environment::Production);
        assert_eq!(checkout.pre_deployment.risk_threshold, 60);
        assert_eq!(checkout.pre_deployment.required_confidence, 75);
        assert_eq!(
            checkout.remediation.approval_required,
            BTreeSet::from([ApprovalRule::HighRisk])
        );
        assert!(checkout.sync.auto_commit);
        assert_eq!(checkout.sync.branch, "main");

        let search = &config.pipelines["search"];
        assert_eq!(search.environment, Environment::Staging);
        assert_eq!(search.remediation.max_concurrent_fixes, 3);

        assert!(!config.storage.durable);
        assert_eq!(config.remediation.seed, Some(7));
        assert!(matches!(config.output.format, OutputFormat::Json));
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "pipelines": {
    "api": { "environment": "development" }
  },
  "storage": { "state-dir": "/tmp/deployguard-state" }
}"#;
        write!(temp_file, "{json_content}").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.pipelines["api"].id, "api");
        assert_eq!(config.pipelines["api"].environment, Environment::Development);
        assert_eq!(
            config.storage.state_dir,
            Some(PathBuf::from("/tmp/deployguard-state"))
        );
        assert!(config.storage.durable);
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            temp_file,
            "pipelines:\n  web:\n    remediation:\n      max-concurrent-fixes: 5\n"
        )
        .unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.pipelines["web"].remediation.max_concurrent_fixes, 5);
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let err = Config::load(Some(Path::new("nonexistent-deployguard.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(
            temp_file,
            "[pipelines.web.pre-deployment]\nrisk-threshold = 140\n"
        )
        .unwrap();

        let err = Config::load_from_path(temp_file.path()).unwrap_err();
        assert!(format!("{err:#}").contains("risk-threshold"));
    }

    #[test]
    fn test_invalid_backend_rejected() {
        let mut config = Config::default();
        config.remediation.reliability = 1.5;
        assert!(config.validate().is_err());

        config.remediation.reliability = 0.5;
        config.remediation.min_latency_ms = 900;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_add_pipeline_rejects_duplicates() {
        let mut config = Config::default();
        config.add_pipeline("web", Environment::Production).unwrap();
        assert!(config.add_pipeline("web", Environment::Staging).is_err());
        assert_eq!(config.pipelines["web"].environment, Environment::Production);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempfile::tempdir().unwrap();

        for name in ["deployguard.toml", "deployguard.json", "deployguard.yaml"] {
            let path = temp_dir.path().join(name);
            let mut config = Config::default();
            config.add_pipeline("web", Environment::Production).unwrap();
            config.pipelines["web"].remediation.confidence_threshold = 80;
            config.remediation.seed = Some(42);

            config.save(&path).unwrap();
            let reloaded = Config::load(Some(&path)).unwrap();
            assert_eq!(reloaded, config, "round trip through {name}");
        }
    }
}
