use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeployGuardError {
    #[error("No pipeline configuration found for '{0}'")]
    ConfigNotFound(String),

    #[error("Analysis '{analysis_id}' not found in history of pipeline '{pipeline_id}'")]
    AnalysisNotFound {
        pipeline_id: String,
        analysis_id: String,
    },

    #[error("Analysis '{0}' blocks deployment; remediation will not be scheduled")]
    DeploymentBlocked(String),

    #[error("Commit '{hash}' not found in GitOps tracking of pipeline '{pipeline_id}'")]
    CommitNotFound { pipeline_id: String, hash: String },

    #[error("Commit '{0}' has already been reviewed")]
    CommitAlreadyReviewed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("History store error: {0}")]
    Store(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeployGuardError>;
