use thiserror::Error;

use crate::models::PipelineStage;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not signed in: no user id configured")]
    NotSignedIn,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures surfaced by the summary pipeline. Every terminal failure of a
/// generation or load ends in one of these, never in a silent empty value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Could not allocate a summary id: {0}")]
    AllocationFailed(String),

    #[error("Generation request failed: {0}")]
    RequestFailed(String),

    #[error("Could not parse generation response: {0}")]
    ResponseParseFailed(String),

    #[error("Could not save summary: {0}")]
    PersistFailed(String),

    #[error("Could not load summaries: {0}")]
    FetchFailed(String),

    #[error("Timed out while {stage}")]
    TimedOut { stage: PipelineStage },

    #[error("Cancelled")]
    Cancelled,
}
