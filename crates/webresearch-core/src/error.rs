use std::path::PathBuf;

use thiserror::Error;

/// Core error type for the research pipeline.
#[derive(Debug, Error)]
pub enum WebResearchError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no search queries provided")]
    EmptyQuery,
    #[error("search provider error: {0}")]
    Search(String),
    #[error("LLM request failed: {0}")]
    Llm(String),
    #[error("cache I/O error at {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WebResearchError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn cache_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::Cache { path, source }
    }
}
