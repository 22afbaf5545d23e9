use reqwest::Method;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors: anything that aborts the run before a single request
/// is sent. Transport errors during the run are logged and retried by
/// the workers instead, and never show up here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config '{path}': {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config field '{field}' must be greater than zero")]
    NonPositive { field: &'static str },

    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("invalid header '{name}'")]
    InvalidHeader { name: String },

    #[error("content type '{content_type}' is not supported for {method} bodies")]
    UnsupportedContentType {
        method: Method,
        content_type: String,
    },

    #[error("failed to encode request body: {0}")]
    EncodeBody(#[from] serde_json::Error),

    #[error("failed to build HTTP client: {0}")]
    BuildClient(#[source] reqwest::Error),

    #[error("statistics task failed: {0}")]
    Aggregator(#[source] tokio::task::JoinError),
}
