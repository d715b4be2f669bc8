//! Library error type.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while configuring or running a load test.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid duration '{input}': {reason}")]
    Duration { input: String, reason: String },

    #[error("invalid stage '{0}': expected <duration>:<target>, e.g. 30s:100")]
    Stage(String),

    #[error("invalid schedule: {0}")]
    Schedule(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{kind} error: {message}")]
    Transport {
        kind: crate::client::TransportErrorKind,
        message: String,
    },
}

impl LoadError {
    pub(crate) fn duration(input: &str, reason: impl Into<String>) -> Self {
        LoadError::Duration {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
