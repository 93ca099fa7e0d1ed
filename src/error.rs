//! Error types
//!
//! Per-file failures (`DeliveryError`) never leave a delivery worker; they are
//! logged and folded into a `DeliveryOutcome`. Startup failures (`RelayError`)
//! stop the process before the FTP server starts serving.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Invalid configuration value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("passive port range must be in the form START-END, got {0:?}")]
    PortRangeFormat(String),

    #[error("invalid port {value:?} in passive port range")]
    PortNumber { value: String },

    #[error("passive port range start ({start}) must be <= end ({end})")]
    PortRangeOrder { start: u16, end: u16 },

    #[error("invalid duration {0:?}: expected a number of seconds")]
    Duration(String),

    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },

    #[error("invalid webhook URL {0}")]
    WebhookUrl(String),
}

/// Why a single delivery did not reach the endpoint
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no webhook URL configured")]
    NotConfigured,

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook rejected upload ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Fatal startup errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create FTP home {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("FTP server error: {0}")]
    Server(String),
}
