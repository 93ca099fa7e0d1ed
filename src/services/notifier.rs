//! Webhook notification sink
//!
//! Posts one file per request as multipart form data:
//! - `files[0]`: the file bytes with its filename and guessed MIME type
//! - `payload_json`: `{"content": <message>}`
//!
//! The sink never touches the local file beyond reading it. Deleting after a
//! successful delivery is the worker's job.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::multipart::{Form, Part};
use reqwest::{redirect, Client};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{DeliveryError, RelayError};

/// Upper bound on one outbound delivery
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest response body kept for diagnostics
const MAX_ERROR_BODY: usize = 512;

/// Result of one delivery attempt
#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(DeliveryError),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

impl From<Result<(), DeliveryError>> for DeliveryOutcome {
    fn from(result: Result<(), DeliveryError>) -> Self {
        match result {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => DeliveryOutcome::Failed(e),
        }
    }
}

/// Destination for finished uploads
#[async_trait]
pub trait NotificationSink: Send + Sync + fmt::Debug {
    /// Deliver the file at `path`. Must not modify the file.
    async fn deliver(&self, path: &Path) -> DeliveryOutcome;
}

/// Sink that posts to a Discord-style webhook
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    endpoint: Option<String>,
    message: String,
}

impl WebhookSink {
    /// Create a sink. With `endpoint = None` every delivery is skipped.
    ///
    /// Redirects are not followed: the outcome is always the configured
    /// endpoint's own status, never a second host's.
    pub fn new(endpoint: Option<String>, message: impl Into<String>) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .redirect(redirect::Policy::none())
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(RelayError::HttpClient)?;

        Ok(Self {
            client,
            endpoint: endpoint.filter(|url| !url.trim().is_empty()),
            message: message.into(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn post(&self, endpoint: &str, path: &Path) -> Result<(), DeliveryError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DeliveryError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        let part = Part::bytes(bytes)
            .file_name(filename)
            .mime_str(mime_for(path).as_str())?;

        let payload = serde_json::json!({ "content": self.message });
        let form = Form::new()
            .text("payload_json", payload.to_string())
            .part("files[0]", part);

        let response = self.client.post(endpoint).multipart(form).send().await?;
        let status = response.status();

        if status.is_client_error() || status.is_server_error() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(DeliveryError::Rejected { status, body });
        }

        // Below 400 counts as delivered, 3xx included
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            warn!(%status, location, "Webhook answered with a redirect; not followed");
        }

        Ok(())
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, path: &Path) -> DeliveryOutcome {
        let Some(endpoint) = self.endpoint.as_deref() else {
            info!(path = %path.display(), "Webhook URL not set; skipping upload");
            return DeliveryOutcome::Failed(DeliveryError::NotConfigured);
        };

        self.post(endpoint, path).await.into()
    }
}

/// MIME type from the filename, `application/octet-stream` when unknown
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn truncate_on_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
