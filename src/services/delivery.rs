//! Delivery pipeline
//!
//! Both discovery paths feed candidates through [`Pipeline::offer`]:
//! classify, claim, then spawn a detached worker that delivers the file and
//! removes it on success. The caller gets control back as soon as the worker
//! is spawned.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use super::classifier::is_image;
use super::notifier::{DeliveryOutcome, NotificationSink};
use super::registry::DedupRegistry;
use crate::error::DeliveryError;

/// Which discovery path surfaced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    Upload,
    Scan,
}

impl fmt::Display for Discovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discovery::Upload => f.write_str("upload"),
            Discovery::Scan => f.write_str("scan"),
        }
    }
}

/// What happened to an offered candidate
#[derive(Debug)]
pub enum Offer {
    NotImage,
    AlreadyClaimed,
    /// A worker was spawned. Dropping the handle detaches it.
    Spawned(JoinHandle<DeliveryOutcome>),
}

impl Offer {
    pub fn is_spawned(&self) -> bool {
        matches!(self, Offer::Spawned(_))
    }
}

/// Shared gate between discovery paths and delivery workers
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<DedupRegistry>,
    sink: Arc<dyn NotificationSink>,
}

impl Pipeline {
    pub fn new(registry: Arc<DedupRegistry>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &DedupRegistry {
        &self.registry
    }

    /// Offer a candidate path for delivery.
    ///
    /// Must be called from within a Tokio runtime. Classification reads at
    /// most a few dozen bytes, so this returns almost immediately.
    pub fn offer(&self, path: &Path, origin: Discovery) -> Offer {
        if !is_image(path) {
            return Offer::NotImage;
        }

        if !self.registry.try_claim(path) {
            debug!(path = %path.display(), %origin, "Already claimed");
            return Offer::AlreadyClaimed;
        }

        Offer::Spawned(spawn_delivery(Arc::clone(&self.sink), path.to_path_buf(), origin))
    }
}

/// Spawn a detached delivery worker for a claimed image
pub fn spawn_delivery(
    sink: Arc<dyn NotificationSink>,
    path: PathBuf,
    origin: Discovery,
) -> JoinHandle<DeliveryOutcome> {
    let span = tracing::info_span!(
        "delivery",
        id = %uuid::Uuid::new_v4(),
        path = %path.display(),
        %origin
    );

    tokio::spawn(async move { deliver_and_cleanup(sink.as_ref(), &path).await }.instrument(span))
}

/// Deliver one file and remove it after a confirmed delivery.
///
/// Failed deliveries leave the file in place. There is no retry.
pub async fn deliver_and_cleanup(sink: &dyn NotificationSink, path: &Path) -> DeliveryOutcome {
    let outcome = sink.deliver(path).await;

    match &outcome {
        DeliveryOutcome::Delivered => {
            info!("Delivered");
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(error = %e, "Failed to delete delivered file");
            }
        }
        DeliveryOutcome::Failed(DeliveryError::NotConfigured) => {
            debug!("Delivery skipped, file kept");
        }
        DeliveryOutcome::Failed(e) => {
            warn!(error = %e, "Delivery failed, file kept");
        }
    }

    outcome
}
