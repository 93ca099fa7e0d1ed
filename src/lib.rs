pub mod config;
pub mod error;
pub mod server;
pub mod services;

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use error::RelayError;
use server::{FtpServer, FtpSettings, TransferServer};
use services::delivery::Pipeline;
use services::notifier::WebhookSink;
use services::registry::DedupRegistry;
use services::scanner::DirectoryScanner;
use services::upload_events::UploadEventSource;

/// Load configuration, start logging and serve until the FTP server stops
/// or the process receives Ctrl-C.
pub async fn run() -> Result<(), RelayError> {
    // Optional .env next to the binary's working directory
    let _ = dotenvy::dotenv();

    // Initialize tracing with RUST_LOG env filter
    // Default: warn for dependencies, info for the service itself
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,ftpdrop=info")),
        )
        .init();

    let config = Config::parse();
    let root = prepare_root(&config.ftp_home)?;
    let server = FtpServer::new(FtpSettings::from_config(&config, root.clone()));

    serve(&config, root, Box::new(server)).await
}

/// Create the FTP home if needed and return its canonical form
pub fn prepare_root(path: &Path) -> Result<PathBuf, RelayError> {
    let create_error = |source| RelayError::CreateRoot {
        path: path.to_path_buf(),
        source,
    };
    std::fs::create_dir_all(path).map_err(create_error)?;
    path.canonicalize().map_err(create_error)
}

/// Wire the pipeline to `server` and the directory scanner, then serve
pub async fn serve(
    config: &Config,
    root: PathBuf,
    server: Box<dyn TransferServer>,
) -> Result<(), RelayError> {
    let sink = WebhookSink::new(config.webhook_url.clone(), config.message.clone())?;
    if !sink.is_configured() {
        warn!("DISCORD_WEBHOOK_URL not set; images will stay on disk");
    }

    let pipeline = Pipeline::new(Arc::new(DedupRegistry::new()), Arc::new(sink));
    let scanner = DirectoryScanner::new(root, pipeline.clone())
        .with_interval(config.scan_interval)
        .with_min_age(config.scan_min_age);
    let events = UploadEventSource::new(pipeline);

    let scan_task = tokio::spawn(scanner.run());

    let result = tokio::select! {
        result = server.serve(events) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    // In-flight deliveries are abandoned with the runtime
    scan_task.abort();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use services::delivery::testing::{JPEG_BYTES, PNG_BYTES};
    use services::delivery::Offer;
    use std::fs;
    use tempfile::tempdir;

    /// Reports a fixed list of uploads, waits for their workers, then stops.
    /// Fails unless every upload started its own worker.
    struct ScriptedServer {
        uploads: Vec<PathBuf>,
    }

    #[async_trait]
    impl TransferServer for ScriptedServer {
        async fn serve(self: Box<Self>, events: UploadEventSource) -> Result<(), RelayError> {
            for path in self.uploads {
                let offer = events
                    .file_received(path.clone())
                    .await
                    .map_err(|e| RelayError::Server(e.to_string()))?;
                match offer {
                    Offer::Spawned(handle) => {
                        handle.await.map_err(|e| RelayError::Server(e.to_string()))?;
                    }
                    other => {
                        return Err(RelayError::Server(format!("{}: {:?}", path.display(), other)));
                    }
                }
            }
            Ok(())
        }
    }

    // The scanner only takes files older than an hour, so fresh test files
    // are left to the scripted uploads
    fn config_for(root: &Path, extra: &[&str]) -> Config {
        let mut argv = vec!["ftpdrop", "--ftp-home", root.to_str().unwrap(), "--scan-min-age", "3600"];
        argv.extend_from_slice(extra);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_prepare_root_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("ftp").join("home");

        let root = prepare_root(&nested).unwrap();

        assert!(root.is_dir());
        assert!(root.is_absolute());
    }

    #[tokio::test]
    async fn test_unset_webhook_keeps_files() {
        let dir = tempdir().unwrap();
        let root = prepare_root(dir.path()).unwrap();
        let photo = root.join("photo.jpg");
        let shot = root.join("shot.png");
        fs::write(&photo, JPEG_BYTES).unwrap();
        fs::write(&shot, PNG_BYTES).unwrap();

        let config = config_for(&root, &[]);
        let server = ScriptedServer {
            uploads: vec![photo.clone(), shot.clone()],
        };

        serve(&config, root, Box::new(server)).await.unwrap();

        assert!(photo.exists());
        assert!(shot.exists());
    }

    #[tokio::test]
    async fn test_unreachable_webhook_keeps_files() {
        let dir = tempdir().unwrap();
        let root = prepare_root(dir.path()).unwrap();
        let photo = root.join("photo.jpg");
        fs::write(&photo, JPEG_BYTES).unwrap();

        let config = config_for(&root, &["--webhook-url", "http://127.0.0.1:9/hook"]);
        let server = ScriptedServer {
            uploads: vec![photo.clone()],
        };

        serve(&config, root, Box::new(server)).await.unwrap();

        assert!(photo.exists());
    }
}
