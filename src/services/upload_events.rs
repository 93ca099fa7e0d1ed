//! Upload event source
//!
//! Fed by the FTP server once per completed upload. Hands the path to the
//! pipeline and returns without waiting for delivery.

use async_trait::async_trait;
use libunftp::auth::DefaultUser;
use libunftp::storage::{Fileinfo, Metadata, Result, StorageBackend};
use std::fmt::Debug;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::task::JoinError;
use tracing::{info, warn};
use unftp_sbe_fs::{Filesystem, Meta};

use super::delivery::{Discovery, Offer, Pipeline};

/// Entry point for "file received" notifications
#[derive(Debug, Clone)]
pub struct UploadEventSource {
    pipeline: Pipeline,
}

impl UploadEventSource {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// Called once per fully received upload. Reads the file header, so
    /// async callers should go through [`Self::file_received`].
    pub fn on_file_received(&self, path: &Path) -> Offer {
        let offer = self.pipeline.offer(path, Discovery::Upload);
        if let Offer::NotImage = offer {
            info!(path = %path.display(), "Non-image upload received");
        }
        offer
    }

    /// [`Self::on_file_received`] on the blocking pool
    pub async fn file_received(&self, path: PathBuf) -> std::result::Result<Offer, JoinError> {
        let events = self.clone();
        tokio::task::spawn_blocking(move || events.on_file_received(&path)).await
    }
}

/// Local filesystem storage that reports every stored file.
///
/// libunftp hands `put` the path already joined with the session's working
/// directory, so `CWD camera` + `STOR IMG_0001.JPG` arrives here as
/// `/camera/IMG_0001.JPG`.
#[derive(Debug)]
pub struct UploadNotifyingStorage {
    inner: Filesystem,
    root: PathBuf,
    events: UploadEventSource,
}

impl UploadNotifyingStorage {
    /// `root` must exist; it is opened once per FTP session
    pub fn new(root: PathBuf, events: UploadEventSource) -> Self {
        Self {
            inner: Filesystem::new(root.clone()),
            root,
            events,
        }
    }

    /// Hand a stored FTP path to the pipeline. `None` when the path does
    /// not name a file under the root or classification could not run.
    pub async fn report_upload(&self, virtual_path: &Path) -> Option<Offer> {
        let Some(local) = map_virtual_path(&self.root, virtual_path) else {
            warn!(path = %virtual_path.display(), "Ignoring upload outside FTP home");
            return None;
        };

        match self.events.file_received(local).await {
            Ok(offer) => Some(offer),
            Err(e) => {
                warn!(path = %virtual_path.display(), error = %e, "Upload classification task failed");
                None
            }
        }
    }
}

#[async_trait]
impl StorageBackend<DefaultUser> for UploadNotifyingStorage {
    type Metadata = Meta;

    fn enter(&mut self, user: &DefaultUser) -> io::Result<()> {
        self.inner.enter(user)
    }

    fn supported_features(&self) -> u32 {
        StorageBackend::<DefaultUser>::supported_features(&self.inner)
    }

    async fn metadata<P: AsRef<Path> + Send + Debug>(&self, user: &DefaultUser, path: P) -> Result<Meta> {
        self.inner.metadata(user, path).await
    }

    async fn md5<P: AsRef<Path> + Send + Debug>(&self, user: &DefaultUser, path: P) -> Result<String> {
        self.inner.md5(user, path).await
    }

    async fn list<P>(&self, user: &DefaultUser, path: P) -> Result<Vec<Fileinfo<PathBuf, Meta>>>
    where
        P: AsRef<Path> + Send + Debug,
        <Self as StorageBackend<DefaultUser>>::Metadata: Metadata,
    {
        self.inner.list(user, path).await
    }

    async fn get<P: AsRef<Path> + Send + Debug>(
        &self,
        user: &DefaultUser,
        path: P,
        start_pos: u64,
    ) -> Result<Box<dyn tokio::io::AsyncRead + Send + Sync + Unpin>> {
        self.inner.get(user, path, start_pos).await
    }

    async fn put<P: AsRef<Path> + Send + Debug, R: tokio::io::AsyncRead + Send + Sync + Unpin + 'static>(
        &self,
        user: &DefaultUser,
        input: R,
        path: P,
        start_pos: u64,
    ) -> Result<u64> {
        let path = path.as_ref().to_path_buf();
        let bytes = self.inner.put(user, input, &path, start_pos).await?;

        // Worker is detached; its outcome is logged
        let _ = self.report_upload(&path).await;
        Ok(bytes)
    }

    async fn del<P: AsRef<Path> + Send + Debug>(&self, user: &DefaultUser, path: P) -> Result<()> {
        self.inner.del(user, path).await
    }

    async fn mkd<P: AsRef<Path> + Send + Debug>(&self, user: &DefaultUser, path: P) -> Result<()> {
        self.inner.mkd(user, path).await
    }

    async fn rename<P: AsRef<Path> + Send + Debug>(&self, user: &DefaultUser, from: P, to: P) -> Result<()> {
        self.inner.rename(user, from, to).await
    }

    async fn rmd<P: AsRef<Path> + Send + Debug>(&self, user: &DefaultUser, path: P) -> Result<()> {
        self.inner.rmd(user, path).await
    }

    async fn cwd<P: AsRef<Path> + Send + Debug>(&self, user: &DefaultUser, path: P) -> Result<()> {
        self.inner.cwd(user, path).await
    }
}

/// Map an FTP path (rooted at the user's home) to a local path under `root`.
///
/// Returns `None` for paths that resolve to the root itself or escape it.
pub fn map_virtual_path(root: &Path, virtual_path: &Path) -> Option<PathBuf> {
    let mut relative = PathBuf::new();

    for component in virtual_path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return None;
                }
            }
            Component::Normal(part) => relative.push(part),
        }
    }

    if relative.as_os_str().is_empty() {
        return None;
    }

    Some(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::delivery::testing::*;
    use std::fs;
    use tempfile::tempdir;

    fn map(root: &str, virtual_path: &str) -> Option<PathBuf> {
        map_virtual_path(Path::new(root), Path::new(virtual_path))
    }

    #[test]
    fn test_map_virtual_path() {
        assert_eq!(map("/data", "/photo.jpg"), Some(PathBuf::from("/data/photo.jpg")));
        assert_eq!(
            map("/data", "/camera/./2024/../shot.png"),
            Some(PathBuf::from("/data/camera/shot.png"))
        );
        // Working directory already joined by the FTP session
        assert_eq!(
            map("/data", "/camera/IMG_0001.JPG"),
            Some(PathBuf::from("/data/camera/IMG_0001.JPG"))
        );
    }

    #[test]
    fn test_map_virtual_path_rejects_escape() {
        assert_eq!(map("/data", "/../etc/passwd"), None);
        assert_eq!(map("/data", "/a/../../b"), None);
        assert_eq!(map("/data", "/"), None);
    }

    #[tokio::test]
    async fn test_non_image_upload_is_ignored() {
        let dir = tempdir().unwrap();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, b"meeting at noon").unwrap();

        let sink = RecordingSink::succeeding();
        let events = UploadEventSource::new(pipeline_with(sink.clone()));

        assert!(matches!(events.on_file_received(&notes), Offer::NotImage));
        assert!(notes.exists());
        assert_eq!(sink.call_count(), 0);
    }

    #[tokio::test]
    async fn test_image_upload_is_delivered() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("photo.jpg");
        fs::write(&photo, JPEG_BYTES).unwrap();

        let sink = RecordingSink::succeeding();
        let events = UploadEventSource::new(pipeline_with(sink.clone()));

        match events.on_file_received(&photo) {
            Offer::Spawned(handle) => assert!(handle.await.unwrap().is_delivered()),
            other => panic!("expected delivery, got {:?}", other),
        }
        assert!(!photo.exists());
        assert!(matches!(events.on_file_received(&photo), Offer::AlreadyClaimed));
    }

    // Blocking pool and delivery worker must both work on a current-thread runtime
    #[tokio::test(flavor = "current_thread")]
    async fn test_file_received_runs_off_the_async_thread() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("photo.jpg");
        fs::write(&photo, JPEG_BYTES).unwrap();

        let sink = RecordingSink::succeeding();
        let events = UploadEventSource::new(pipeline_with(sink.clone()));

        match events.file_received(photo.clone()).await.unwrap() {
            Offer::Spawned(handle) => assert!(handle.await.unwrap().is_delivered()),
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(sink.calls(), vec![photo.clone()]);
        assert!(matches!(
            events.file_received(photo).await.unwrap(),
            Offer::AlreadyClaimed
        ));
    }

    #[tokio::test]
    async fn test_storage_reports_path_under_root() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("camera")).unwrap();
        let photo = dir.path().join("camera").join("IMG_0001.JPG");
        fs::write(&photo, JPEG_BYTES).unwrap();

        let sink = RecordingSink::succeeding();
        let storage = UploadNotifyingStorage::new(
            dir.path().to_path_buf(),
            UploadEventSource::new(pipeline_with(sink.clone())),
        );

        match storage.report_upload(Path::new("/camera/IMG_0001.JPG")).await {
            Some(Offer::Spawned(handle)) => assert!(handle.await.unwrap().is_delivered()),
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(sink.calls(), vec![photo]);
        assert!(storage.report_upload(Path::new("/../outside.jpg")).await.is_none());
    }

    #[tokio::test]
    async fn test_storage_put_writes_then_reports() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("camera")).unwrap();

        let sink = RecordingSink::succeeding();
        let pipeline = pipeline_with(sink.clone());
        let storage = UploadNotifyingStorage::new(
            dir.path().to_path_buf(),
            UploadEventSource::new(pipeline.clone()),
        );

        let written = storage
            .put(&DefaultUser, JPEG_BYTES, "/camera/IMG_0002.JPG", 0)
            .await
            .unwrap();

        assert_eq!(written, JPEG_BYTES.len() as u64);
        assert_eq!(pipeline.registry().len(), 1);
        assert!(pipeline.registry().is_claimed(&dir.path().join("camera").join("IMG_0002.JPG")));
    }
}
