//! Directory scanner
//!
//! Periodically walks the FTP root and offers every regular file to the
//! pipeline. Catches files the upload callback never reported (files present
//! before startup, uploads that landed while the process was down).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::delivery::{Discovery, Offer, Pipeline};
use super::notifier::DeliveryOutcome;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MIN_AGE: Duration = Duration::from_secs(2);

/// Periodic recursive scan of the watched root
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    root: PathBuf,
    pipeline: Pipeline,

    /// Pause between the end of one walk and the start of the next
    interval: Duration,

    /// Files modified more recently than this are left for a later tick
    min_age: Duration,
}

/// Statistics from one walk
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Regular files encountered
    pub files_seen: usize,

    /// Files classified as images (claimed now or earlier)
    pub images: usize,

    /// Images claimed during this walk
    pub claimed: usize,

    /// Files skipped because they were modified too recently
    pub too_young: usize,

    /// Entries that could not be read
    pub errors: usize,

    pub duration: Duration,

    /// Workers spawned during this walk. Dropping them detaches the workers.
    pub spawned: Vec<JoinHandle<DeliveryOutcome>>,
}

impl DirectoryScanner {
    pub fn new(root: PathBuf, pipeline: Pipeline) -> Self {
        Self {
            root,
            pipeline,
            interval: DEFAULT_SCAN_INTERVAL,
            min_age: DEFAULT_MIN_AGE,
        }
    }

    /// Set the pause between walks
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the minimum file age (zero disables the check)
    pub fn with_min_age(mut self, min_age: Duration) -> Self {
        self.min_age = min_age;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan forever: walk, sleep, walk again
    pub async fn run(self) {
        info!(
            root = %self.root.display(),
            interval_ms = self.interval.as_millis() as u64,
            "Directory scanner started"
        );

        loop {
            let report = self.scan_once().await;

            if report.claimed > 0 || report.errors > 0 {
                info!(
                    files = report.files_seen,
                    claimed = report.claimed,
                    errors = report.errors,
                    duration_ms = report.duration.as_millis() as u64,
                    "Scan complete"
                );
            } else {
                debug!(
                    files = report.files_seen,
                    images = report.images,
                    too_young = report.too_young,
                    duration_ms = report.duration.as_millis() as u64,
                    "Scan complete"
                );
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Walk the root once, offering every regular file to the pipeline
    pub async fn scan_once(&self) -> ScanReport {
        let scanner = self.clone();

        match tokio::task::spawn_blocking(move || scanner.walk()).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Scan task failed");
                ScanReport {
                    errors: 1,
                    ..ScanReport::default()
                }
            }
        }
    }

    fn walk(&self) -> ScanReport {
        let start = Instant::now();
        let mut report = ScanReport::default();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Walk error");
                    report.errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            report.files_seen += 1;

            match self.is_settled(&entry) {
                Some(true) => {}
                Some(false) => {
                    report.too_young += 1;
                    continue;
                }
                None => {
                    report.errors += 1;
                    continue;
                }
            }

            match self.pipeline.offer(entry.path(), Discovery::Scan) {
                Offer::NotImage => {}
                Offer::AlreadyClaimed => report.images += 1,
                Offer::Spawned(handle) => {
                    report.images += 1;
                    report.claimed += 1;
                    report.spawned.push(handle);
                }
            }
        }

        report.duration = start.elapsed();
        report
    }

    /// `None` when the file's metadata cannot be read
    fn is_settled(&self, entry: &DirEntry) -> Option<bool> {
        if self.min_age.is_zero() {
            return Some(true);
        }

        let modified = match entry
            .metadata()
            .map_err(std::io::Error::from)
            .and_then(|m| m.modified())
        {
            Ok(modified) => modified,
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "Cannot read metadata");
                return None;
            }
        };

        // A modification time in the future counts as settled
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::MAX);
        Some(age >= self.min_age)
    }
}
