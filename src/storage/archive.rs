//! Monthly archival of daily partitions.
//!
//! On the first day of a month the previous month's partitions are merged
//! into one archive file, optionally copied to a long-term blob location, and
//! optionally removed from the daily tree.
//!
//! # Failure Handling
//!
//! Nothing here is fatal to the caller:
//! - a month with no partitions (or an unreadable one) yields `None`
//! - a failed blob copy leaves the archive in the local archive dir only
//! - deletion failures are logged per file and the remaining files are still
//!   attempted; a partition that is already gone is skipped with a warning

use super::PaperStorage;
use chrono::{Datelike, NaiveDate};
use std::error::Error;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Destination for finished archive files.
pub trait BlobStore {
    /// Store `bytes` under `key`, replacing any previous object.
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<(), Box<dyn Error>>;
}

/// [`BlobStore`] backed by a local (or mounted) directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BlobStore for FsBlobStore {
    #[instrument(level = "info", skip(self, bytes), fields(root = %self.root.display(), size = bytes.len()))]
    async fn write(&self, key: &str, bytes: Vec<u8>) -> Result<(), Box<dyn Error>> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        info!(path = %path.display(), "Wrote archive blob");
        Ok(())
    }
}

/// The month to archive when `today` is the first of a month.
pub fn archive_due(today: NaiveDate) -> Option<(i32, u32)> {
    if today.day() != 1 {
        return None;
    }
    if today.month() == 1 {
        Some((today.year() - 1, 12))
    } else {
        Some((today.year(), today.month() - 1))
    }
}

/// Result of a successful [`Archiver::archive_month`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    /// The merged file in the local archive dir.
    pub path: PathBuf,
    /// Whether the blob copy succeeded.
    pub copied: bool,
    /// Daily partitions removed.
    pub deleted: usize,
}

#[derive(Debug)]
pub struct Archiver<B> {
    blob: Option<B>,
}

impl<B: BlobStore> Archiver<B> {
    pub fn new(blob: Option<B>) -> Self {
        Self { blob }
    }

    /// Merge, copy, and optionally clean up one month.
    #[instrument(level = "info", skip(self, storage))]
    pub async fn archive_month(
        &self,
        storage: &PaperStorage,
        year: i32,
        month: u32,
        delete_daily_files: bool,
    ) -> Option<ArchiveOutcome> {
        info!("Starting archive {year}-{month:02}");
        let sources = storage.list_partitions(year, month).collect::<Vec<_>>();

        let path = match storage.merge_month(year, month) {
            Ok(Some(path)) => path,
            Ok(None) => {
                warn!("Nothing to archive for {year}-{month:02}");
                return None;
            }
            Err(e) => {
                error!(error = %e, "Monthly merge failed; daily partitions left untouched");
                return None;
            }
        };

        let copied = match &self.blob {
            Some(blob) => copy_to_blob(blob, &path, year, month).await,
            None => false,
        };

        let deleted = if delete_daily_files {
            sources.iter().filter(|p| remove_partition(p)).count()
        } else {
            0
        };

        info!(path = %path.display(), copied, deleted, "Archive completed {year}-{month:02}");
        Some(ArchiveOutcome {
            path,
            copied,
            deleted,
        })
    }
}

async fn copy_to_blob<B: BlobStore>(blob: &B, path: &Path, year: i32, month: u32) -> bool {
    let key = format!("{year}/{year}{month:02}.parquet");
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read archive for blob copy");
            return false;
        }
    };
    match blob.write(&key, bytes).await {
        Ok(()) => true,
        Err(e) => {
            warn!(%key, error = %e, "Blob write failed; archive kept in local archive dir");
            false
        }
    }
}

/// Delete one daily partition; `true` only if a file was removed.
fn remove_partition(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Deleted daily partition");
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "Daily partition already gone; skipping");
            false
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Failed to delete daily partition");
            false
        }
    }
}
