//! Partitioned Parquet storage for every paper the bot has observed.
//!
//! # Layout
//!
//! ```text
//! data_dir/
//! └── 2025/
//!     └── 10/
//!         ├── 20251001.parquet
//!         └── 20251002.parquet
//!
//! archive_dir/
//! └── 2025/
//!     └── 202510.parquet
//! ```
//!
//! Daily partitions are rewritten in full on every write for that day:
//! existing rows are loaded, incoming rows appended, and duplicates dropped
//! keeping the first occurrence, so data already on disk wins over a later
//! scrape of the same paper. Monthly archives are the same first-wins union
//! over a month's partitions in date order.
//!
//! # Submodules
//!
//! - [`columnar`]: the Parquet column layout and file codec
//! - [`archive`]: archival trigger policy and the blob copy step

pub mod archive;
pub mod columnar;

use crate::error::StorageResult;
use crate::models::Paper;
use chrono::{Datelike, NaiveDate};
use itertools::Itertools;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

const PARTITION_EXT: &str = "parquet";

/// Size accounting for one `YYYY-MM` month directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonthStats {
    pub files: usize,
    pub bytes: u64,
}

/// Size accounting over every daily partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub total_files: usize,
    pub total_bytes: u64,
    /// Keyed by `YYYY-MM`.
    pub months: BTreeMap<String, MonthStats>,
}

/// Daily partition store with monthly consolidation.
#[derive(Debug, Clone)]
pub struct PaperStorage {
    data_dir: PathBuf,
    archive_dir: PathBuf,
}

impl PaperStorage {
    /// Open (creating if needed) the data and archive directories.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        archive_dir: impl Into<PathBuf>,
    ) -> StorageResult<Self> {
        let data_dir = data_dir.into();
        let archive_dir = archive_dir.into();
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&archive_dir)?;
        info!(
            data_dir = %data_dir.display(),
            archive_dir = %archive_dir.display(),
            "Paper storage ready"
        );
        Ok(Self {
            data_dir,
            archive_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    fn month_dir(&self, year: i32, month: u32) -> PathBuf {
        self.data_dir.join(year.to_string()).join(format!("{month:02}"))
    }

    /// `<data_dir>/<year>/<MM>/<YYYYMMDD>.parquet`
    pub fn partition_path(&self, date: NaiveDate) -> PathBuf {
        self.month_dir(date.year(), date.month())
            .join(format!("{}.{PARTITION_EXT}", date.format("%Y%m%d")))
    }

    /// `<archive_dir>/<year>/<YYYYMM>.parquet`
    pub fn archive_path(&self, year: i32, month: u32) -> PathBuf {
        self.archive_dir
            .join(year.to_string())
            .join(format!("{year}{month:02}.{PARTITION_EXT}"))
    }

    /// Merge `records` into the partition for `date`.
    ///
    /// Returns `Ok(None)` without touching disk when `records` is empty.
    /// An existing partition that cannot be decoded is moved aside to
    /// `<YYYYMMDD>.parquet.corrupt` (numbered `.corrupt.<n>` if that name is
    /// taken) and `records` becomes the whole partition.
    #[instrument(level = "info", skip_all, fields(%date, incoming = records.len()))]
    pub fn write_daily(&self, records: &[Paper], date: NaiveDate) -> StorageResult<Option<PathBuf>> {
        if records.is_empty() {
            info!("No papers to save");
            return Ok(None);
        }

        let path = self.partition_path(date);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let merged = if path.exists() {
            match columnar::read_papers(&path) {
                Ok(existing) => {
                    let existing_count = existing.len();
                    let merged = dedup_first(existing.into_iter().chain(records.iter().cloned()));
                    info!(
                        existing = existing_count,
                        total = merged.len(),
                        "Merged with existing partition"
                    );
                    merged
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Existing partition unreadable; replacing it with the incoming batch"
                    );
                    quarantine(&path);
                    dedup_first(records.iter().cloned())
                }
            }
        } else {
            let fresh = dedup_first(records.iter().cloned());
            info!(total = fresh.len(), "Creating new partition");
            fresh
        };

        columnar::write_papers(&path, &merged)?;
        info!(path = %path.display(), rows = merged.len(), "Saved partition");
        Ok(Some(path))
    }

    /// Daily partition files for a month, ascending by date.
    pub fn list_partitions(&self, year: i32, month: u32) -> impl Iterator<Item = PathBuf> {
        let dir = self.month_dir(year, month);
        let mut files = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_daily_partition(p))
                .collect::<Vec<_>>(),
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Failed to list month directory");
                Vec::new()
            }
        };
        files.sort();
        files.into_iter()
    }

    /// Consolidate a month's partitions into its archive file.
    ///
    /// Returns `Ok(None)` when the month has no partitions. Any partition
    /// that fails to decode fails the whole merge.
    #[instrument(level = "info", skip(self))]
    pub fn merge_month(&self, year: i32, month: u32) -> StorageResult<Option<PathBuf>> {
        let files = self.list_partitions(year, month).collect::<Vec<_>>();
        if files.is_empty() {
            info!("No partitions found for {year}-{month:02}");
            return Ok(None);
        }

        let mut rows = Vec::new();
        for file in &files {
            rows.extend(columnar::read_papers(file)?);
        }
        let merged = dedup_first(rows);

        let archive_path = self.archive_path(year, month);
        if let Some(parent) = archive_path.parent() {
            fs::create_dir_all(parent)?;
        }
        columnar::write_papers(&archive_path, &merged)?;

        info!(
            files = files.len(),
            papers = merged.len(),
            path = %archive_path.display(),
            "Merged monthly partitions"
        );
        Ok(Some(archive_path))
    }

    /// Every identifier found in any daily partition.
    ///
    /// Unreadable files are logged and skipped.
    #[instrument(level = "info", skip(self))]
    pub fn load_all_identifiers(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        for (_, month_dir) in self.month_dirs() {
            for file in daily_partitions_in(&month_dir) {
                match columnar::read_papers(&file) {
                    Ok(papers) => ids.extend(papers.into_iter().map(|p| p.id)),
                    Err(e) => {
                        warn!(path = %file.display(), error = %e, "Failed to read partition; skipping")
                    }
                }
            }
        }
        info!(count = ids.len(), "Loaded paper IDs from storage");
        ids
    }

    /// All rows of the partition for `date`, or nothing if it does not exist.
    pub fn load_by_date(&self, date: NaiveDate) -> StorageResult<Vec<Paper>> {
        let path = self.partition_path(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        columnar::read_papers(&path)
    }

    /// File counts and sizes of the daily partitions.
    pub fn statistics(&self) -> StorageStats {
        let mut stats = StorageStats::default();
        for (key, month_dir) in self.month_dirs() {
            let mut month = MonthStats::default();
            for file in daily_partitions_in(&month_dir) {
                month.files += 1;
                month.bytes += fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
            }
            stats.total_files += month.files;
            stats.total_bytes += month.bytes;
            stats.months.insert(key, month);
        }
        stats
    }

    /// `(YYYY-MM, path)` for each `<year>/<month>` directory under the data dir.
    fn month_dirs(&self) -> Vec<(String, PathBuf)> {
        let mut out = Vec::new();
        for year_dir in numeric_subdirs(&self.data_dir, 4) {
            let Some(year) = file_name(&year_dir) else { continue };
            for month_dir in numeric_subdirs(&year_dir, 2) {
                if let Some(month) = file_name(&month_dir) {
                    out.push((format!("{year}-{month}"), month_dir));
                }
            }
        }
        out.sort();
        out
    }
}

/// Drop later records whose identifier was already seen.
pub fn dedup_first(papers: impl IntoIterator<Item = Paper>) -> Vec<Paper> {
    papers.into_iter().unique_by(|p| p.id.clone()).collect()
}

/// `<8 digits>.parquet`; monthly archives have a six-digit stem.
fn is_daily_partition(path: &Path) -> bool {
    let ext_ok = path.extension().and_then(|e| e.to_str()) == Some(PARTITION_EXT);
    let stem_ok = path
        .file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()));
    ext_ok && stem_ok
}

fn daily_partitions_in(dir: &Path) -> Vec<PathBuf> {
    let mut files = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_daily_partition(p))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    files.sort();
    files
}

fn numeric_subdirs(dir: &Path, width: usize) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .filter(|p| {
            file_name(p).is_some_and(|n| n.len() == width && n.bytes().all(|b| b.is_ascii_digit()))
        })
        .collect()
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// `<YYYYMMDD>.parquet.corrupt`, or `.corrupt.<n>` when earlier copies exist.
fn quarantine_target(path: &Path) -> PathBuf {
    let first = path.with_extension("parquet.corrupt");
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| path.with_extension(format!("parquet.corrupt.{n}")))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

fn quarantine(path: &Path) {
    let target = quarantine_target(path);
    match fs::rename(path, &target) {
        Ok(()) => warn!(from = %path.display(), to = %target.display(), "Moved unreadable partition aside"),
        Err(e) => warn!(path = %path.display(), error = %e, "Could not move unreadable partition aside"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paper(id: &str, title: &str) -> Paper {
        Paper::new(format!("https://huggingface.co/papers/{id}"), title)
    }

    fn ids(papers: &[Paper]) -> Vec<String> {
        papers.iter().map(|p| p.id.clone()).collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn storage(dir: &TempDir) -> PaperStorage {
        PaperStorage::new(dir.path().join("data"), dir.path().join("data/archive")).unwrap()
    }

    #[test]
    fn test_write_daily_empty_is_noop() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        assert_eq!(storage.write_daily(&[], date(2025, 10, 1)).unwrap(), None);
        assert!(!storage.partition_path(date(2025, 10, 1)).exists());
    }

    #[test]
    fn test_write_daily_layout() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let path = storage
            .write_daily(&[paper("1", "One")], date(2025, 10, 1))
            .unwrap()
            .unwrap();

        assert_eq!(path, dir.path().join("data/2025/10/20251001.parquet"));
        assert!(path.exists());
    }

    #[test]
    fn test_write_daily_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let batch = vec![paper("1", "One"), paper("2", "Two")];
        let day = date(2025, 10, 1);

        storage.write_daily(&batch, day).unwrap();
        let first = storage.load_by_date(day).unwrap();
        storage.write_daily(&batch, day).unwrap();
        let second = storage.load_by_date(day).unwrap();

        assert_eq!(first, second);
        assert_eq!(ids(&second), vec!["1", "2"]);
    }

    #[test]
    fn test_write_daily_existing_row_wins() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let day = date(2025, 10, 1);

        let mut original = paper("x", "Original title");
        original.hf_upvotes = Some(3);
        storage.write_daily(&[original], day).unwrap();

        let mut rescraped = paper("x", "Edited title");
        rescraped.hf_upvotes = Some(99);
        storage.write_daily(&[rescraped, paper("y", "New")], day).unwrap();

        let loaded = storage.load_by_date(day).unwrap();
        assert_eq!(ids(&loaded), vec!["x", "y"]);
        assert_eq!(loaded[0].title, "Original title");
        assert_eq!(loaded[0].hf_upvotes, Some(3));
    }

    #[test]
    fn test_write_daily_dedups_within_batch() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let day = date(2025, 10, 1);

        storage
            .write_daily(&[paper("a", "first"), paper("a", "second")], day)
            .unwrap();

        let loaded = storage.load_by_date(day).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "first");
    }

    #[test]
    fn test_write_daily_corrupt_partition_is_replaced_and_kept_aside() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let day = date(2025, 10, 1);
        let path = storage.partition_path(day);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"garbage").unwrap();

        storage.write_daily(&[paper("1", "One")], day).unwrap();

        assert_eq!(ids(&storage.load_by_date(day).unwrap()), vec!["1"]);
        let aside = path.with_extension("parquet.corrupt");
        assert_eq!(fs::read(aside).unwrap(), b"garbage");
        assert_eq!(storage.list_partitions(2025, 10).count(), 1);
    }

    #[test]
    fn test_repeated_corruption_keeps_every_copy() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let day = date(2025, 10, 1);
        let path = storage.partition_path(day);
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        fs::write(&path, b"first garbage").unwrap();
        storage.write_daily(&[paper("1", "One")], day).unwrap();
        fs::write(&path, b"second garbage").unwrap();
        storage.write_daily(&[paper("2", "Two")], day).unwrap();

        assert_eq!(fs::read(path.with_extension("parquet.corrupt")).unwrap(), b"first garbage");
        assert_eq!(fs::read(path.with_extension("parquet.corrupt.1")).unwrap(), b"second garbage");
        assert_eq!(ids(&storage.load_by_date(day).unwrap()), vec!["2"]);
        assert_eq!(storage.list_partitions(2025, 10).count(), 1);
    }

    #[test]
    fn test_list_partitions_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.write_daily(&[paper("3", "c")], date(2025, 10, 3)).unwrap();
        storage.write_daily(&[paper("1", "a")], date(2025, 10, 1)).unwrap();
        storage.write_daily(&[paper("2", "b")], date(2025, 10, 2)).unwrap();
        let month_dir = dir.path().join("data/2025/10");
        fs::write(month_dir.join("202510.parquet"), b"").unwrap();
        fs::write(month_dir.join("notes.txt"), b"").unwrap();

        let names = storage
            .list_partitions(2025, 10)
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        assert_eq!(
            names,
            vec!["20251001.parquet", "20251002.parquet", "20251003.parquet"]
        );
    }

    #[test]
    fn test_list_partitions_missing_month() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        assert_eq!(storage.list_partitions(1999, 1).count(), 0);
    }

    #[test]
    fn test_merge_month_is_complete_union() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .write_daily(&[paper("1", "one"), paper("2", "two@day1")], date(2025, 10, 1))
            .unwrap();
        storage
            .write_daily(&[paper("2", "two@day2"), paper("3", "three")], date(2025, 10, 2))
            .unwrap();
        storage.write_daily(&[paper("4", "four")], date(2025, 10, 3)).unwrap();

        let path = storage.merge_month(2025, 10).unwrap().unwrap();

        assert_eq!(path, dir.path().join("data/archive/2025/202510.parquet"));
        let merged = columnar::read_papers(&path).unwrap();
        assert_eq!(ids(&merged), vec!["1", "2", "3", "4"]);
        assert_eq!(merged[1].title, "two@day1");
    }

    #[test]
    fn test_merge_month_without_partitions() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        assert_eq!(storage.merge_month(2025, 9).unwrap(), None);
    }

    #[test]
    fn test_merge_month_fails_on_unreadable_partition() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.write_daily(&[paper("1", "one")], date(2025, 10, 1)).unwrap();
        fs::write(storage.partition_path(date(2025, 10, 2)), b"garbage").unwrap();

        assert!(storage.merge_month(2025, 10).is_err());
        assert!(!storage.archive_path(2025, 10).exists());
    }

    #[test]
    fn test_load_all_identifiers_spans_months_and_skips_archives() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage
            .write_daily(&[paper("a", "a"), paper("b", "b")], date(2025, 9, 30))
            .unwrap();
        storage.write_daily(&[paper("c", "c")], date(2025, 10, 1)).unwrap();
        storage.merge_month(2025, 9).unwrap();
        columnar::write_papers(
            &dir.path().join("data/2025/10/202510.parquet"),
            &[paper("archived-only", "z")],
        )
        .unwrap();
        fs::write(dir.path().join("data/2025/10/20251002.parquet"), b"garbage").unwrap();

        let found = storage.load_all_identifiers();

        let expected: HashSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_load_by_date_absent() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        assert!(storage.load_by_date(date(2025, 1, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_statistics() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        storage.write_daily(&[paper("a", "a")], date(2025, 9, 30)).unwrap();
        storage.write_daily(&[paper("b", "b")], date(2025, 10, 1)).unwrap();
        storage.write_daily(&[paper("c", "c")], date(2025, 10, 2)).unwrap();

        let stats = storage.statistics();

        assert_eq!(stats.total_files, 3);
        assert!(stats.total_bytes > 0);
        assert_eq!(stats.months["2025-09"].files, 1);
        assert_eq!(stats.months["2025-10"].files, 2);
    }
}
