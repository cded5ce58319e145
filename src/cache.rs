//! Membership cache of paper identifiers that have already been handled.
//!
//! The cache answers "have we posted this paper already?" in constant time
//! and survives restarts through a JSON snapshot:
//!
//! ```json
//! { "paper_ids": ["2510.01234", "2510.04321"] }
//! ```
//!
//! It is a cache of the partitioned store, not a replacement for it. At
//! startup it is seeded with every identifier found in the daily partitions,
//! which repairs a lost or stale snapshot. Every mutation rewrites the whole
//! snapshot.

use crate::error::StorageResult;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

#[derive(Debug, Default, Deserialize, Serialize)]
struct Snapshot {
    #[serde(default)]
    paper_ids: Vec<String>,
}

#[derive(Debug)]
pub struct PaperCache {
    path: PathBuf,
    ids: HashSet<String>,
}

impl PaperCache {
    /// Load the snapshot at `path` and union it with `seed`.
    ///
    /// A missing snapshot starts empty; an unreadable one starts empty with a
    /// warning. When `seed` is non-empty the union is written back at once.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display(), seed = seed.len()))]
    pub fn open(path: impl AsRef<Path>, seed: HashSet<String>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut cache = Self {
            ids: load_snapshot(&path),
            path,
        };

        if !seed.is_empty() {
            cache.ids.extend(seed);
            cache.save()?;
        }
        info!(size = cache.size(), "Cache initialized");
        Ok(cache)
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn add(&mut self, id: impl Into<String>) -> StorageResult<()> {
        self.ids.insert(id.into());
        self.save()
    }

    pub fn add_batch<I>(&mut self, ids: I) -> StorageResult<()>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.ids.extend(ids.into_iter().map(Into::into));
        self.save()
    }

    pub fn clear(&mut self) -> StorageResult<()> {
        self.ids.clear();
        self.save()
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    fn save(&self) -> StorageResult<()> {
        let mut paper_ids = self.ids.iter().cloned().collect::<Vec<_>>();
        paper_ids.sort();
        let json = serde_json::to_string_pretty(&Snapshot { paper_ids })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> HashSet<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashSet::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read cache snapshot; starting empty");
            return HashSet::new();
        }
    };
    match serde_json::from_str::<Snapshot>(&raw) {
        Ok(snapshot) => snapshot.paper_ids.into_iter().collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse cache snapshot; starting empty");
            HashSet::new()
        }
    }
}
