//! The fetch → persist → notify → re-cache → archive cycle.
//!
//! # Cycle
//!
//! 1. Fetch today's papers from the [`PaperSource`]
//! 2. Split them into known and new by cache membership
//! 3. Persist the whole fetched batch into today's partition
//! 4. Render and send each new paper, pausing `send_delay` between posts
//! 5. Add the identifiers whose send succeeded to the cache
//! 6. On the first of a month, archive the previous month once
//!
//! A paper whose send fails stays out of the cache, so the next cycle offers
//! it again. Storage or cache write failures are logged and the cycle goes on.

use crate::api::Translate;
use crate::cache::PaperCache;
use crate::channel::Messenger;
use crate::message::{Limits, format_paper_message};
use crate::models::Paper;
use crate::scrapers::PaperSource;
use crate::storage::PaperStorage;
use crate::storage::archive::{ArchiveOutcome, Archiver, BlobStore, archive_due};
use chrono::{NaiveDate, Utc};
use itertools::Itertools;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument};

#[derive(Debug, Clone)]
pub struct BotSettings {
    pub interval: Duration,
    pub send_delay: Duration,
    pub target_lang: String,
    pub delete_daily_files: bool,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new: usize,
    pub sent: usize,
    pub failed: usize,
    pub partition: Option<PathBuf>,
    pub archived: Option<ArchiveOutcome>,
}

pub struct PaperBot<S, M, T, B> {
    source: S,
    messenger: M,
    translator: T,
    storage: PaperStorage,
    cache: PaperCache,
    archiver: Archiver<B>,
    settings: BotSettings,
    last_archived: Option<(i32, u32)>,
}

impl<S, M, T, B> PaperBot<S, M, T, B>
where
    S: PaperSource,
    M: Messenger,
    T: Translate,
    B: BlobStore,
{
    pub fn new(
        source: S,
        messenger: M,
        translator: T,
        storage: PaperStorage,
        cache: PaperCache,
        archiver: Archiver<B>,
        settings: BotSettings,
    ) -> Self {
        Self {
            source,
            messenger,
            translator,
            storage,
            cache,
            archiver,
            settings,
            last_archived: None,
        }
    }

    /// Run a cycle now, then one every `interval`, forever.
    pub async fn run(&mut self) {
        info!(interval_secs = self.settings.interval.as_secs(), "Bot started");
        loop {
            self.run_cycle(Utc::now().date_naive()).await;
            info!(secs = self.settings.interval.as_secs(), "Waiting for next cycle");
            sleep(self.settings.interval).await;
        }
    }

    /// One full cycle for `today`. Never fails; problems are logged.
    #[instrument(level = "info", skip(self))]
    pub async fn run_cycle(&mut self, today: NaiveDate) -> CycleReport {
        let mut report = CycleReport::default();

        let papers = match self.source.fetch(today).await {
            Ok(papers) => papers,
            Err(e) => {
                error!(error = %e, "Fetching papers failed");
                return report;
            }
        };
        report.fetched = papers.len();

        let fresh = papers
            .iter()
            .filter(|p| !self.cache.is_known(&p.id))
            .unique_by(|p| p.id.clone())
            .collect::<Vec<_>>();
        report.new = fresh.len();
        info!(fetched = report.fetched, new = report.new, "Filtered papers");

        match self.storage.write_daily(&papers, today) {
            Ok(path) => report.partition = path,
            Err(e) => error!(error = %e, "Persisting papers failed"),
        }

        let mut delivered = Vec::with_capacity(fresh.len());
        for (i, paper) in fresh.iter().enumerate() {
            if i > 0 {
                sleep(self.settings.send_delay).await;
            }
            let body = self.render(paper).await;
            if self.messenger.send(paper, &body, paper.has_image()).await {
                delivered.push(paper.id.clone());
            } else {
                report.failed += 1;
            }
        }
        report.sent = delivered.len();

        if !delivered.is_empty() {
            if let Err(e) = self.cache.add_batch(delivered) {
                error!(error = %e, "Saving cache failed");
            }
        }

        report.archived = self.archive_if_due(today).await;

        info!(
            fetched = report.fetched,
            new = report.new,
            sent = report.sent,
            failed = report.failed,
            partition = ?report.partition,
            archived = report.archived.is_some(),
            cache_size = self.cache.size(),
            "Cycle finished"
        );
        report
    }

    async fn render(&self, paper: &Paper) -> String {
        let limits = Limits::for_paper(paper);
        let summary = self
            .translator
            .summarize(&paper.abstract_text, limits.abstract_len)
            .await;
        let text = if summary.trim().is_empty() {
            summary
        } else {
            self.translator
                .translate(&summary, &self.settings.target_lang)
                .await
        };
        format_paper_message(paper, &text, limits.message_len)
    }

    async fn archive_if_due(&mut self, today: NaiveDate) -> Option<ArchiveOutcome> {
        let (year, month) = archive_due(today)?;
        if self.last_archived == Some((year, month)) {
            debug!("{year}-{month:02} already archived");
            return None;
        }
        self.last_archived = Some((year, month));
        self.archiver
            .archive_month(&self.storage, year, month, self.settings.delete_daily_files)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NullTranslator;
    use crate::storage::archive::FsBlobStore;
    use std::cell::{Cell, RefCell};
    use std::collections::HashSet;
    use std::error::Error;
    use tempfile::TempDir;

    /// Returns the same batch every call, or fails when `papers` is `None`.
    struct FixedSource {
        papers: Option<Vec<Paper>>,
    }

    impl PaperSource for FixedSource {
        async fn fetch(&self, _date: NaiveDate) -> Result<Vec<Paper>, Box<dyn Error>> {
            self.papers.clone().ok_or_else(|| "listing unavailable".into())
        }
    }

    #[derive(Default)]
    struct RecordingMessenger {
        sent: RefCell<Vec<String>>,
        bodies: RefCell<Vec<String>>,
        failing: Cell<bool>,
    }

    impl Messenger for RecordingMessenger {
        async fn send(&self, paper: &Paper, body: &str, _has_image: bool) -> bool {
            if self.failing.get() {
                return false;
            }
            self.sent.borrow_mut().push(paper.id.clone());
            self.bodies.borrow_mut().push(body.to_string());
            true
        }
    }

    type TestBot = PaperBot<FixedSource, RecordingMessenger, NullTranslator, FsBlobStore>;

    fn paper(id: &str) -> Paper {
        let mut p = Paper::new(format!("https://huggingface.co/papers/{id}"), format!("Paper {id}"));
        p.abstract_text = format!("Abstract of {id}.");
        p
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bot(dir: &TempDir, papers: Option<Vec<Paper>>, seed: &[&str], delete_daily_files: bool) -> TestBot {
        let storage = PaperStorage::new(dir.path().join("data"), dir.path().join("archive")).unwrap();
        let seed = seed.iter().map(|s| s.to_string()).collect::<HashSet<_>>();
        let cache = PaperCache::open(dir.path().join("cache.json"), seed).unwrap();
        PaperBot::new(
            FixedSource { papers },
            RecordingMessenger::default(),
            NullTranslator,
            storage,
            cache,
            Archiver::new(None),
            BotSettings {
                interval: Duration::from_secs(3600),
                send_delay: Duration::ZERO,
                target_lang: "Chinese".to_string(),
                delete_daily_files,
            },
        )
    }

    #[tokio::test]
    async fn test_cycle_sends_only_new_papers() {
        let dir = TempDir::new().unwrap();
        let mut bot = bot(&dir, Some(vec![paper("a"), paper("b"), paper("c")]), &["a", "b"], false);
        let today = date(2025, 3, 15);

        let report = bot.run_cycle(today).await;

        assert_eq!(report.fetched, 3);
        assert_eq!(report.new, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.partition, Some(bot.storage.partition_path(today)));
        assert_eq!(*bot.messenger.sent.borrow(), vec!["c"]);
        assert!(bot.messenger.bodies.borrow()[0].contains("Abstract of c\\."));
        assert_eq!(bot.cache.size(), 3);
        assert!(bot.cache.is_known("c"));
        assert_eq!(bot.storage.load_by_date(today).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_second_cycle_is_quiet_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut bot = bot(&dir, Some(vec![paper("a"), paper("b")]), &[], false);
        let today = date(2025, 3, 15);

        assert_eq!(bot.run_cycle(today).await.sent, 2);
        let second = bot.run_cycle(today).await;

        assert_eq!(second.new, 0);
        assert_eq!(second.sent, 0);
        assert_eq!(bot.messenger.sent.borrow().len(), 2);
        assert_eq!(bot.storage.load_by_date(today).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_send_is_retried_next_cycle() {
        let dir = TempDir::new().unwrap();
        let mut bot = bot(&dir, Some(vec![paper("c")]), &[], false);
        let today = date(2025, 3, 15);

        bot.messenger.failing.set(true);
        let first = bot.run_cycle(today).await;
        assert_eq!(first.sent, 0);
        assert_eq!(first.failed, 1);
        assert!(!bot.cache.is_known("c"));
        assert_eq!(bot.storage.load_by_date(today).unwrap().len(), 1);

        bot.messenger.failing.set(false);
        let second = bot.run_cycle(today).await;
        assert_eq!(second.sent, 1);
        assert!(bot.cache.is_known("c"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_batch_send_once() {
        let dir = TempDir::new().unwrap();
        let mut bot = bot(&dir, Some(vec![paper("x"), paper("x")]), &[], false);

        let report = bot.run_cycle(date(2025, 3, 15)).await;

        assert_eq!(report.new, 1);
        assert_eq!(*bot.messenger.sent.borrow(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_fetch_failure_ends_cycle() {
        let dir = TempDir::new().unwrap();
        let mut bot = bot(&dir, None, &["a"], false);

        let report = bot.run_cycle(date(2025, 3, 1)).await;

        assert_eq!(report, CycleReport::default());
        assert!(bot.messenger.sent.borrow().is_empty());
        assert_eq!(bot.cache.size(), 1);
    }

    #[tokio::test]
    async fn test_archive_runs_once_on_first_of_month() {
        let dir = TempDir::new().unwrap();
        let mut bot = bot(&dir, Some(vec![]), &[], true);
        let february = date(2025, 2, 10);
        bot.storage.write_daily(&[paper("a"), paper("b")], february).unwrap();

        let quiet = bot.run_cycle(date(2025, 2, 28)).await;
        assert!(quiet.archived.is_none());

        let first = bot.run_cycle(date(2025, 3, 1)).await;
        let outcome = first.archived.expect("february archived");
        assert_eq!(outcome.path, bot.storage.archive_path(2025, 2));
        assert_eq!(outcome.deleted, 1);
        assert!(!outcome.copied);
        assert!(!bot.storage.partition_path(february).exists());

        let again = bot.run_cycle(date(2025, 3, 1)).await;
        assert!(again.archived.is_none());
    }

    #[tokio::test]
    async fn test_january_archives_previous_december() {
        let dir = TempDir::new().unwrap();
        let mut bot = bot(&dir, Some(vec![]), &[], false);
        bot.storage.write_daily(&[paper("z")], date(2024, 12, 31)).unwrap();

        let report = bot.run_cycle(date(2025, 1, 1)).await;

        let outcome = report.archived.expect("december archived");
        assert_eq!(outcome.path, bot.storage.archive_path(2024, 12));
        assert_eq!(outcome.deleted, 0);
        assert!(bot.storage.partition_path(date(2024, 12, 31)).exists());
    }
}
