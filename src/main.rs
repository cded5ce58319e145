//! # HF Papers Bot
//!
//! Watches the HuggingFace daily papers listing, posts every paper not seen
//! before to a Telegram channel, and keeps everything it observed in
//! date-partitioned Parquet files that are folded into monthly archives.
//!
//! ## Features
//!
//! - Scrapes titles, authors, abstracts, arXiv/GitHub links, upvotes and stars
//! - Optional abstract summarization and translation through any
//!   OpenAI-compatible chat endpoint
//! - Deduplication against a JSON membership cache seeded from the stored
//!   partitions, so a lost cache never causes a re-post flood
//! - Monthly archives with an optional long-term copy and daily cleanup
//!
//! ## Usage
//!
//! ```sh
//! TELEGRAM_BOT_TOKEN=123:abc TELEGRAM_CHANNEL_ID=@papers hf_papers_bot
//! ```
//!
//! ## Architecture
//!
//! Each cycle runs:
//! 1. **Fetching**: list today's papers and scrape their detail pages
//! 2. **Filtering**: drop identifiers already in the cache
//! 3. **Persisting**: merge the whole batch into today's partition
//! 4. **Notifying**: render and post each new paper
//! 5. **Archiving**: on the first of a month, merge last month's partitions

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod bot;
mod cache;
mod channel;
mod cli;
mod config;
mod error;
mod message;
mod models;
mod scrapers;
mod storage;
mod utils;

use api::{ActiveTranslator, NullTranslator, OpenAiClient, Translate};
use bot::{BotSettings, PaperBot};
use cache::PaperCache;
use channel::TelegramChannel;
use cli::Cli;
use config::Config;
use scrapers::hf::HfScraper;
use storage::PaperStorage;
use storage::archive::{Archiver, FsBlobStore};
use utils::ensure_writable_dir;

/// Pause between detail page requests.
const SCRAPE_DELAY: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "hf_papers_bot starting up");

    let config = match Config::from_cli(Cli::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(?config, "Configuration loaded");

    for dir in [&config.data_dir, &config.archive_dir] {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    match config.translation.clone() {
        Some(settings) => {
            info!(model = %settings.model, target_lang = %config.target_lang, "AI translation enabled");
            let client = OpenAiClient::new(settings.api_key, settings.base_url, settings.model);
            launch(config, ActiveTranslator::new(client)).await
        }
        None => {
            info!("AI translation disabled");
            launch(config, NullTranslator).await
        }
    }
}

/// Build the storage, cache and collaborators, then run the bot.
#[instrument(level = "info", skip_all)]
async fn launch<T: Translate>(config: Config, translator: T) -> Result<(), Box<dyn Error>> {
    let storage = PaperStorage::new(&config.data_dir, &config.archive_dir)?;

    let stats = storage.statistics();
    info!(
        files = stats.total_files,
        bytes = stats.total_bytes,
        months = stats.months.len(),
        "Storage statistics"
    );
    for (month, s) in &stats.months {
        info!(%month, files = s.files, bytes = s.bytes, "Stored month");
    }

    let known = storage.load_all_identifiers();
    info!(count = known.len(), "Loaded identifiers from storage");
    let cache = PaperCache::open(&config.cache_file, known)?;

    let archiver = Archiver::new(config.blob_dir.clone().map(FsBlobStore::new));

    let mut bot = PaperBot::new(
        HfScraper::new(SCRAPE_DELAY),
        TelegramChannel::new(config.telegram_token, config.channel_id),
        translator,
        storage,
        cache,
        archiver,
        BotSettings {
            interval: config.check_interval,
            send_delay: config.send_delay,
            target_lang: config.target_lang,
            delete_daily_files: config.delete_daily_files,
        },
    );

    if config.once {
        let report = bot.run_cycle(chrono::Utc::now().date_naive()).await;
        info!(sent = report.sent, failed = report.failed, "Single cycle complete");
        return Ok(());
    }

    bot.run().await;
    Ok(())
}
