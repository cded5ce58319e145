//! Paper sources.
//!
//! Each source follows the two-phase pattern used for news scrapers:
//!
//! 1. **Indexing**: read the listing page for a date and collect paper cards
//! 2. **Fetching**: download each paper's detail page for the full metadata
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | HuggingFace Daily Papers | [`hf`] | HTML scraping | GitHub API fallback for star counts |
//!
//! A failed detail fetch keeps the paper with empty metadata; only a failed
//! listing fetch fails the whole call.

pub mod hf;

use crate::models::Paper;
use chrono::NaiveDate;
use std::error::Error;

/// Something that can list the papers published on a given day.
pub trait PaperSource {
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<Paper>, Box<dyn Error>>;
}
