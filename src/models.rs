//! Data model for a single paper scraped from the HuggingFace daily listing.
//!
//! This module defines the record shape shared by every component:
//! - [`Paper`]: one discovered paper with its metadata
//! - [`derive_id`]: the pure function that turns a paper URL into the
//!   identifier used for deduplication across storage and the cache
//!
//! The identifier is stored alongside the record so rows read back from disk
//! keep the exact key they were written with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A paper as observed on the daily papers page.
///
/// `id` is always `derive_id(&url)` for records built by [`Paper::new`];
/// records loaded from a partition carry the identifier stored in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Paper {
    /// Stable identifier, the final path segment of `url`.
    pub id: String,
    /// The paper title as shown on the listing card.
    pub title: String,
    /// Full author list in page order.
    pub authors: Vec<String>,
    /// The abstract text (may be empty when the detail page had none).
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// The HuggingFace paper page URL.
    pub url: String,
    /// Thumbnail shown on the listing card.
    pub hero_image: Option<String>,
    /// Link to the arXiv abstract page.
    pub arxiv_url: Option<String>,
    /// Link to the code repository.
    pub github_url: Option<String>,
    /// Repository star count, when it could be determined.
    pub github_stars: Option<i64>,
    /// HuggingFace upvote count.
    pub hf_upvotes: Option<i64>,
    /// When this record was captured.
    pub collected_at: DateTime<Utc>,
}

impl Paper {
    /// Build a record for `url` with empty metadata, captured now.
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: derive_id(&url).to_string(),
            title: title.into(),
            authors: Vec::new(),
            abstract_text: String::new(),
            url,
            hero_image: None,
            arxiv_url: None,
            github_url: None,
            github_stars: None,
            hf_upvotes: None,
            collected_at: Utc::now(),
        }
    }

    pub fn has_image(&self) -> bool {
        self.hero_image.is_some()
    }
}

/// Derive the paper identifier from its URL.
///
/// Query string and fragment are ignored and a trailing `/` is trimmed, so
/// `https://huggingface.co/papers/2510.01234/` and
/// `https://huggingface.co/papers/2510.01234?src=feed` both yield
/// `2510.01234`.
pub fn derive_id(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = url[..end].trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path)
}
