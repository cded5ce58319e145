//! Telegram MarkdownV2 rendering of a paper announcement.
//!
//! A rendered message looks like:
//!
//! ```text
//! *Title*
//!
//! 👥 *Authors:* A, B, C, D, E et al\. \(7 authors\)
//!
//! 📄 *Abstract:* ...
//!
//! 📊 👍 42 upvotes \| ⭐ 1200 stars
//!
//! 🔗 *Read More：* [HuggingFace](...) \| [ArXiv](...) \| [GitHub](...)
//! ```
//!
//! Telegram caps photo captions far below text messages, so the abstract
//! budget and the total message budget both depend on whether the paper has
//! an image. The abstract is the only part that gets shortened to fit.

use crate::models::Paper;

pub const MAX_AUTHORS_DISPLAY: usize = 5;

const SPECIAL_CHARS: [char; 18] = [
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];
const ESCAPED_ELLIPSIS: &str = "\\.\\.\\.";
const NO_ABSTRACT: &str = "No abstract available";

/// Character budgets for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Target length handed to the summarizer.
    pub abstract_len: usize,
    /// Hard cap on the rendered body.
    pub message_len: usize,
}

impl Limits {
    pub const WITH_IMAGE: Self = Self {
        abstract_len: 500,
        message_len: 1000,
    };
    pub const TEXT_ONLY: Self = Self {
        abstract_len: 1000,
        message_len: 4000,
    };

    pub fn for_paper(paper: &Paper) -> Self {
        if paper.has_image() {
            Self::WITH_IMAGE
        } else {
            Self::TEXT_ONLY
        }
    }
}

/// Escape every MarkdownV2 reserved character.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render `paper` with `abstract_text` (already summarized/translated) so the
/// result never exceeds `max_len` characters.
///
/// The abstract is shortened first, then the title inside its `*...*`. If
/// authors, stats and links alone do not fit, only the title and the
/// HuggingFace link are kept. Markup is never cut.
pub fn format_paper_message(paper: &Paper, abstract_text: &str, max_len: usize) -> String {
    let raw_title = paper.title.split_whitespace().collect::<Vec<_>>().join(" ");
    let authors = format_authors(&paper.authors);
    let stats = format_stats(paper);
    let links = format_links(paper);

    let abstract_text = abstract_text.trim();
    let reserved = if abstract_text.is_empty() {
        NO_ABSTRACT.len()
    } else {
        0
    };
    let fixed = assemble("", &authors, "", &stats, &links).chars().count() + reserved;
    if fixed > max_len {
        return minimal_message(&raw_title, paper, max_len);
    }

    let title = fit_escaped(&raw_title, max_len - fixed);
    let budget = max_len - fixed - title.chars().count();
    let body = if abstract_text.is_empty() {
        NO_ABSTRACT.to_string()
    } else {
        fit_escaped(abstract_text, budget)
    };

    assemble(&title, &authors, &body, &stats, &links)
}

fn minimal_message(raw_title: &str, paper: &Paper, max_len: usize) -> String {
    let link = format!("🔗 [HuggingFace]({})", paper.url);
    let fixed = format!("**\n\n{link}").chars().count();
    let title = fit_escaped(raw_title, max_len.saturating_sub(fixed));
    format!("*{title}*\n\n{link}")
}

fn format_authors(authors: &[String]) -> String {
    if authors.is_empty() {
        return "Unknown".to_string();
    }
    let mut shown = authors
        .iter()
        .take(MAX_AUTHORS_DISPLAY)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if authors.len() > MAX_AUTHORS_DISPLAY {
        shown.push_str(&format!(" et al. ({} authors)", authors.len()));
    }
    escape_markdown(&shown)
}

fn format_stats(paper: &Paper) -> String {
    let mut parts = Vec::new();
    if let Some(upvotes) = paper.hf_upvotes {
        parts.push(format!("👍 {upvotes} upvotes"));
    }
    if let Some(stars) = paper.github_stars {
        parts.push(format!("⭐ {stars} stars"));
    }
    escape_markdown(&parts.join(" | "))
}

fn format_links(paper: &Paper) -> String {
    let mut links = vec![format!("[HuggingFace]({})", paper.url)];
    if let Some(arxiv) = &paper.arxiv_url {
        links.push(format!("[ArXiv]({arxiv})"));
    }
    if let Some(github) = &paper.github_url {
        links.push(format!("[GitHub]({github})"));
    }
    links.join(" \\| ")
}

/// Escape `raw` and cut it to `budget` characters, never splitting an escape.
fn fit_escaped(raw: &str, budget: usize) -> String {
    let escaped = escape_markdown(raw);
    if escaped.chars().count() <= budget {
        return escaped;
    }
    if budget <= ESCAPED_ELLIPSIS.len() {
        return String::new();
    }

    let room = budget - ESCAPED_ELLIPSIS.len();
    let mut out = String::new();
    let mut used = 0;
    for c in raw.chars() {
        let cost = if SPECIAL_CHARS.contains(&c) { 2 } else { 1 };
        if used + cost > room {
            break;
        }
        if cost == 2 {
            out.push('\\');
        }
        out.push(c);
        used += cost;
    }
    out.push_str(ESCAPED_ELLIPSIS);
    out
}
