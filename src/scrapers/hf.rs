//! HuggingFace daily papers scraper.
//!
//! The listing lives at `https://huggingface.co/papers/date/YYYY-MM-DD`; each
//! card links to `https://huggingface.co/papers/<arxiv id>`, whose last path
//! segment becomes the paper identifier.

use super::PaperSource;
use crate::models::Paper;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::error::Error;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const BASE_URL: &str = "https://huggingface.co";

static CARD: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h3 a[href]").unwrap());
static CARD_IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());
static HEADING: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").unwrap());
static PROSE_PARAGRAPH: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class*="prose"] p"#).unwrap());
static AUTHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("span.author").unwrap());
static AUTHOR_NAME: Lazy<Selector> = Lazy::new(|| Selector::parse("button, a").unwrap());
static DATA_PROPS: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-props]").unwrap());
static ARXIV_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="arxiv.org/abs/"]"#).unwrap());
static GITHUB_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="github.com"]"#).unwrap());
static UPVOTE_CANDIDATES: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div, button, span").unwrap());

static STARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(k)?\s*(?:stars?|★)").unwrap());
static UPVOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Upvote\s*(\d+)").unwrap());

/// One card from the listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCard {
    pub title: String,
    pub url: String,
    pub hero_image: Option<String>,
}

/// Metadata from a paper's detail page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperDetails {
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub arxiv_url: Option<String>,
    pub github_url: Option<String>,
    pub github_stars: Option<i64>,
    pub hf_upvotes: Option<i64>,
}

impl ListingCard {
    fn into_paper(self, details: PaperDetails) -> Paper {
        let mut paper = Paper::new(self.url, self.title);
        paper.hero_image = self.hero_image;
        paper.abstract_text = details.abstract_text;
        paper.authors = details.authors;
        paper.arxiv_url = details.arxiv_url;
        paper.github_url = details.github_url;
        paper.github_stars = details.github_stars;
        paper.hf_upvotes = details.hf_upvotes;
        paper
    }
}

#[derive(Debug, Clone)]
pub struct HfScraper {
    http: Client,
    base_url: String,
    request_delay: Duration,
}

impl HfScraper {
    /// `request_delay` is slept after every detail page request.
    pub fn new(request_delay: Duration) -> Self {
        Self {
            http: Client::new(),
            base_url: BASE_URL.to_string(),
            request_delay,
        }
    }

    #[instrument(level = "info", skip(self))]
    async fn fetch_details(&self, url: &str) -> Result<PaperDetails, Box<dyn Error>> {
        let html = self.http.get(url).send().await?.error_for_status()?.text().await?;
        let mut details = parse_details(&html);

        if details.github_stars.is_none() {
            if let Some(github_url) = details.github_url.clone() {
                match self.github_stars(&github_url).await {
                    Ok(stars) => details.github_stars = stars,
                    Err(e) => warn!(%github_url, error = %e, "Failed to fetch GitHub stars"),
                }
            }
        }
        Ok(details)
    }

    async fn github_stars(&self, github_url: &str) -> Result<Option<i64>, Box<dyn Error>> {
        let Some((owner, repo)) = github_repo(github_url) else {
            return Ok(None);
        };
        let response = self
            .http
            .get(format!("https://api.github.com/repos/{owner}/{repo}"))
            .header(reqwest::header::USER_AGENT, concat!("hf_papers_bot/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "GitHub API returned non-success");
            return Ok(None);
        }
        let body: Value = response.json().await?;
        Ok(body.get("stargazers_count").and_then(Value::as_i64))
    }
}

impl PaperSource for HfScraper {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, date: NaiveDate) -> Result<Vec<Paper>, Box<dyn Error>> {
        let listing_url = format!("{}/papers/date/{}", self.base_url, date.format("%Y-%m-%d"));
        let html = self
            .http
            .get(&listing_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let cards = parse_listing(&html, &self.base_url)?;
        info!(count = cards.len(), source = %listing_url, "Indexed paper cards");

        let mut papers = Vec::with_capacity(cards.len());
        for card in cards {
            debug!(title = %card.title, "Fetching paper details");
            let details = match self.fetch_details(&card.url).await {
                Ok(details) => details,
                Err(e) => {
                    warn!(url = %card.url, error = %e, "Failed to fetch paper details");
                    PaperDetails::default()
                }
            };
            sleep(self.request_delay).await;
            papers.push(card.into_paper(details));
        }

        info!(count = papers.len(), "Fetched paper details");
        Ok(papers)
    }
}

/// Extract the paper cards of a listing page, resolving relative links.
pub fn parse_listing(html: &str, base_url: &str) -> Result<Vec<ListingCard>, url::ParseError> {
    let base = Url::parse(base_url)?;
    let document = Html::parse_document(html);

    let mut cards = Vec::new();
    for card in document.select(&CARD) {
        let Some(link) = card.select(&CARD_TITLE).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href").and_then(|h| base.join(h).ok()) else {
            continue;
        };
        let hero_image = card
            .select(&CARD_IMAGE)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| base.join(src).ok())
            .map(String::from);

        cards.push(ListingCard {
            title: element_text(link),
            url: url.to_string(),
            hero_image,
        });
    }
    Ok(cards)
}

/// Extract abstract, authors, links and counters from a paper detail page.
pub fn parse_details(html: &str) -> PaperDetails {
    let document = Html::parse_document(html);

    let github_link = document.select(&GITHUB_LINK).next();
    let github_url = github_link
        .and_then(|a| a.value().attr("href"))
        .map(normalize_github_url);
    let github_stars = github_link
        .and_then(|a| a.parent().and_then(ElementRef::wrap))
        .and_then(|parent| parse_stars(&element_text(parent)));

    PaperDetails {
        abstract_text: extract_abstract(&document),
        authors: extract_authors(&document),
        arxiv_url: document
            .select(&ARXIV_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(String::from),
        github_url,
        github_stars,
        hf_upvotes: document.select(&UPVOTE_CANDIDATES).find_map(|el| {
            UPVOTE_RE
                .captures(&element_text(el))
                .and_then(|c| c[1].parse().ok())
        }),
    }
}

fn extract_abstract(document: &Html) -> String {
    let from_heading = document
        .select(&HEADING)
        .find(|h| element_text(*h).contains("Abstract"))
        .and_then(|h| h.next_siblings().find_map(ElementRef::wrap))
        .map(element_text)
        .filter(|t| !t.is_empty());

    from_heading
        .or_else(|| document.select(&PROSE_PARAGRAPH).next().map(element_text))
        .unwrap_or_default()
}

fn extract_authors(document: &Html) -> Vec<String> {
    let mut authors: Vec<String> = Vec::new();
    for span in document.select(&AUTHOR) {
        let name = match span.select(&AUTHOR_NAME).next() {
            Some(inner) => element_text(inner),
            None => element_text(span).replace(',', "").trim().to_string(),
        };
        if !name.is_empty() && name != "," && !authors.contains(&name) {
            authors.push(name);
        }
    }
    if !authors.is_empty() {
        return authors;
    }

    for el in document.select(&DATA_PROPS) {
        let Some(props) = el
            .value()
            .attr("data-props")
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        else {
            continue;
        };
        if let Some(list) = props.pointer("/paper/authors").and_then(Value::as_array) {
            authors.extend(
                list.iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .map(String::from),
            );
        }
    }
    authors
}

/// Star count from text like `1.2k stars` or `345 ★`.
fn parse_stars(text: &str) -> Option<i64> {
    let caps = STARS_RE.captures(text)?;
    let value: f64 = caps[1].parse().ok()?;
    let value = if caps.get(2).is_some() { value * 1000.0 } else { value };
    Some(value as i64)
}

fn normalize_github_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if let Some(path) = href.strip_prefix('/') {
        format!("https://github.com/{path}")
    } else {
        format!("https://github.com/{href}")
    }
}

/// `(owner, repo)` of a GitHub repository URL.
fn github_repo(github_url: &str) -> Option<(&str, &str)> {
    let path = github_url.trim_end_matches('/').split("github.com/").nth(1)?;
    let mut parts = path.split('/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let repo = parts.next().filter(|s| !s.is_empty())?;
    Some((owner, repo))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
