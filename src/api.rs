//! Chat-model access for abstract summarization and translation.
//!
//! # Architecture
//!
//! - [`AskAsync`]: one request/response round trip with a chat model
//! - [`OpenAiClient`]: `POST {base_url}/chat/completions` against any
//!   OpenAI-compatible endpoint
//! - [`RetryAsk`]: decorator adding exponential backoff with jitter
//! - [`Translate`]: the capability the bot depends on, with two variants
//!   chosen once at startup:
//!   - [`NullTranslator`]: no model; summarizing truncates, translating is
//!     the identity
//!   - [`ActiveTranslator`]: calls the model and falls back to the
//!     [`NullTranslator`] behaviour whenever a call fails
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::utils::truncate_with_ellipsis;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// One chat completion request: a system instruction and the user text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Trait for async LLM interaction.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send a request to the LLM and receive a response.
    async fn ask(&self, request: &ChatRequest) -> Result<Self::Response, Box<dyn Error>>;
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// Wrap `inner`, retrying up to `max_retries` times after the first failure.
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, request: &ChatRequest) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.ask(request).await {
                Ok(resp) => {
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Deserialize)]
struct WireReply {
    content: Option<String>,
}

impl AskAsync for OpenAiClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, request: &ChatRequest) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let body = WireRequest {
            model: &self.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: 0.3,
            max_tokens: request.max_tokens,
        };

        let response: WireResponse = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or("chat completion returned no content")?;

        debug!(elapsed_ms = t0.elapsed().as_millis(), "API call succeeded");
        Ok(content)
    }
}

/// Optional abstract processing applied before a paper is posted.
pub trait Translate {
    /// Shorten `text` to roughly `max_len` characters.
    async fn summarize(&self, text: &str, max_len: usize) -> String;

    /// Render `text` in `target_lang`.
    async fn translate(&self, text: &str, target_lang: &str) -> String;
}

/// Pass-through used when AI translation is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTranslator;

impl Translate for NullTranslator {
    async fn summarize(&self, text: &str, max_len: usize) -> String {
        truncate_with_ellipsis(text, max_len)
    }

    async fn translate(&self, text: &str, _target_lang: &str) -> String {
        text.to_string()
    }
}

/// Model-backed summarization and translation.
#[derive(Debug)]
pub struct ActiveTranslator<A = RetryAsk<OpenAiClient>> {
    api: A,
}

impl ActiveTranslator {
    /// Wrap `client` with 3 retries starting at a 1 second backoff.
    pub fn new(client: OpenAiClient) -> Self {
        Self::with_api(RetryAsk::new(client, 3, StdDuration::from_secs(1)))
    }
}

impl<A> ActiveTranslator<A>
where
    A: AskAsync<Response = String>,
{
    pub fn with_api(api: A) -> Self {
        Self { api }
    }
}

impl<A> Translate for ActiveTranslator<A>
where
    A: AskAsync<Response = String>,
{
    #[instrument(level = "info", skip_all, fields(chars = text.chars().count(), max_len = max_len))]
    async fn summarize(&self, text: &str, max_len: usize) -> String {
        if text.chars().count() <= max_len {
            return text.to_string();
        }
        let request = ChatRequest {
            system: format!(
                "You are an expert at summarizing academic papers. Summarize the following abstract \
                 to approximately {max_len} characters while preserving the key points and technical \
                 terms. Be concise but informative."
            ),
            user: text.to_string(),
            max_tokens: u32::try_from(max_len).unwrap_or(u32::MAX),
        };
        match self.api.ask(&request).await {
            Ok(summary) => {
                info!(chars = summary.chars().count(), "Summarized abstract");
                summary
            }
            Err(e) => {
                warn!(error = %e, "Abstract summarization failed; truncating");
                truncate_with_ellipsis(text, max_len)
            }
        }
    }

    #[instrument(level = "info", skip_all, fields(target_lang = %target_lang))]
    async fn translate(&self, text: &str, target_lang: &str) -> String {
        let request = ChatRequest {
            system: format!(
                "You are a professional translator. Translate the following academic abstract to \
                 {target_lang}. Keep technical terms in English when appropriate. Provide only the \
                 translation without any explanations."
            ),
            user: text.to_string(),
            max_tokens: 1000,
        };
        match self.api.ask(&request).await {
            Ok(translation) => translation,
            Err(e) => {
                warn!(error = %e, "Translation failed; keeping original text");
                text.to_string()
            }
        }
    }
}
