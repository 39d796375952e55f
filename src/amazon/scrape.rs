use super::link::MARKETPLACE_ROOT;
use crate::http::fixed_timeout_client;
use once_cell::sync::Lazy;
use rand::Rng;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const MAX_ATTEMPTS: u32 = 5;
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
pub const UNKNOWN_TITLE: &str = "Unknown Product";

const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    ),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Cache-Control", "no-cache"),
    ("Pragma", "no-cache"),
    ("Upgrade-Insecure-Requests", "1"),
];

/// Badge markup drifts with marketplace redesigns; patch this table rather
/// than the scan logic.
const SPONSORED_BADGE_SELECTORS: &[&str] = &[
    "span.s-label-popover-default",
    "span.puis-label-popover-default",
    "span.s-sponsored-label-text",
    "span.a-color-secondary",
    "span.a-color-base",
    "span.puis-badge-text",
];

static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"div.s-main-slot div[data-component-type="s-search-result"][data-asin]"#)
        .expect("card selector")
});
static ARIA_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[aria-label]").expect("aria selector"));
static TITLE_ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2 a").expect("title anchor selector"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img.s-image").expect("image selector"));

/// Title markup varies per result card; checked in order, first non-empty
/// text wins. The `h2 a` aria-label and image alt fallbacks are handled
/// separately since they read attributes, not text.
const TITLE_TEXT_SELECTORS: &[&str] = &[
    "span.a-size-medium.a-color-base.a-text-normal",
    "span.a-size-base-plus.a-color-base.a-text-normal",
    "h2 a span",
    "h2",
];

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server error HTTP {0}")]
    ServerError(u16),
    #[error("unexpected HTTP {0}")]
    Status(u16),
    #[error("blocked by CAPTCHA")]
    Blocked,
    #[error("no product found")]
    NoResults,
    #[error("failed to search amazon after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Resolves a product name by scraping the marketplace search results page.
///
/// Every failure inside an attempt counts toward the retry budget, 4xx
/// statuses included (the upstream occasionally serves transient 4xx pages
/// when it suspects automation), with jittered exponential backoff between
/// attempts.
#[derive(Debug, Clone)]
pub struct ScrapeResolver {
    base_url: String,
    http: Client,
}

impl Default for ScrapeResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeResolver {
    pub fn new() -> Self {
        Self::with_base_url(MARKETPLACE_ROOT)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: fixed_timeout_client(ATTEMPT_TIMEOUT),
        }
    }

    /// Search the results page for `query` and return `(asin, title)`.
    pub async fn search(&self, query: &str) -> Result<(String, String), ScrapeError> {
        let url = format!("{}/s?k={}", self.base_url, query.replace(' ', "+"));

        let mut last_error: Option<ScrapeError> = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.attempt(&url).await {
                Ok(found) => return Ok(found),
                Err(err) => {
                    warn!(
                        target = "linkmint.scrape",
                        attempt = attempt + 1,
                        error = %err,
                        "scrape attempt failed"
                    );
                    last_error = Some(err);
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(ScrapeError::Exhausted {
            attempts: MAX_ATTEMPTS,
            last: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    async fn attempt(&self, url: &str) -> Result<(String, String), ScrapeError> {
        let mut request = self.http.get(url);
        for (name, value) in BROWSER_HEADERS {
            request = request.header(*name, *value);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ScrapeError::Request(err.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ScrapeError::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            return Err(ScrapeError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|err| ScrapeError::Request(err.to_string()))?;

        if is_blocked(&body) {
            return Err(ScrapeError::Blocked);
        }

        parse_search_results(&body)
    }
}

/// Delay before retrying after the given 0-based failed attempt:
/// `2^attempt` seconds plus uniform jitter in `[0.2, 0.6)`.
fn backoff_delay(failed_attempt: u32) -> Duration {
    let base = f64::from(1u32 << failed_attempt);
    let jitter = rand::rng().random_range(0.2..0.6);
    Duration::from_secs_f64(base + jitter)
}

fn is_blocked(body: &str) -> bool {
    body.to_lowercase().contains("captcha") || body.contains("Enter the characters")
}

/// Scan result cards in document order and pick the first non-sponsored one
/// with an extractable title. A page where every card is sponsored or
/// title-less still resolves: the very first card's ASIN is returned with a
/// sentinel title.
fn parse_search_results(html: &str) -> Result<(String, String), ScrapeError> {
    let document = Html::parse_document(html);
    let cards: Vec<ElementRef> = document.select(&CARD_SELECTOR).collect();
    if cards.is_empty() {
        return Err(ScrapeError::NoResults);
    }

    for card in &cards {
        let asin = card.value().attr("data-asin").unwrap_or("").trim();
        if asin.is_empty() {
            continue;
        }
        if is_sponsored(*card) {
            continue;
        }
        if let Some(title) = extract_title(*card) {
            return Ok((asin.to_string(), title));
        }
    }

    let first_asin = cards[0].value().attr("data-asin").unwrap_or("").trim();
    Ok((first_asin.to_string(), UNKNOWN_TITLE.to_string()))
}

fn is_sponsored(card: ElementRef) -> bool {
    for badge in SPONSORED_BADGE_SELECTORS {
        let Ok(selector) = Selector::parse(badge) else {
            continue;
        };
        if let Some(node) = card.select(&selector).next() {
            let text = element_text(node);
            if !text.is_empty() && text.to_lowercase().contains("sponsored") {
                return true;
            }
        }
    }

    for node in card.select(&ARIA_SELECTOR) {
        let aria = node
            .value()
            .attr("aria-label")
            .unwrap_or("")
            .trim()
            .to_lowercase();
        if aria == "sponsored" || aria.starts_with("sponsored") {
            return true;
        }
    }

    false
}

fn extract_title(card: ElementRef) -> Option<String> {
    if let Some(anchor) = card.select(&TITLE_ANCHOR_SELECTOR).next()
        && let Some(aria) = anchor.value().attr("aria-label")
        && !aria.trim().is_empty()
    {
        return Some(aria.trim().to_string());
    }

    for title in TITLE_TEXT_SELECTORS {
        let Ok(selector) = Selector::parse(title) else {
            continue;
        };
        if let Some(node) = card.select(&selector).next() {
            let text = element_text(node);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    if let Some(image) = card.select(&IMAGE_SELECTOR).next()
        && let Some(alt) = image.value().attr("alt")
        && !alt.trim().is_empty()
    {
        return Some(alt.trim().to_string());
    }

    None
}

fn element_text(node: ElementRef) -> String {
    node.text().collect::<String>().trim().to_string()
}
