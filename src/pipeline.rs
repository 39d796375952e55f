use crate::amazon::scrape::ScrapeError;
use crate::amazon::search::SearchError;
use crate::amazon::{ScrapeResolver, SearchResolver, build_affiliate_link};
use crate::llm::GeminiClient;
use crate::models::ProductItem;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Resolver tiers in fallback order: the search API keeps scraping to a
/// minimum; the scraper is the last resort when the API misses or fails.
const TIER_ORDER: &[ResolverTier] = &[ResolverTier::SearchApi, ResolverTier::Scrape];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolverTier {
    SearchApi,
    Scrape,
}

impl ResolverTier {
    fn name(self) -> &'static str {
        match self {
            ResolverTier::SearchApi => "search_api",
            ResolverTier::Scrape => "scrape",
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    llm: Arc<GeminiClient>,
    search: SearchResolver,
    scrape: ScrapeResolver,
}

impl Pipeline {
    pub fn from_env() -> Self {
        Self::new(
            GeminiClient::from_env(),
            SearchResolver::from_env(),
            ScrapeResolver::new(),
        )
    }

    pub fn new(llm: GeminiClient, search: SearchResolver, scrape: ScrapeResolver) -> Self {
        Self {
            llm: Arc::new(llm),
            search,
            scrape,
        }
    }

    /// Extract product mentions from the transcript and resolve each one to
    /// an affiliate link. Mentions are handled sequentially in first-seen
    /// order; a mention failing both tiers is dropped, and only a fully
    /// empty result is an error.
    pub async fn resolve_transcript(
        &self,
        transcript: &str,
    ) -> Result<Vec<ProductItem>, PipelineError> {
        if transcript.trim().is_empty() {
            return Err(PipelineError::invalid_input(
                "extract",
                "transcript is required",
            ));
        }

        let names = self
            .llm
            .extract_products(transcript)
            .await
            .map_err(|err| PipelineError::internal("extract", err.to_string()))?;

        let mentions = dedupe_mentions(names);
        if mentions.is_empty() {
            return Err(PipelineError::invalid_input(
                "extract",
                "no products found in transcript",
            ));
        }

        let mut resolved = Vec::with_capacity(mentions.len());
        for mention in &mentions {
            if let Some(asin) = self.resolve_mention(mention).await {
                resolved.push(ProductItem {
                    product_name: mention.clone(),
                    affiliate_link: build_affiliate_link(&asin),
                });
            }
        }

        if resolved.is_empty() {
            return Err(PipelineError::upstream(
                "resolve",
                "failed to resolve any products",
            ));
        }
        Ok(resolved)
    }

    /// Walk the tier chain for one mention; first success wins. Returning
    /// `None` is the explicit silent-drop branch: the mention is logged and
    /// skipped, never retried and never surfaced individually.
    async fn resolve_mention(&self, mention: &str) -> Option<String> {
        for tier in TIER_ORDER {
            let started = Instant::now();
            let outcome = self.attempt_tier(*tier, mention).await;
            crate::metrics::resolution_elapsed(tier.name(), started.elapsed().as_millis());
            match outcome {
                Ok(asin) => {
                    info!(
                        target = "linkmint.pipeline",
                        mention = %mention,
                        tier = tier.name(),
                        asin = %asin,
                        "mention resolved"
                    );
                    return Some(asin);
                }
                Err(err) => {
                    warn!(
                        target = "linkmint.pipeline",
                        mention = %mention,
                        tier = tier.name(),
                        error = %err,
                        "resolver tier failed"
                    );
                }
            }
        }
        warn!(
            target = "linkmint.pipeline",
            mention = %mention,
            "dropping unresolvable mention"
        );
        None
    }

    async fn attempt_tier(&self, tier: ResolverTier, mention: &str) -> Result<String, TierError> {
        let asin = match tier {
            ResolverTier::SearchApi => {
                let hit = self.search.find_link(mention).await?;
                debug!(
                    target = "linkmint.pipeline",
                    url = %hit.url,
                    title = ?hit.title,
                    "search api hit"
                );
                hit.asin
            }
            // The scraped title is resolution-internal; only the ASIN
            // survives past this point.
            ResolverTier::Scrape => self.scrape.search(mention).await?.0,
        };
        // A results page can carry an empty data-asin on its first card;
        // an empty identifier must never reach the link builder.
        if asin.trim().is_empty() {
            return Err(TierError::EmptyIdentifier);
        }
        Ok(asin)
    }
}

#[derive(Debug, Error)]
enum TierError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error("resolver produced an empty identifier")]
    EmptyIdentifier,
}

/// Trim, drop empties, and de-duplicate case-insensitively while preserving
/// first-seen order.
fn dedupe_mentions(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_lowercase()) {
            unique.push(trimmed.to_string());
        }
    }
    unique
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    /// Caller mistake; maps to a 4xx response.
    InvalidInput,
    /// An upstream dependency failed; maps to 502.
    Upstream,
    /// Anything else; maps to 500.
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn upstream(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Upstream,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_collapses_case_variants_preserving_order() {
        let unique = dedupe_mentions(vec![
            "iPhone".to_string(),
            "iphone".to_string(),
            "IPHONE 15".to_string(),
        ]);
        assert_eq!(unique, vec!["iPhone", "IPHONE 15"]);
    }

    #[test]
    fn dedupe_trims_and_drops_blanks() {
        let unique = dedupe_mentions(vec![
            "  Kindle  ".to_string(),
            "".to_string(),
            "kindle".to_string(),
        ]);
        assert_eq!(unique, vec!["Kindle"]);
    }

    #[tokio::test]
    async fn blank_transcript_is_rejected_before_any_network_call() {
        let pipeline = Pipeline::from_env();
        let err = pipeline
            .resolve_transcript("   \n  ")
            .await
            .expect_err("should reject");
        assert_eq!(err.kind(), PipelineErrorKind::InvalidInput);
        assert_eq!(err.stage(), "extract");
    }

    #[test]
    fn error_kinds_are_distinguishable() {
        assert_eq!(
            PipelineError::invalid_input("extract", "x").kind(),
            PipelineErrorKind::InvalidInput
        );
        assert_eq!(
            PipelineError::upstream("resolve", "x").kind(),
            PipelineErrorKind::Upstream
        );
        assert_eq!(
            PipelineError::internal("extract", "x").kind(),
            PipelineErrorKind::Internal
        );
    }
}
