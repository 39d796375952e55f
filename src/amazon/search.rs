use crate::http::build_client;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_DOMAIN: &str = "amazon.in";
const TAVILY_ROOT: &str = "https://api.tavily.com";
const MAX_RESULTS: u32 = 10;

/// Matches `/dp/<ASIN>` or `/gp/product/<ASIN>` where the ASIN is ten
/// uppercase letters/digits terminated by `/`, `?`, or end of string.
static ASIN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(?:dp|gp/product)/([A-Z0-9]{10})(?:[/?]|$)").expect("asin regex"));

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("TAVILY_API_KEY is not set")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("no amazon link found for: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub asin: String,
    pub url: String,
    pub title: Option<String>,
}

/// Resolves a product name to a listing URL via the Tavily search API.
///
/// A single strict site-restricted query, then one looser pass if the strict
/// query yields nothing. No retry or backoff at this layer.
#[derive(Debug, Clone)]
pub struct SearchResolver {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl SearchResolver {
    pub fn from_env() -> Self {
        Self {
            base_url: TAVILY_ROOT.to_string(),
            api_key: std::env::var("TAVILY_API_KEY").ok(),
            http: build_client(),
        }
    }

    #[allow(dead_code)]
    pub fn with_base_url(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: Some(api_key.to_string()),
            http: build_client(),
        }
    }

    pub async fn find_link(&self, product_name: &str) -> Result<SearchHit, SearchError> {
        self.find_link_on(product_name, DEFAULT_DOMAIN).await
    }

    pub async fn find_link_on(
        &self,
        product_name: &str,
        domain: &str,
    ) -> Result<SearchHit, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::MissingApiKey)?;

        let strict = format!(
            "site:{domain} (\"dp\" OR \"gp/product\") \"{product_name}\" -renew -refurbished"
        );
        if let Some(hit) = self.scan_results(api_key, &strict, domain).await? {
            return Ok(hit);
        }

        let loose = format!("site:{domain} dp {product_name}");
        if let Some(hit) = self.scan_results(api_key, &loose, domain).await? {
            return Ok(hit);
        }

        Err(SearchError::NotFound(product_name.to_string()))
    }

    async fn scan_results(
        &self,
        api_key: &str,
        query: &str,
        domain: &str,
    ) -> Result<Option<SearchHit>, SearchError> {
        let body = TavilyRequest {
            api_key: api_key.to_string(),
            query: query.to_string(),
            max_results: MAX_RESULTS,
        };
        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|err| SearchError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let payload: TavilyResponse = response
            .json()
            .await
            .map_err(|err| SearchError::Deserialize(err.to_string()))?;

        // First domain-matching result with an extractable ASIN wins.
        for item in payload.results {
            if !item.url.contains(domain) {
                continue;
            }
            if let Some(asin) = extract_asin(&item.url) {
                return Ok(Some(SearchHit {
                    asin,
                    url: item.url,
                    title: item.title,
                }));
            }
        }
        Ok(None)
    }
}

pub fn extract_asin(url: &str) -> Option<String> {
    ASIN_REGEX
        .captures(url)
        .map(|captures| captures[1].to_string())
}

#[derive(Debug, Serialize)]
struct TavilyRequest {
    api_key: String,
    query: String,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_asin_from_dp_path() {
        assert_eq!(
            extract_asin("https://amazon.in/dp/B0ABCDE123/ref=sr_1_1").as_deref(),
            Some("B0ABCDE123")
        );
    }

    #[test]
    fn extracts_asin_from_gp_product_path() {
        assert_eq!(
            extract_asin("https://amazon.in/gp/product/B0XYZ98765?th=1").as_deref(),
            Some("B0XYZ98765")
        );
    }

    #[test]
    fn extracts_asin_at_end_of_url() {
        assert_eq!(
            extract_asin("https://www.amazon.in/dp/B0XYZ00001").as_deref(),
            Some("B0XYZ00001")
        );
    }

    #[test]
    fn rejects_short_codes() {
        assert_eq!(extract_asin("https://amazon.in/dp/B0SHORT/x"), None);
    }

    #[test]
    fn rejects_lowercase_codes() {
        assert_eq!(extract_asin("https://amazon.in/dp/b0abcde123/"), None);
    }

    #[test]
    fn rejects_urls_without_product_path() {
        assert_eq!(extract_asin("https://amazon.in/s?k=macbook"), None);
    }

    #[tokio::test]
    async fn missing_api_key_fails_immediately() {
        let resolver = SearchResolver {
            base_url: TAVILY_ROOT.to_string(),
            api_key: None,
            http: build_client(),
        };
        let err = resolver
            .find_link("MacBook Air M4")
            .await
            .expect_err("should fail without credentials");
        assert!(matches!(err, SearchError::MissingApiKey));
    }
}

#[cfg(test)]
mod wiremock_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn strict_pass_returns_first_domain_match() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"url": "https://example.com/review", "title": "Review"},
                    {"url": "https://www.amazon.in/dp/B0TAVILY01/ref=x", "title": "MacBook Air M4"},
                    {"url": "https://www.amazon.in/dp/B0TAVILY02", "title": "Later"},
                ]
            })))
            .mount(&server)
            .await;

        let resolver = SearchResolver::with_base_url(&server.uri(), "test-key");
        let hit = resolver.find_link("MacBook Air M4").await.expect("should resolve");
        assert_eq!(hit.asin, "B0TAVILY01");
        assert_eq!(hit.url, "https://www.amazon.in/dp/B0TAVILY01/ref=x");
        assert_eq!(hit.title.as_deref(), Some("MacBook Air M4"));
    }

    #[tokio::test]
    async fn falls_back_to_loose_query_when_strict_misses() {
        let server = MockServer::start().await;
        // Strict query carries the -renew exclusion; answer it with nothing usable.
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_string_contains("-renew"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"url": "https://example.com/elsewhere"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"url": "https://amazon.in/gp/product/B0LOOSE001?th=1", "title": "Loose"}]
            })))
            .mount(&server)
            .await;

        let resolver = SearchResolver::with_base_url(&server.uri(), "test-key");
        let hit = resolver.find_link("some product").await.expect("should resolve");
        assert_eq!(hit.asin, "B0LOOSE001");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn both_passes_empty_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .expect(2)
            .mount(&server)
            .await;

        let resolver = SearchResolver::with_base_url(&server.uri(), "test-key");
        let err = resolver
            .find_link("nonexistent thing")
            .await
            .expect_err("should fail");
        assert!(matches!(err, SearchError::NotFound(_)));
    }

    #[tokio::test]
    async fn upstream_error_status_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let resolver = SearchResolver::with_base_url(&server.uri(), "bad-key");
        let err = resolver.find_link("anything").await.expect_err("should fail");
        assert!(matches!(err, SearchError::Status(401)));
    }
}
