use crate::http::fixed_timeout_client;
use crate::models::{ProductItem, ProductWithCustomLink};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Gateway to the Go affiliate backend.
///
/// Holds one pooled connection for the client's lifetime: opened at
/// construction, released on drop along every exit path. Two sequential
/// calls — mint custom short links, then inject them into markdown — plus a
/// convenience composition of both. Any non-2xx or transport failure aborts
/// the whole composition; there is no compensation for a half-applied chain.
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    http: Client,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("invalid response: {0}")]
    Deserialize(String),
    #[error("expected {expected} custom links, got {got}")]
    LinkCountMismatch { expected: usize, got: usize },
}

impl BackendClient {
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:8080".into());
        Self::new(&base_url)
    }

    pub fn new(base_url: &str) -> Self {
        let timeout = crate::http::env_secs("BACKEND_TIMEOUT_SECS", 30);
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: fixed_timeout_client(Duration::from_secs(timeout)),
        }
    }

    /// `POST /api/custom-affiliate/create` — one custom link per input
    /// product, order-preserving.
    pub async fn create_custom_links(
        &self,
        customer_id: &str,
        customer_name: &str,
        products: &[ProductItem],
    ) -> Result<Vec<CustomLinkItem>, BackendError> {
        let url = format!("{}/api/custom-affiliate/create", self.base_url);
        let payload = CreateLinksRequestBody {
            customer_id: customer_id.to_string(),
            customer_name: customer_name.to_string(),
            product_list: products.to_vec(),
        };
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }

        let body: CreateLinksResponseBody = response
            .json()
            .await
            .map_err(|err| BackendError::Deserialize(err.to_string()))?;
        Ok(body.products)
    }

    /// `POST /api/markdown/affiliate` — rewrite `content` with the custom
    /// links embedded. The rewriting itself is opaque to this service.
    pub async fn inject_affiliate_links(
        &self,
        content: &str,
        products: &[CustomLinkItem],
        use_gemini: bool,
    ) -> Result<String, BackendError> {
        let url = format!("{}/api/markdown/affiliate", self.base_url);
        let payload = MarkdownRequestBody {
            content: content.to_string(),
            products: products.to_vec(),
            use_gemini,
        };
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Status(response.status().as_u16()));
        }

        let body: MarkdownResponseBody = response
            .json()
            .await
            .map_err(|err| BackendError::Deserialize(err.to_string()))?;
        Ok(body.content)
    }

    /// Chain both backend calls: mint custom links, then inject them into
    /// `content`. Returns the rewritten content.
    pub async fn process_content(
        &self,
        customer_id: &str,
        customer_name: &str,
        content: &str,
        products: &[ProductItem],
        use_gemini: bool,
    ) -> Result<String, BackendError> {
        let custom_links = self
            .create_custom_links(customer_id, customer_name, products)
            .await?;
        self.inject_affiliate_links(content, &custom_links, use_gemini)
            .await
    }
}

/// Zip resolved products with the backend's custom links, pairing by index.
/// The backend guarantees one-to-one order-preserving output; a length
/// mismatch means that guarantee broke upstream and is surfaced as an error
/// rather than silently truncating the pairing.
pub fn merge_custom_links(
    products: &[ProductItem],
    custom_links: &[CustomLinkItem],
) -> Result<Vec<ProductWithCustomLink>, BackendError> {
    if products.len() != custom_links.len() {
        return Err(BackendError::LinkCountMismatch {
            expected: products.len(),
            got: custom_links.len(),
        });
    }
    Ok(products
        .iter()
        .zip(custom_links.iter())
        .map(|(item, link)| ProductWithCustomLink {
            product_name: item.product_name.clone(),
            affiliate_link: item.affiliate_link.clone(),
            custom_link: link.custom_link.clone(),
        })
        .collect())
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomLinkItem {
    pub product_name: String,
    pub custom_link: String,
}

#[derive(Debug, Serialize)]
struct CreateLinksRequestBody {
    customer_id: String,
    customer_name: String,
    product_list: Vec<ProductItem>,
}

#[derive(Debug, Deserialize)]
struct CreateLinksResponseBody {
    #[serde(default)]
    products: Vec<CustomLinkItem>,
}

#[derive(Debug, Serialize)]
struct MarkdownRequestBody {
    content: String,
    products: Vec<CustomLinkItem>,
    use_gemini: bool,
}

#[derive(Debug, Deserialize)]
struct MarkdownResponseBody {
    content: String,
}


#[cfg(test)]
mod wiremock_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_products() -> Vec<ProductItem> {
        vec![ProductItem {
            product_name: "MacBook Air M4".into(),
            affiliate_link: "https://www.amazon.in/dp/B0XYZ00001?tag=shivanshkaran-21&ascsubtag=anu-id"
                .into(),
        }]
    }

    #[tokio::test]
    async fn process_content_chains_create_and_inject() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/custom-affiliate/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "customer_id": "c-1",
                "customer_name": "Anu",
                "products": [{"product_name": "MacBook Air M4", "custom_link": "https://lnk.mt/m4"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/markdown/affiliate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": "rewritten [MacBook Air M4](https://lnk.mt/m4)"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(&server.uri());
        let content = client
            .process_content("c-1", "Anu", "original content", &sample_products(), false)
            .await
            .expect("chain should succeed");
        assert!(content.contains("https://lnk.mt/m4"));
    }

    #[tokio::test]
    async fn inject_failure_aborts_composition_with_single_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/custom-affiliate/create"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "products": [{"product_name": "MacBook Air M4", "custom_link": "https://lnk.mt/m4"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/markdown/affiliate"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = BackendClient::new(&server.uri());
        let err = client
            .process_content("c-1", "Anu", "original content", &sample_products(), true)
            .await
            .expect_err("chain should abort");
        assert!(matches!(err, BackendError::Status(500)));
    }

    #[tokio::test]
    async fn create_failure_skips_inject_entirely() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/custom-affiliate/create"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/markdown/affiliate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "x"})))
            .expect(0)
            .mount(&server)
            .await;

        let client = BackendClient::new(&server.uri());
        let err = client
            .process_content("c-1", "Anu", "content", &sample_products(), false)
            .await
            .expect_err("chain should abort");
        assert!(matches!(err, BackendError::Status(502)));
    }
}
