use serde::{Deserialize, Serialize};

/// Shared request shape for `/extract` and `/create-links`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractRequest {
    pub transcript: String,
    pub customer_id: String,
    pub customer_name: String,
}

/// One resolved product: the extracted mention plus its affiliate link.
/// Immutable once built; scrape titles never appear here.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProductItem {
    pub product_name: String,
    pub affiliate_link: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractResponse {
    pub customer_id: String,
    pub customer_name: String,
    pub product_list: Vec<ProductItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessContentRequest {
    pub transcript: String,
    pub customer_id: String,
    pub customer_name: String,
    #[serde(default)]
    pub use_gemini: bool,
}

#[derive(Debug, Serialize, Clone)]
pub struct ProcessContentResponse {
    pub customer_id: String,
    pub customer_name: String,
    pub content: String,
    pub products_found: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProductWithCustomLink {
    pub product_name: String,
    pub affiliate_link: String,
    pub custom_link: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct CreateLinksResponse {
    pub customer_id: String,
    pub customer_name: String,
    pub products: Vec<ProductWithCustomLink>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
