use reqwest::Client;
use std::time::Duration;

/// Shared client for API-style upstreams (Tavily, Gemini).
pub fn build_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(env_secs("HTTP_TIMEOUT_SECS", 15)))
        .connect_timeout(Duration::from_secs(env_secs("HTTP_CONNECT_TIMEOUT_SECS", 5)))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Client with a single overall timeout, for upstreams whose caller owns the
/// retry loop (the scrape resolver) or the deadline (the backend gateway).
pub fn fixed_timeout_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub(crate) fn env_secs(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
