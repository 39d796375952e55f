//! Amazon product resolution: Tavily-backed search first, search-page
//! scraping as the fallback, and the affiliate link builder shared by both.

pub mod link;
pub mod scrape;
pub mod search;

pub use link::build_affiliate_link;
pub use scrape::ScrapeResolver;
pub use search::SearchResolver;
