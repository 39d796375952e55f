pub const MARKETPLACE_ROOT: &str = "https://www.amazon.in";
pub const DEFAULT_TAG: &str = "shivanshkaran-21";
pub const DEFAULT_SUBTAG: &str = "anu-id";

/// Build an affiliate-tagged product URL from an ASIN.
///
/// Pure string concatenation; the ASIN is assumed non-empty and is not
/// validated here.
pub fn build_affiliate_link(asin: &str) -> String {
    build_affiliate_link_tagged(asin, DEFAULT_TAG, DEFAULT_SUBTAG)
}

pub fn build_affiliate_link_tagged(asin: &str, tag: &str, subtag: &str) -> String {
    format!("{MARKETPLACE_ROOT}/dp/{asin}?tag={tag}&ascsubtag={subtag}")
}
