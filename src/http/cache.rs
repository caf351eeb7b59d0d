//! HTTP cache validation module
//!
//! Provides `ETag` generation, conditional request handling and the
//! `Cache-Time` header contract between handlers and the expiration cache.

use hyper::header::{HeaderName, HeaderValue};
use hyper::Response;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Seconds a handler asks the expiration cache to keep its response
pub static CACHE_TIME: HeaderName = HeaderName::from_static("cache-time");

/// Generate `ETag` using fast hashing
///
/// # Returns
/// Quoted `ETag` string, e.g., `"abc123def"`
pub fn generate_etag(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    let v = hasher.finish();
    format!("\"{v:x}\"")
}

/// Derive the `ETag` of an encoded representation, e.g. `"abc"` -> `"abc-gzip"`
pub fn variant_etag(etag: &str, encoding: &str) -> String {
    format!("\"{}-{encoding}\"", etag.trim_matches('"'))
}

/// Check if client's `If-None-Match` header matches the server's `ETag`
///
/// Supports a single tag, a comma-separated list, weak tags and `*`.
pub fn check_etag_match(if_none_match: Option<&str>, etag: &str) -> bool {
    if_none_match.is_some_and(|client_etag| {
        client_etag.split(',').any(|e| {
            let e = e.trim();
            e == "*" || e.trim_start_matches("W/") == etag
        })
    })
}

/// Parse a `Cache-Time` value; anything but a positive integer means "do not cache"
pub fn parse_cache_time(value: Option<&str>) -> u64 {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0)
}

/// Set `Cache-Time`, replacing any existing value
pub fn set_cache_time<B>(response: &mut Response<B>, seconds: u64) {
    response
        .headers_mut()
        .insert(CACHE_TIME.clone(), HeaderValue::from(seconds));
}

/// Set `Cache-Time` only when no handler has set it already
pub fn default_cache_time<B>(response: &mut Response<B>, seconds: u64) {
    response
        .headers_mut()
        .entry(CACHE_TIME.clone())
        .or_insert_with(|| HeaderValue::from(seconds));
}
