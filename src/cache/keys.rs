//! Derived cache keys and HTTP freshness parsing.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the JSON encoding of `parts`.
///
/// JSON objects encode with sorted keys, so equal inputs always hash equal.
pub fn digest<T: Serialize + ?Sized>(parts: &T) -> String {
    let bytes = serde_json::to_vec(parts).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Key for a query result: hash of the query text and its bindings.
pub fn query_key(query: &str, bindings: &[Value]) -> String {
    format!("query:{}", digest(&(query, bindings)))
}

/// Key for a rendered view: hash of the view name and its data.
pub fn view_key(view: &str, data: &Value) -> String {
    format!("view:{}", digest(&(view, data)))
}

/// Key for an HTTP response: hash of the URL and request headers.
pub fn response_key(url: &str, headers: &BTreeMap<String, String>) -> String {
    format!("response:{}", digest(&(url, headers)))
}

fn header<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Freshness lifetime of a response from its headers.
///
/// `Cache-Control: max-age` wins over `Expires`. An `Expires` in the past
/// yields `Duration::ZERO`. None when neither header is usable.
pub fn ttl_from_headers(headers: &BTreeMap<String, String>, now: DateTime<Utc>) -> Option<Duration> {
    let max_age = header(headers, "cache-control").and_then(|value| {
        value.split(',').find_map(|directive| {
            let (name, seconds) = directive.trim().split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("max-age") {
                return None;
            }
            seconds.trim().trim_matches('"').parse::<u64>().ok()
        })
    });
    if let Some(seconds) = max_age {
        return Some(Duration::from_secs(seconds));
    }

    let expires = header(headers, "expires")?;
    let expires = DateTime::parse_from_rfc2822(expires.trim()).ok()?;
    Some(
        (expires.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}
