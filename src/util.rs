//! Utility helpers for Verdict.
//!
//! Client identity extraction from proxy headers and a shared cache of
//! compiled keyword matchers.

use ahash::AHasher;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use axum::http::HeaderMap;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Key used when no proxy header identifies the caller.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Headers consulted for the caller's address, in priority order. Only the
/// first comma-separated entry of each is used.
const CLIENT_IP_HEADERS: [&str; 3] = ["x-real-ip", "x-forwarded-for", "x-vercel-forwarded-for"];

/// Best-effort client key for rate limiting. The first header present wins,
/// even if its value is empty.
pub fn client_key(headers: &HeaderMap) -> String {
    CLIENT_IP_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .map(|value| {
            let raw = String::from_utf8_lossy(value.as_bytes());
            raw.split(',').next().unwrap_or("").trim().to_string()
        })
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Text length in UTF-16 code units, the unit browsers and JSON clients use
/// for string length. Astral-plane characters such as emoji count twice.
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// A memoising wrapper around `AhoCorasick::new` to avoid recompiling
/// automata for repeated lists.  The cache key is a hash of the pattern list.
static AC_CACHE: Lazy<DashMap<u64, Arc<AhoCorasick>>> = Lazy::new(DashMap::new);

/// Given a list of literal patterns, return a shared case-insensitive
/// `AhoCorasick` matcher, building and caching it on first use.
pub fn ac_for(list: &[&str]) -> Result<Arc<AhoCorasick>, aho_corasick::BuildError> {
    let mut hasher = AHasher::default();
    for pat in list {
        pat.hash(&mut hasher);
    }
    let key = hasher.finish();
    if let Some(existing) = AC_CACHE.get(&key) {
        return Ok(existing.clone());
    }
    let ac = AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(list)?;
    let arc = Arc::new(ac);
    AC_CACHE.insert(key, arc.clone());
    Ok(arc)
}
