//! Utility helpers for quizgate.
//!
//! This module exposes the per-request view the admission guards work on
//! and a shared cache of compiled signature matchers.

use ahash::AHasher;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use axum::http::HeaderMap;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identifier used when no forwarding header is present.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Fields extracted once from the inbound request headers.  Guards only see
/// this structure, never the raw request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestMeta {
    /// First entry of `X-Forwarded-For`, or [`UNKNOWN_CLIENT`].
    pub client_id: String,
    /// Declared `User-Agent`, empty if absent or not valid text.
    pub user_agent: String,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let client_id = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| raw.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_CLIENT)
            .to_string();
        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        Self {
            client_id,
            user_agent,
        }
    }
}

/// A memoising wrapper around `AhoCorasick::new` to avoid recompiling
/// automata for repeated lists.  The cache key is a hash of the pattern list.
static AC_CACHE: Lazy<DashMap<u64, Arc<AhoCorasick>>> = Lazy::new(DashMap::new);

/// Given a list of literal patterns, return a shared case-insensitive
/// matcher.  Returns `None` if the automaton cannot be built.
pub fn ac_for(list: &[String]) -> Option<Arc<AhoCorasick>> {
    let mut hasher = AHasher::default();
    for pat in list {
        pat.hash(&mut hasher);
    }
    let key = hasher.finish();
    if let Some(existing) = AC_CACHE.get(&key) {
        return Some(existing.clone());
    }
    let lower: Vec<String> = list.iter().map(|p| p.to_lowercase()).collect();
    let ac = match AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(lower)
    {
        Ok(ac) => Arc::new(ac),
        Err(e) => {
            tracing::warn!(error = %e, patterns = list.len(), "failed to build signature matcher");
            return None;
        }
    };
    AC_CACHE.insert(key, ac.clone());
    Some(ac)
}
