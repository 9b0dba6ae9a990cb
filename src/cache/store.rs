//! Response cache storage.
//!
//! # Known limitation
//! The key is the request-target alone, so `GET` and `HEAD` for the same
//! target share one entry. A stored `HEAD` response carries the origin's
//! `Content-Length` with an empty body; if a later `GET` for that target is
//! answered `304 Not Modified`, the client is sent that bodiless entry.

use std::sync::Arc;

use dashmap::DashMap;

use crate::http::{HttpRequest, HttpResponse};
use crate::observability::metrics;

/// A thread-safe map from request-target to the last response seen for it.
///
/// Keys are the target exactly as the client sent it, so two spellings of the
/// same resource are cached separately. Entries are replaced wholesale. There
/// is no size bound or eviction: entries live as long as the process.
#[derive(Debug, Clone, Default)]
pub struct ResponseCache {
    inner: Arc<DashMap<String, HttpResponse>>,
}

impl ResponseCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the entry for `target`.
    pub fn get(&self, target: &str) -> Option<HttpResponse> {
        self.inner.get(target).map(|r| r.value().clone())
    }

    /// Store `response` as the entry for `target`, replacing any previous one.
    pub fn put(&self, target: impl Into<String>, response: HttpResponse) {
        self.inner.insert(target.into(), response);
        metrics::record_cache_size(self.inner.len());
    }

    pub fn contains(&self, target: &str) -> bool {
        self.inner.contains_key(target)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// GET and HEAD without a `Range` header may be served from the cache.
pub fn cachable(request: &HttpRequest) -> bool {
    matches!(request.method.as_str(), "GET" | "HEAD") && !request.headers.contains_key("Range")
}
