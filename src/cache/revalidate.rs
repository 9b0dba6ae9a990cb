//! Conditional revalidation of cached responses.
//!
//! # Flow
//! ```text
//! cache hit
//!     → If-Modified-Since = cached Last-Modified | cached Date | now
//!     → dial origin (failure: not handled, caller forwards normally)
//!     → send request + If-Modified-Since, parse reply
//!     → 304: serve cached entry, cache untouched
//!     → other: serve fresh reply, replace cache entry
//! ```

use chrono::Utc;

use crate::cache::store::ResponseCache;
use crate::config::DEFAULT_HTTP_PORT;
use crate::http::{CodecError, HttpRequest, HttpResponse};
use crate::observability::metrics;
use crate::proxy::upstream::{force_http10, Upstream};

pub const IF_MODIFIED_SINCE: &str = "If-Modified-Since";

/// What the cache did with a request.
#[derive(Debug)]
pub enum CacheOutcome {
    /// No entry for the target.
    Miss,
    /// Origin answered 304; respond with the cached entry.
    NotModified(HttpResponse),
    /// Origin sent a new response; it is already stored.
    Refreshed(HttpResponse),
    /// The origin could not be dialed; fall through to forwarding.
    Unreachable,
    /// The origin was reached but the exchange failed.
    Failed(CodecError),
}

/// `If-Modified-Since` value for revalidating `cached`.
pub fn if_modified_since(cached: &HttpResponse) -> String {
    cached
        .header("Last-Modified")
        .or_else(|| cached.header("Date"))
        .map(str::to_string)
        .unwrap_or_else(http_date_now)
}

/// The current time as an IMF-fixdate.
pub fn http_date_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Look up `request` and revalidate a hit with its origin.
pub async fn serve_from_cache(cache: &ResponseCache, upstream: &Upstream, request: &HttpRequest) -> CacheOutcome {
    let key = request.target.raw();
    let Some(cached) = cache.get(key) else {
        metrics::record_cache_event("miss");
        tracing::debug!(target_uri = key, "Cache miss");
        return CacheOutcome::Miss;
    };

    let authority = request.target.authority(DEFAULT_HTTP_PORT);
    let origin = match upstream.dial(&authority).await {
        Ok(origin) => origin,
        Err(e) => {
            tracing::warn!(target_uri = key, origin = %authority, error = %e, "Revalidation dial failed");
            metrics::record_cache_event("unreachable");
            return CacheOutcome::Unreachable;
        }
    };

    let mut conditional = request.clone();
    force_http10(&mut conditional);
    let since = if_modified_since(&cached);
    conditional
        .headers
        .insert(IF_MODIFIED_SINCE.to_string(), since.clone());

    let result = upstream.exchange(&origin, &conditional).await;
    origin.teardown().await;

    match result {
        Ok(fresh) if fresh.status == 304 => {
            metrics::record_cache_event("hit");
            tracing::info!(target_uri = key, if_modified_since = %since, "Cache hit, not modified");
            CacheOutcome::NotModified(cached)
        }
        Ok(fresh) => {
            metrics::record_cache_event("refresh");
            tracing::info!(target_uri = key, status = fresh.status, "Cache entry refreshed");
            cache.put(key, fresh.clone());
            CacheOutcome::Refreshed(fresh)
        }
        Err(e) => {
            metrics::record_cache_event("error");
            tracing::warn!(target_uri = key, error = %e, "Revalidation failed");
            CacheOutcome::Failed(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use crate::http::RequestTarget;
    use crate::net::Registry;

    fn get(target: &str) -> HttpRequest {
        HttpRequest {
            method: "GET".into(),
            target: RequestTarget::parse(target, "GET").unwrap(),
            version: "HTTP/1.1".into(),
            headers: Default::default(),
            body: Vec::new(),
        }
    }

    fn upstream(registry: &Registry) -> Upstream {
        Upstream::new(registry.clone(), Duration::from_millis(500), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn miss_without_entry() {
        let registry = Registry::new();
        let outcome = serve_from_cache(&ResponseCache::new(), &upstream(&registry), &get("http://a.com/")).await;
        assert!(matches!(outcome, CacheOutcome::Miss));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn closed_origin_is_unreachable() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let target = format!("http://127.0.0.1:{}/doc", port);
        let cache = ResponseCache::new();
        cache.put(target.as_str(), HttpResponse::plain_text(200, "OK", "cached"));
        let registry = Registry::new();

        let outcome = serve_from_cache(&cache, &upstream(&registry), &get(&target)).await;
        assert!(matches!(outcome, CacheOutcome::Unreachable));
        assert_eq!(cache.get(&target).unwrap().body, b"cached");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn origin_closing_before_status_line_fails_and_keeps_entry() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
        });

        let target = format!("http://{}/doc", addr);
        let seeded = HttpResponse::plain_text(200, "OK", "cached");
        let cache = ResponseCache::new();
        cache.put(target.as_str(), seeded.clone());
        let registry = Registry::new();

        let outcome = serve_from_cache(&cache, &upstream(&registry), &get(&target)).await;
        assert!(matches!(outcome, CacheOutcome::Failed(_)));
        assert_eq!(cache.get(&target).unwrap(), seeded);
        assert!(registry.is_empty());
    }

    #[test]
    fn prefers_last_modified_then_date() {
        let mut cached = HttpResponse::plain_text(200, "OK", "x");
        cached.headers.insert("Date".into(), "Mon, 01 Jan 2024 00:00:00 GMT".into());
        assert_eq!(if_modified_since(&cached), "Mon, 01 Jan 2024 00:00:00 GMT");

        cached
            .headers
            .insert("Last-Modified".into(), "Sun, 31 Dec 2023 00:00:00 GMT".into());
        assert_eq!(if_modified_since(&cached), "Sun, 31 Dec 2023 00:00:00 GMT");
    }

    #[test]
    fn falls_back_to_now() {
        let cached = HttpResponse::plain_text(200, "OK", "x");
        let value = if_modified_since(&cached);
        assert!(value.ends_with(" GMT"));
        assert!(chrono::DateTime::parse_from_rfc2822(&value.replace("GMT", "+0000")).is_ok());
    }
}
