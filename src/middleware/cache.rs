//! Response expiration cache
//!
//! Stores whole responses keyed by request path for as long as the
//! downstream handler asked via the `Cache-Time` header (seconds). A missing,
//! zero or malformed `Cache-Time` means the response is not stored.
//!
//! Only `200 OK` answers to `GET` are stored; `HEAD` requests are served
//! from the `GET` entry with the body dropped. Because static responses may
//! be gzipped, the encoding negotiated for the request is part of the key.
//! A hit whose stored `ETag` matches `If-None-Match` is answered with `304`.
//!
//! Entries are only removed once found expired; there is no size bound.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, ETAG, IF_NONE_MATCH};
use hyper::{Method, Response, StatusCode};
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{Next, RequestContext, Stage, StageResult};
use crate::http::cache::{check_etag_match, parse_cache_time};
use crate::http::compress::accepts_gzip;
use crate::http::{self, CACHE_TIME};

/// `hit` when replayed from the cache, `miss` when freshly stored
pub static X_CACHE: HeaderName = HeaderName::from_static("x-cache");

struct CachedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    expires_at: Instant,
}

impl CachedResponse {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    fn to_response(&self, ctx: &RequestContext) -> StageResult {
        let etag = self.headers.get(ETAG).and_then(|v| v.to_str().ok());
        if let Some(etag) = etag {
            if check_etag_match(ctx.header(IF_NONE_MATCH), etag) {
                let mut response = http::build_304_response(etag)?;
                response
                    .headers_mut()
                    .insert(X_CACHE.clone(), HeaderValue::from_static("hit"));
                return Ok(response);
            }
        }

        let body = if ctx.is_head() { Bytes::new() } else { self.body.clone() };
        let mut response = Response::new(Full::new(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();
        response
            .headers_mut()
            .insert(X_CACHE.clone(), HeaderValue::from_static("hit"));
        Ok(response)
    }
}

#[derive(Default)]
pub struct ExpirationCache {
    entries: RwLock<HashMap<String, CachedResponse>>,
}

impl ExpirationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, fresh or not
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Fresh entry for `key`, dropping it if it has expired
    async fn lookup(&self, key: &str, ctx: &RequestContext) -> Option<StageResult> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_fresh(now) => return Some(entry.to_response(ctx)),
                Some(_) => {}
                None => return None,
            }
        }

        let mut entries = self.entries.write().await;
        // Another request may have refreshed it between the two locks
        if entries.get(key).is_some_and(|entry| !entry.is_fresh(now)) {
            entries.remove(key);
        }
        None
    }

    async fn store(&self, key: String, entry: CachedResponse) {
        self.entries.write().await.insert(key, entry);
    }
}

/// Cache key: the request path, plus the negotiated content encoding
pub fn cache_key(ctx: &RequestContext) -> String {
    let path = ctx.path();
    if accepts_gzip(ctx.request.headers()) {
        format!("{path}|gzip")
    } else {
        path.to_string()
    }
}

#[async_trait]
impl Stage for ExpirationCache {
    async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> StageResult {
        let method = ctx.method();
        if method != Method::GET && method != Method::HEAD {
            return next.run(ctx).await;
        }

        let key = cache_key(ctx);
        if let Some(cached) = self.lookup(&key, ctx).await {
            return cached;
        }

        let response = next.run(ctx).await?;
        if method != Method::GET || response.status() != StatusCode::OK {
            return Ok(response);
        }

        let ttl = parse_cache_time(
            response
                .headers()
                .get(&CACHE_TIME)
                .and_then(|v| v.to_str().ok()),
        );
        let expires_at = match ttl {
            0 => None,
            secs => Instant::now().checked_add(Duration::from_secs(secs)),
        };
        let Some(expires_at) = expires_at else {
            return Ok(response);
        };

        let (mut parts, body) = response.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };

        self.store(
            key,
            CachedResponse {
                status: parts.status,
                headers: parts.headers.clone(),
                body: body.clone(),
                expires_at,
            },
        )
        .await;

        parts
            .headers
            .insert(X_CACHE.clone(), HeaderValue::from_static("miss"));
        Ok(Response::from_parts(parts, Full::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{body_string, get, request, CountingEndpoint};
    use super::super::Pipeline;
    use super::*;
    use std::sync::Arc;

    fn pipeline(cache_time: Option<&'static str>) -> (Pipeline, Arc<CountingEndpoint>) {
        let endpoint = Arc::new(CountingEndpoint::new(cache_time));
        let pipeline = Pipeline::new(Arc::clone(&endpoint)).stage(ExpirationCache::new());
        (pipeline, endpoint)
    }

    #[tokio::test]
    async fn test_second_request_served_from_cache() {
        let (pipeline, endpoint) = pipeline(Some("60"));

        let first = pipeline.run(&get("/index.html")).await.unwrap();
        assert_eq!(first.headers()[&X_CACHE], "miss");
        let first_body = body_string(first).await;

        let second = pipeline.run(&get("/index.html")).await.unwrap();
        assert_eq!(second.headers()[&X_CACHE], "hit");
        assert_eq!(second.headers()[&CACHE_TIME], "60");
        assert_eq!(body_string(second).await, first_body);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let (pipeline, endpoint) = pipeline(Some("10"));

        pipeline.run(&get("/a")).await.unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        let cached = pipeline.run(&get("/a")).await.unwrap();
        assert_eq!(body_string(cached).await, "/a #1");
        assert_eq!(endpoint.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let refreshed = pipeline.run(&get("/a")).await.unwrap();
        assert_eq!(refreshed.headers()[&X_CACHE], "miss");
        assert_eq!(body_string(refreshed).await, "/a #2");
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_cache_time_never_cached() {
        let (pipeline, endpoint) = pipeline(None);
        for _ in 0..3 {
            let response = pipeline.run(&get("/a")).await.unwrap();
            assert!(response.headers().get(&X_CACHE).is_none());
        }
        assert_eq!(endpoint.calls(), 3);
    }

    #[tokio::test]
    async fn test_malformed_cache_time_never_cached() {
        for value in ["soon", "-1", "0", ""] {
            let (pipeline, endpoint) = pipeline(Some(value));
            pipeline.run(&get("/a")).await.unwrap();
            pipeline.run(&get("/a")).await.unwrap();
            assert_eq!(endpoint.calls(), 2, "Cache-Time {value:?}");
        }
    }

    #[tokio::test]
    async fn test_key_is_path_not_query() {
        let (pipeline, endpoint) = pipeline(Some("60"));
        pipeline.run(&get("/a?v=1")).await.unwrap();
        pipeline.run(&get("/a?v=2")).await.unwrap();
        pipeline.run(&get("/b")).await.unwrap();
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn test_gzip_variant_keyed_separately() {
        let (pipeline, endpoint) = pipeline(Some("60"));
        pipeline.run(&get("/a")).await.unwrap();
        pipeline
            .run(&request("GET", "/a", &[("accept-encoding", "gzip")]))
            .await
            .unwrap();
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn test_head_uses_get_entry_without_body() {
        let (pipeline, endpoint) = pipeline(Some("60"));
        pipeline.run(&get("/a")).await.unwrap();

        let head = pipeline.run(&request("HEAD", "/a", &[])).await.unwrap();
        assert_eq!(head.headers()[&X_CACHE], "hit");
        assert_eq!(body_string(head).await, "");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_hit_revalidates_with_if_none_match() {
        let (pipeline, endpoint) = pipeline(Some("60"));
        let first = pipeline.run(&get("/index.html")).await.unwrap();
        let etag = first.headers()[ETAG].to_str().unwrap().to_string();

        let ctx = request("GET", "/index.html", &[("if-none-match", etag.as_str())]);
        let revalidated = pipeline.run(&ctx).await.unwrap();
        assert_eq!(revalidated.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(revalidated.headers()[ETAG], etag.as_str());
        assert_eq!(revalidated.headers()[&X_CACHE], "hit");
        assert_eq!(body_string(revalidated).await, "");

        let stale = request("GET", "/index.html", &[("if-none-match", "\"other\"")]);
        let replayed = pipeline.run(&stale).await.unwrap();
        assert_eq!(replayed.status(), StatusCode::OK);
        assert_eq!(body_string(replayed).await, "/index.html #1");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_head_is_not_stored() {
        let (pipeline, endpoint) = pipeline(Some("60"));
        pipeline.run(&request("HEAD", "/a", &[])).await.unwrap();
        let get_response = pipeline.run(&get("/a")).await.unwrap();
        assert_eq!(body_string(get_response).await, "/a #2");
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn test_other_methods_bypass_cache() {
        let (pipeline, endpoint) = pipeline(Some("60"));
        pipeline.run(&request("POST", "/a", &[])).await.unwrap();
        pipeline.run(&request("POST", "/a", &[])).await.unwrap();
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_dropped_on_lookup() {
        let cache = Arc::new(ExpirationCache::new());
        let endpoint = CountingEndpoint::new(None);
        cache
            .store(
                "/gone".to_string(),
                CachedResponse {
                    status: StatusCode::OK,
                    headers: HeaderMap::new(),
                    body: Bytes::from("old"),
                    expires_at: Instant::now() + Duration::from_secs(1),
                },
            )
            .await;
        assert_eq!(cache.len().await, 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let pipeline = Pipeline::new(endpoint).stage(ArcStage(Arc::clone(&cache)));
        let response = pipeline.run(&get("/gone")).await.unwrap();
        assert_eq!(body_string(response).await, "/gone #1");
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_see_whole_entries() {
        let (pipeline, _) = pipeline(Some("60"));
        let pipeline = Arc::new(pipeline);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let pipeline = Arc::clone(&pipeline);
            tasks.spawn(async move {
                let response = pipeline.run(&get("/shared")).await.unwrap();
                body_string(response).await
            });
        }
        while let Some(body) = tasks.join_next().await {
            let body = body.unwrap();
            assert!(body.starts_with("/shared #"), "unexpected body {body:?}");
        }
    }

    struct ArcStage(Arc<ExpirationCache>);

    #[async_trait]
    impl Stage for ArcStage {
        async fn handle(&self, ctx: &RequestContext, next: Next<'_>) -> StageResult {
            self.0.handle(ctx, next).await
        }
    }
}
