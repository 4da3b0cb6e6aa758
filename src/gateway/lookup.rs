//! Cache probe and cache-hit short-circuit stages.
//!
//! The probe runs first and only tags the request; the short-circuit runs
//! inside the compression layer so cached bodies are compressed like fresh
//! ones.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use bytes::Bytes;

use crate::cache::{CacheStore, RequestMeta};
use crate::observability::metrics;

/// A stored body found by the probe.
#[derive(Debug, Clone)]
pub struct CachedBody(pub Bytes);

/// The probe missed; the render response should be intercepted.
#[derive(Debug, Clone)]
pub struct CacheMiss {
    pub path: String,
}

/// Look the request path up in the cache and tag the request.
///
/// A failing probe tags nothing, so the request renders without
/// interception.
pub async fn probe_cache(
    State(cache): State<Arc<dyn CacheStore>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let (mut parts, body) = request.into_parts();
    let meta = RequestMeta::from_parts(&parts);

    match cache.fetch(&path, &meta).await {
        Ok(Some(stored)) => {
            metrics::record_cache_lookup("hit");
            tracing::info!(path = %path, "cache hit");
            parts.extensions.insert(CachedBody(stored));
        }
        Ok(None) => {
            metrics::record_cache_lookup("miss");
            tracing::info!(path = %path, "cache miss");
            parts.extensions.insert(CacheMiss { path });
        }
        Err(e) => {
            metrics::record_cache_lookup("error");
            tracing::warn!(path = %path, error = %e, "cache lookup failed, rendering");
        }
    }

    next.run(Request::from_parts(parts, body)).await
}

/// Answer with the stored body when the probe found one.
pub async fn serve_cached(request: Request<Body>, next: Next) -> Response {
    match request.extensions().get::<CachedBody>() {
        Some(CachedBody(body)) => Html(body.clone()).into_response(),
        None => next.run(request).await,
    }
}
