//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::BodyExt;
use tempfile::TempDir;

use ssr_app_server::cache::{CacheError, CacheStore, RequestMeta, ResponseMeta};
use ssr_app_server::render::{RenderError, Renderer, RendererFactory};

/// A bundle directory with an entry document and one asset.
pub fn write_bundle(html: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), html).unwrap();
    std::fs::create_dir(dir.path().join("assets")).unwrap();
    std::fs::write(dir.path().join("assets/app.js"), "console.log('app');").unwrap();
    dir
}

pub fn write_entry(dir: &Path, html: &str) {
    std::fs::write(dir.join("index.html"), html).unwrap();
}

/// Renders a fixed body and counts invocations.
pub struct CountingRenderer {
    body: String,
    calls: AtomicUsize,
}

impl CountingRenderer {
    pub fn new(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: body.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for CountingRenderer {
    async fn render(&self, _request: Request<Body>) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            self.body.clone(),
        )
            .into_response()
    }

    async fn reload(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

pub fn counting_factory(renderer: Arc<CountingRenderer>) -> RendererFactory {
    Arc::new(move |_options| Ok(renderer.clone() as Arc<dyn Renderer>))
}

/// Renders a fixed body; `reload` never completes.
pub struct StallingRenderer {
    body: String,
    reloads: AtomicUsize,
}

impl StallingRenderer {
    pub fn new(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: body.to_string(),
            reloads: AtomicUsize::new(0),
        })
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for StallingRenderer {
    async fn render(&self, _request: Request<Body>) -> Response {
        (StatusCode::OK, self.body.clone()).into_response()
    }

    async fn reload(&self) -> Result<(), RenderError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

pub fn stalling_factory(renderer: Arc<StallingRenderer>) -> RendererFactory {
    Arc::new(move |_options| Ok(renderer.clone() as Arc<dyn Renderer>))
}

/// Errors on every lookup and counts stores.
pub struct UnreachableCache {
    pub puts: AtomicUsize,
}

impl UnreachableCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            puts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn fetch(&self, _path: &str, _request: &RequestMeta) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn put(&self, _path: &str, _body: Bytes, _response: &ResponseMeta) -> Result<(), CacheError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Misses every lookup and fails every store.
pub struct FailingCache {
    pub puts: AtomicUsize,
}

impl FailingCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            puts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CacheStore for FailingCache {
    async fn fetch(&self, _path: &str, _request: &RequestMeta) -> Result<Option<Bytes>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _path: &str, _body: Bytes, _response: &ResponseMeta) -> Result<(), CacheError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Unavailable("disk full".to_string()))
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Read a body to the end without decoding it.
pub async fn drain(response: Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
