//! Template-shell renderer.
//!
//! Serves the bundle's `index.html` for every route, substituting
//! `{{NAME}}` with sandbox globals and `{{request.path}}` with the
//! (escaped) request path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::render::{RenderError, RenderOptions, Renderer, ENTRY_DOCUMENT};

const HEAD_CLOSE: &str = "</head>";

/// Renders the bundle's HTML shell.
pub struct ShellRenderer {
    options: RenderOptions,
    document: ArcSwap<String>,
}

impl ShellRenderer {
    /// Load the entry document from `options.dist_path`.
    pub fn load(options: RenderOptions) -> Result<Self, RenderError> {
        let document = read_entry_sync(&options.dist_path)?;
        tracing::info!(dist_path = %options.dist_path.display(), "Bundle loaded");
        Ok(Self {
            options,
            document: ArcSwap::from_pointee(document),
        })
    }

    pub fn dist_path(&self) -> &Path {
        &self.options.dist_path
    }

    fn fill(&self, template: &str, request_path: &str) -> String {
        let mut html = template.replace("{{request.path}}", &escape_html(request_path));
        for (name, value) in &self.options.sandbox_globals {
            html = html.replace(&format!("{{{{{}}}}}", name), value);
        }
        html
    }
}

#[async_trait]
impl Renderer for ShellRenderer {
    async fn render(&self, request: Request<Body>) -> Response {
        let template = self.document.load_full();
        let html = self.fill(&template, request.uri().path());

        let body = if self.options.chunked_response {
            let (head, rest) = split_after_head(html);
            let chunks = vec![Ok::<_, std::io::Error>(head), Ok(rest)];
            Body::from_stream(futures_util::stream::iter(chunks))
        } else {
            Body::from(html)
        };

        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            body,
        )
            .into_response()
    }

    async fn reload(&self) -> Result<(), RenderError> {
        let path = entry_path(&self.options.dist_path);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|source| RenderError::Entry {
                path: path.clone(),
                source,
            })?;
        let document = String::from_utf8(raw).map_err(|_| RenderError::Encoding(path))?;
        self.document.store(Arc::new(document));
        tracing::info!(dist_path = %self.options.dist_path.display(), "Bundle reloaded");
        Ok(())
    }
}

fn entry_path(dist_path: &Path) -> PathBuf {
    dist_path.join(ENTRY_DOCUMENT)
}

fn read_entry_sync(dist_path: &Path) -> Result<String, RenderError> {
    let path = entry_path(dist_path);
    let raw = std::fs::read(&path).map_err(|source| RenderError::Entry {
        path: path.clone(),
        source,
    })?;
    String::from_utf8(raw).map_err(|_| RenderError::Encoding(path))
}

fn split_after_head(html: String) -> (Bytes, Bytes) {
    match html.find(HEAD_CLOSE) {
        Some(idx) => {
            let all = Bytes::from(html);
            let cut = idx + HEAD_CLOSE.len();
            (all.slice(..cut), all.slice(cut..))
        }
        None => (Bytes::from(html), Bytes::new()),
    }
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
