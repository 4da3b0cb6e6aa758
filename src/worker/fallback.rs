//! "No application" handler.
//!
//! Installed instead of the render engine when a worker has no bundle. It
//! is terminal: the worker never retries building the engine itself. On
//! `Reload` it exits so a fresh fork can boot the current bundle.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::render::shell::escape_html;

/// Last error reported to this worker, shown by the fallback page.
#[derive(Debug, Clone, Default)]
pub struct BootErrorSlot {
    inner: Arc<ArcSwapOption<String>>,
}

impl BootErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, detail: impl Into<String>) {
        self.inner.store(Some(Arc::new(detail.into())));
    }

    pub fn get(&self) -> Option<Arc<String>> {
        self.inner.load_full()
    }
}

/// The fixed "application unavailable" response.
pub fn no_app_response(errors: &BootErrorSlot) -> Response {
    let mut html = String::from("<h1>No Application Found</h1>");
    if let Some(error) = errors.get() {
        html.push_str("<pre style=\"color: red\">");
        html.push_str(&escape_html(&error));
        html.push_str("</pre>");
    }
    (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_without_error() {
        let response = no_app_response(&BootErrorSlot::new());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(response).await, "<h1>No Application Found</h1>");
    }

    #[tokio::test]
    async fn test_embeds_latest_error() {
        let slot = BootErrorSlot::new();
        slot.record("first");
        slot.record("Error: <bad> bundle");
        let html = body(no_app_response(&slot)).await;
        assert!(html.contains("<pre style=\"color: red\">Error: &lt;bad&gt; bundle</pre>"));
        assert!(!html.contains("first"));
    }
}
