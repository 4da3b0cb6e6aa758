//! Render engine port.
//!
//! The engine that turns a request into a document sits behind
//! [`Renderer`]. The gateway only invokes it; it never inspects the
//! application bundle itself.

pub mod shell;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use thiserror::Error;

pub use shell::ShellRenderer;

/// File that marks a directory as an application bundle.
pub const ENTRY_DOCUMENT: &str = "index.html";

/// Errors raised while loading or reloading a bundle.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("bundle entry {path} could not be read: {source}")]
    Entry {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("bundle entry {0} is not valid UTF-8")]
    Encoding(PathBuf),
}

/// Construction options for a render engine.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Bundle location.
    pub dist_path: PathBuf,

    /// Values exposed to the application sandbox.
    pub sandbox_globals: BTreeMap<String, String>,

    /// Write the document incrementally.
    pub chunked_response: bool,
}

/// Turns requests into (possibly streamed) responses.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    /// Render one request.
    async fn render(&self, request: Request<Body>) -> Response;

    /// Swap in the bundle currently at the configured location.
    async fn reload(&self) -> Result<(), RenderError>;
}

/// Builds a renderer for a bundle. Called once per worker lifetime.
pub type RendererFactory =
    Arc<dyn Fn(RenderOptions) -> Result<Arc<dyn Renderer>, RenderError> + Send + Sync>;

/// Factory for the bundled [`ShellRenderer`].
pub fn shell_factory() -> RendererFactory {
    Arc::new(|options| Ok(Arc::new(ShellRenderer::load(options)?) as Arc<dyn Renderer>))
}
