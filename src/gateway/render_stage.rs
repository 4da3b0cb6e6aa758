//! Terminal pipeline stage: the render engine, or the fallback page.

use std::sync::Arc;

use axum::{body::Body, extract::State, http::Request, response::Response};

use crate::cache::CacheStore;
use crate::gateway::intercept::intercept;
use crate::gateway::lookup::CacheMiss;
use crate::render::Renderer;
use crate::worker::fallback::{no_app_response, BootErrorSlot};

/// What answers requests that reach the end of the pipeline.
#[derive(Clone)]
pub enum RenderStage {
    /// A loaded application bundle.
    App(Arc<dyn Renderer>),
    /// No bundle; answer with the fixed error page.
    Unavailable(BootErrorSlot),
}

#[derive(Clone)]
pub struct RenderState {
    pub stage: RenderStage,
    pub cache: Option<Arc<dyn CacheStore>>,
}

pub async fn render_handler(State(state): State<RenderState>, request: Request<Body>) -> Response {
    let miss = request.extensions().get::<CacheMiss>().cloned();

    let response = match &state.stage {
        RenderStage::App(renderer) => renderer.render(request).await,
        RenderStage::Unavailable(errors) => no_app_response(errors),
    };

    match (miss, state.cache) {
        (Some(CacheMiss { path }), Some(cache)) => intercept(response, path, cache),
        _ => response,
    }
}
