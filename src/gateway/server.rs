//! Gateway pipeline assembly.
//!
//! # Responsibilities
//! - Compose cache probe, compression, cache-hit short-circuit, auth gate,
//!   static assets and the render stage into one Axum router
//! - Serve the router on a TCP or unix listener

use std::path::PathBuf;
use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_http::{
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::cache::CacheStore;
use crate::config::{Credentials, GatewayConfig};
use crate::gateway::assets::{assets_router, ASSETS_PREFIX};
use crate::gateway::auth::basic_auth_middleware;
use crate::gateway::lookup::{probe_cache, serve_cached};
use crate::gateway::render_stage::{render_handler, RenderStage, RenderState};
use crate::net::GatewayListener;

/// Everything the pipeline is built from.
#[derive(Clone)]
pub struct GatewayOptions {
    pub gateway: GatewayConfig,
    pub credentials: Option<Credentials>,
    /// Bundle directory for static files; `None` disables the asset stage.
    pub dist_path: Option<PathBuf>,
    pub cache: Option<Arc<dyn CacheStore>>,
}

/// HTTP entry point of one worker.
pub struct GatewayServer {
    router: Router,
}

impl GatewayServer {
    /// Build the request pipeline around a render stage.
    pub fn new(options: GatewayOptions, stage: RenderStage) -> Self {
        Self {
            router: Self::build_router(options, stage),
        }
    }

    // Layers are added innermost first: the last `.layer` runs first.
    fn build_router(options: GatewayOptions, stage: RenderStage) -> Router {
        let render_state = RenderState {
            stage,
            cache: options.cache.clone(),
        };

        let mut router = match &options.dist_path {
            Some(dist_path) => {
                let render = get(render_handler).with_state(render_state.clone());
                let files = ServeDir::new(dist_path)
                    .append_index_html_on_directories(false)
                    .call_fallback_on_method_not_allowed(true)
                    .fallback(render);
                Router::new()
                    .route("/", get(render_handler))
                    .nest_service(
                        ASSETS_PREFIX,
                        assets_router(dist_path, options.gateway.assets_cache_control.as_deref()),
                    )
                    .with_state(render_state)
                    .fallback_service(files)
            }
            None => Router::new()
                .route("/", get(render_handler))
                .route("/{*path}", get(render_handler))
                .with_state(render_state),
        };

        if let Some(credentials) = options.credentials {
            tracing::info!(username = %credentials.username, "adding basic auth");
            router = router.layer(middleware::from_fn_with_state(
                Arc::new(credentials),
                basic_auth_middleware,
            ));
        }

        if options.cache.is_some() {
            router = router.layer(middleware::from_fn(serve_cached));
        }

        if options.gateway.gzip {
            router = router.layer(CompressionLayer::new());
        }

        if let Some(cache) = options.cache {
            router = router.layer(middleware::from_fn_with_state(cache, probe_cache));
        }

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The assembled router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until the listener fails.
    pub async fn serve(self, listener: GatewayListener) -> Result<(), std::io::Error> {
        tracing::info!(url = %listener.describe(), "HTTP server started");
        match listener {
            GatewayListener::Tcp(listener) => axum::serve(listener, self.router).await,
            GatewayListener::Unix(listener) => axum::serve(listener, self.router).await,
        }
    }
}
