//! Static-asset stage.
//!
//! Files under the bundle directory are served directly. Anything under
//! `/assets` that is not a real file is a 404 and never reaches the render
//! stage.

use std::path::Path;

use axum::{
    extract::State,
    handler::HandlerWithoutStateExt,
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use tower_http::services::ServeDir;

/// URL prefix of the asset namespace.
pub const ASSETS_PREFIX: &str = "/assets";

async fn asset_not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}

async fn set_cache_control(State(value): State<HeaderValue>, mut response: Response) -> Response {
    if response.status().is_success() {
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, value);
    }
    response
}

/// Router for `/assets/*`, with an optional Cache-Control header.
pub fn assets_router(dist_path: &Path, cache_control: Option<&str>) -> Router {
    let serve = ServeDir::new(dist_path.join("assets"))
        .append_index_html_on_directories(false)
        .not_found_service(asset_not_found.into_service());

    let router = Router::new().fallback_service(serve);

    match cache_control.and_then(|v| HeaderValue::from_str(v).ok()) {
        Some(value) => router.layer(middleware::map_response_with_state(value, set_cache_control)),
        None => router,
    }
}
