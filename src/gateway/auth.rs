//! HTTP basic auth gate.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::Credentials;

/// Challenge sent with every 401.
pub const CHALLENGE: &str = "Basic realm=Authorization Required";

pub async fn basic_auth_middleware(
    State(credentials): State<Arc<Credentials>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|value| matches(value, &credentials));

    if authorized {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "Rejecting unauthenticated request");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE))],
        "Unauthorized",
    )
        .into_response()
}

fn matches(header_value: &str, credentials: &Credentials) -> bool {
    let Some(encoded) = header_value
        .strip_prefix("Basic ")
        .or_else(|| header_value.strip_prefix("basic "))
    else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    match decoded.split_once(':') {
        Some((user, pass)) => user == credentials.username && pass == credentials.password,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tomster() -> Credentials {
        Credentials {
            username: "tomster".into(),
            password: "zoey".into(),
        }
    }

    #[test]
    fn test_matches_valid_header() {
        // "tomster:zoey"
        assert!(matches("Basic dG9tc3Rlcjp6b2V5", &tomster()));
    }

    #[test]
    fn test_rejects_bad_headers() {
        assert!(!matches("Bearer dG9tc3Rlcjp6b2V5", &tomster()));
        assert!(!matches("Basic !!!", &tomster()));
        // "tomster:wrong"
        assert!(!matches("Basic dG9tc3Rlcjp3cm9uZw==", &tomster()));
        // "tomster" without a colon
        assert!(!matches("Basic dG9tc3Rlcg==", &tomster()));
    }
}
