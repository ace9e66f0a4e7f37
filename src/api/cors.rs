//! Cross-origin policy.
//!
//! Browsers on an allow-listed origin get credentialed CORS headers. Requests
//! carrying any other `Origin` are refused outright; requests without an
//! `Origin` header (curl, mobile apps, server-to-server) always pass.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::CorsConfig;
use crate::AppState;

use super::error::ApiError;

pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
}

pub fn is_origin_allowed(config: &CorsConfig, origin: &str) -> bool {
    config.allowed_origins.iter().any(|allowed| allowed == origin)
}

/// Reject requests from origins that are not on the allow-list
pub async fn enforce_origin(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|o| is_origin_allowed(&state.config.cors, o))
            .unwrap_or(false);
        if !allowed {
            tracing::warn!(origin = ?origin, path = %request.uri().path(), "Blocked cross-origin request");
            return Err(ApiError::forbidden(
                "The CORS policy for this site does not allow access from the specified Origin.",
            ));
        }
    }

    Ok(next.run(request).await)
}
