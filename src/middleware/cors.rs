use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// The admin UI and the candidate landing pages are served from other origins.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any)
}
