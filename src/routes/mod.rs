pub mod health;
pub mod interviews;
pub mod responses;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{auth, cors::cors_layer, rate_limit};
use crate::AppState;

/// Full HTTP surface: health, the authenticated scheduling API and the
/// public candidate links, each group with its own rate limit.
pub fn router(state: AppState) -> Router {
    let base_routes = Router::new().route("/health", get(health::health));

    let scheduling_api = Router::new()
        .route(
            "/api/interviews/schedule",
            post(interviews::schedule_interview),
        )
        .route("/api/interviews/:id", get(interviews::get_interview))
        .route(
            "/api/interviews/:id/resend",
            post(interviews::resend_invitation),
        )
        .route(
            "/api/applications/:id/interviews",
            get(interviews::list_application_interviews),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.auth_keys.clone(),
            auth::require_bearer_auth,
        ))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::RateLimiter::global(state.limits.integration_rps),
            rate_limit::rps_middleware,
        ));

    let public_links = Router::new()
        .route(
            "/interview/accept/:token",
            get(responses::accept_interview).post(responses::accept_interview),
        )
        .route(
            "/interview/reschedule/:token",
            get(responses::request_reschedule).post(responses::request_reschedule),
        )
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::RateLimiter::per_client(state.limits.public_rps),
            rate_limit::rps_middleware,
        ));

    base_routes
        .merge(scheduling_api)
        .merge(public_links)
        .with_state(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}
