//! Application router configuration.

use axum::{Router, middleware, routing::post};

use crate::{
    AppState, endpoints, logging::logging_middleware, trigger::run_recurring_endpoint,
};

/// Return a router with the engine's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::RUN_RECURRING, post(run_recurring_endpoint))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}
