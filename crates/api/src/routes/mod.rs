//! API route definitions.

use axum::{Router, middleware};

use crate::{AppState, middleware::auth_middleware};

pub mod health;
pub mod posts;
pub mod votes;

/// Creates the API router with protected routes that need state for middleware.
#[allow(clippy::needless_pass_by_value)]
pub fn api_routes_with_state(state: AppState) -> Router<AppState> {
    // Protected routes that require authentication
    let protected_routes =
        Router::new()
            .merge(votes::routes())
            .layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            ));

    // Public routes; viewers may still identify themselves
    Router::new()
        .merge(health::routes())
        .merge(posts::routes())
        .merge(protected_routes)
}
