//! API layer - HTTP handlers and routing
//!
//! JSON endpoints under `/api`:
//! - Map data for visited and not visited cities, regions and collections
//! - Shared map data of other users
//! - Subscriptions
//! - Authentication
//! - Admin CRUD for reference data and content
//!
//! [`build_router`] mounts them next to the HTML pages of [`crate::web`].

pub mod admin;
pub mod auth;
pub mod city;
pub mod collection;
pub mod middleware;
pub mod region;
pub mod share;
pub mod subscribe;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::post,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the JSON API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/city", city::protected_router())
        .nest("/region", region::router())
        .nest("/collection", collection::router())
        .route("/subscribe", post(subscribe::subscribe))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/auth", auth::public_router())
        .nest("/city", city::public_router())
        .nest("/share", share::router())
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE];
    let cors = match state.config.server.cors_origin.parse::<HeaderValue>() {
        // Credentials cannot be combined with a wildcard origin
        Ok(origin) if origin == "*" => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
            .allow_credentials(true),
        Err(_) => {
            tracing::warn!(
                origin = %state.config.server.cors_origin,
                "Invalid CORS origin, cross-origin requests are disabled"
            );
            CorsLayer::new()
        }
    };

    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .merge(crate::web::router(state.clone()))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}


#[cfg(test)]
mod tests;
