//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers::{self, MAVEN_PREFIX};
use crate::metrics::{metrics_handler, register_metrics};
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    register_metrics();

    let admin_prefix =
        format!("{MAVEN_PREFIX}/registries/{{registry_id}}/upstreams/{{upstream_id}}/cache_entries");

    let maven_routes = Router::new()
        // The static `registries` segment wins over `{registry_id}`.
        .route(&admin_prefix, get(handlers::list_cache_entries))
        .route(
            &format!("{admin_prefix}/{{cache_entry_id}}"),
            delete(handlers::delete_cache_entry),
        )
        // GET also answers HEAD
        .route(
            &format!("{MAVEN_PREFIX}/{{registry_id}}/{{*path}}"),
            get(handlers::get_file)
                .put(handlers::upload_file)
                .post(handlers::upload_file),
        );

    // Unauthenticated, for load balancers
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        .merge(maven_routes);

    // SECURITY: network-restrict /metrics to the Prometheus scrapers.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
