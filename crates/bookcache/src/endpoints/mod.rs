use axum::Router;
use axum::routing::get;
use bookcache_service::metric;
use bookcache_service::services::SearchService;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;

mod books;
mod error;
mod metrics;
mod status;

pub use error::{ApiErrorResponse, ResponseError};
use metrics::MetricsLayer;

use books::search_books as books;
use status::{circuit_breaker, upstream_count};

pub async fn healthcheck() -> &'static str {
    metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(service: SearchService) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(MetricsLayer);
    Router::new()
        .route("/api/books", get(books))
        .route("/api/upstream-count", get(upstream_count))
        .route("/api/circuit-breaker", get(circuit_breaker))
        .with_state(service)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}
