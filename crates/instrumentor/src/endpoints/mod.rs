use axum::Router;
use axum::routing::get;
use instrumentor_service::services::SharedServices;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use tower::ServiceBuilder;

mod error;
mod instrument;
mod metrics;

pub use error::ResponseError;
use instrument::serve_request;
use metrics::MetricsLayer;

pub async fn healthcheck() -> &'static str {
    instrumentor_service::metric!(counter("healthcheck") += 1);
    "ok"
}

/// Creates the web app serving the configured root directory.
///
/// Requests for paths matching one of the configured patterns are served instrumented, all
/// other requests are served as static files.
pub fn create_app(services: SharedServices) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(MetricsLayer);

    Router::new()
        .fallback(serve_request)
        .with_state(services)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}
