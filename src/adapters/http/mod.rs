//! REST/HTTP API
//!
//! Axum router over the [`AnalyticsService`]. Every `/api/` response carries
//! permissive CORS headers; preflight requests get an empty 204.

mod dto;
mod handlers;

pub use dto::*;
pub use handlers::*;

use axum::{
    http::{header, HeaderValue},
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};

use crate::application::AnalyticsService;
use crate::ports::{Classifier, DifferentialPrivacy};

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    response
}

/// Build the application router.
pub fn router<D, C>(service: AnalyticsService<D, C>) -> Router
where
    D: DifferentialPrivacy + 'static,
    C: Classifier + 'static,
{
    let api = Router::new()
        .route(
            "/api/compute-stats",
            post(compute_stats::<D, C>).options(preflight),
        )
        .route(
            "/api/compute-multi-epsilon",
            post(compute_multi_epsilon::<D, C>).options(preflight),
        )
        .route(
            "/api/compute-error-bars",
            post(compute_error_bars::<D, C>).options(preflight),
        )
        .route(
            "/api/train-model",
            post(train_model::<D, C>).options(preflight),
        )
        .fallback(fallback)
        .layer(middleware::map_response(cors_headers))
        .with_state(service);

    Router::new().route("/health", get(health_check)).merge(api)
}
