//! HTTP request handlers
//!
//! Axum handlers for the analytics API. Computation runs on the blocking
//! pool; handlers only translate between DTOs and the service.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};

use crate::adapters::http::dto::{
    ComputeStatsRequest, ComputeStatsResponse, ErrorBarsRequest, ErrorBarsResponse, ErrorBody,
    HealthResponse, MultiEpsilonRequest, MultiEpsilonResponse, TrainModelRequest,
    TrainModelResponse,
};
use crate::application::AnalyticsService;
use crate::domain::ErrorKind;
use crate::ports::{Classifier, DifferentialPrivacy};
use crate::DpScopeError;

/// Service error rendered as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub DpScopeError);

impl From<DpScopeError> for ApiError {
    fn from(e: DpScopeError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::warn!("Request rejected: {}", self.0);
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(DpScopeError::InvalidParameter(rejection.body_text()))
    }
}

/// `Json` extractor whose rejections render as `{"error": "..."}` with 400.
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Run CPU-bound work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DpScopeError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            tracing::error!("Worker task failed: {}", e);
            DpScopeError::Unknown(format!("worker task failed: {e}"))
        })?
        .map_err(ApiError)
}

/// Health check handler
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    let health = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(health))
}

/// Simple or grouped statistic, decided by body shape
pub async fn compute_stats<D, C>(
    State(service): State<AnalyticsService<D, C>>,
    ApiJson(payload): ApiJson<ComputeStatsRequest>,
) -> Result<Json<ComputeStatsResponse>, ApiError>
where
    D: DifferentialPrivacy + 'static,
    C: Classifier + 'static,
{
    let response = blocking(move || match payload {
        ComputeStatsRequest::Simple(req) => service
            .compute_stats(&req.values, req.epsilon)
            .map(|s| ComputeStatsResponse::Simple(s.into())),
        ComputeStatsRequest::Grouped(req) => {
            let (data, request) = req.split();
            service
                .compute_grouped(&data, request)
                .map(|o| ComputeStatsResponse::Grouped(o.into()))
        }
    })
    .await?;

    Ok(Json(response))
}

/// Epsilon sweep with histograms and the downstream model step
pub async fn compute_multi_epsilon<D, C>(
    State(service): State<AnalyticsService<D, C>>,
    ApiJson(payload): ApiJson<MultiEpsilonRequest>,
) -> Result<Json<MultiEpsilonResponse>, ApiError>
where
    D: DifferentialPrivacy + 'static,
    C: Classifier + 'static,
{
    let results = blocking(move || {
        Ok(service.compute_multi_epsilon(&payload.values, &payload.epsilons))
    })
    .await?;

    Ok(Json(MultiEpsilonResponse {
        results: results.into_iter().map(Into::into).collect(),
    }))
}

/// Simulated error bars per group
pub async fn compute_error_bars<D, C>(
    State(service): State<AnalyticsService<D, C>>,
    ApiJson(payload): ApiJson<ErrorBarsRequest>,
) -> Result<Json<ErrorBarsResponse>, ApiError>
where
    D: DifferentialPrivacy + 'static,
    C: Classifier + 'static,
{
    let report = blocking(move || {
        let (data, request, num_simulations) = payload.split();
        service.compute_error_bars(&data, request, num_simulations)
    })
    .await?;

    Ok(Json(report.into()))
}

/// Raw vs. perturbed model comparison
pub async fn train_model<D, C>(
    State(service): State<AnalyticsService<D, C>>,
    ApiJson(payload): ApiJson<TrainModelRequest>,
) -> Result<Json<TrainModelResponse>, ApiError>
where
    D: DifferentialPrivacy + 'static,
    C: Classifier + 'static,
{
    let comparison = blocking(move || {
        service.train_model(payload.features, payload.labels, payload.epsilon)
    })
    .await?;

    Ok(Json(comparison.into()))
}

/// CORS preflight for known API routes
pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Preflight for any other `/api/` path; everything else is 404.
pub async fn fallback(method: Method, uri: Uri) -> StatusCode {
    if method == Method::OPTIONS && uri.path().starts_with("/api/") {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// =============================================================================
// Tests
// =============================================================================
