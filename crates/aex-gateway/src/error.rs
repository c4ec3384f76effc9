// Path: crates/aex-gateway/src/error.rs
//! Maps the §7 error taxonomy onto HTTP responses. Mirrors
//! `http-rpc-gateway::AppError`: handlers return `Result<_, AppError>` and
//! everything else (`anyhow::Error`) collapses to a 500.

use aex_core::{AdmissionError, DispatchError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

pub enum AppError {
    Admission(AdmissionError),
    Dispatch(DispatchError),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<AdmissionError> for AppError {
    fn from(e: AdmissionError) -> Self {
        AppError::Admission(e)
    }
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        AppError::Dispatch(e)
    }
}

impl From<aex_store::StoreError> for AppError {
    fn from(e: aex_store::StoreError) -> Self {
        AppError::Internal(e.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e)
    }
}

fn admission_status(e: &AdmissionError) -> StatusCode {
    match e {
        AdmissionError::AuthMissing | AdmissionError::AuthInvalid | AdmissionError::AuthExpired | AdmissionError::AuthWeakToken => {
            StatusCode::UNAUTHORIZED
        }
        AdmissionError::IdempotencyConflict | AdmissionError::InFlightDuplicate => StatusCode::CONFLICT,
        AdmissionError::MutexTimeout | AdmissionError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AdmissionError::RateExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        AdmissionError::PolicyDenied(_) => StatusCode::FORBIDDEN,
        AdmissionError::BudgetExhausted => StatusCode::PAYMENT_REQUIRED,
        AdmissionError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        AdmissionError::Policy(_) => StatusCode::FORBIDDEN,
        AdmissionError::Types(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn dispatch_status(e: &DispatchError) -> StatusCode {
    match e {
        DispatchError::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::ProviderError(_) => StatusCode::BAD_GATEWAY,
        // Settlement already happened server-side; a response is never
        // actually sent back to a canceled client.
        DispatchError::ClientCancel => StatusCode::INTERNAL_SERVER_ERROR,
        DispatchError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::Http(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::Http(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Admission(e) => (admission_status(e), e.kind(), e.to_string()),
            AppError::Dispatch(e) => (dispatch_status(e), e.kind(), e.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request", msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "auth.invalid", msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "capability.denied", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal gateway error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal server error".to_string())
            }
        };
        aex_telemetry::sinks::global().inc_error(code, status.as_str());
        (status, Json(serde_json::json!({"error": {"code": code, "message": message}}))).into_response()
    }
}

/// Used by `HandleErrorLayer` to turn `tower` middleware failures
/// (timeout, load-shed rejection) into the same JSON error shape.
pub async fn map_middleware_error(err: tower::BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::GATEWAY_TIMEOUT,
            Json(serde_json::json!({"error": {"code": "timeout", "message": "request timed out"}})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": {"code": "overloaded", "message": err.to_string()}})),
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
