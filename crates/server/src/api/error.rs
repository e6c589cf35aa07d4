//! Mapping of core errors onto HTTP responses.

use axum::{http::StatusCode, Json};
use serde::Serialize;

use bookshelf_core::{AggregationError, RegistryError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn registry_error(err: RegistryError) -> ApiError {
    let status = match &err {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::UnknownImplementation(_) | RegistryError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        RegistryError::Provider(_) | RegistryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

pub fn aggregation_error(err: AggregationError) -> ApiError {
    match err {
        AggregationError::NoProvidersAvailable { .. } => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        AggregationError::MetadataNotFound { .. } => {
            api_error(StatusCode::NOT_FOUND, err.to_string())
        }
        AggregationError::Registry(inner) => registry_error(inner),
    }
}
