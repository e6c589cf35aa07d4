//! Provider definition API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use bookshelf_core::{
    provider::ValidationFailure, registry::ProviderTemplate, ProviderDefinition, ProviderStatus,
};

use super::error::{api_error, registry_error, ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// A provider definition as exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResource {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub implementation: String,
    #[serde(default)]
    pub enable_author_search: bool,
    #[serde(default)]
    pub enable_book_search: bool,
    #[serde(default)]
    pub enable_automatic_refresh: bool,
    /// 0 lets the server pick a priority on create.
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub settings: serde_json::Value,
    /// Read-only; ignored on input.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProviderStatus>,
}

impl From<ProviderDefinition> for ProviderResource {
    fn from(definition: ProviderDefinition) -> Self {
        Self {
            id: definition.id,
            name: definition.name,
            implementation: definition.implementation,
            enable_author_search: definition.enable_author_search,
            enable_book_search: definition.enable_book_search,
            enable_automatic_refresh: definition.enable_automatic_refresh,
            priority: definition.priority,
            tags: definition.tags,
            settings: definition.settings,
            status: definition.status,
        }
    }
}

impl From<ProviderResource> for ProviderDefinition {
    fn from(resource: ProviderResource) -> Self {
        Self {
            id: resource.id,
            name: resource.name,
            implementation: resource.implementation,
            priority: resource.priority,
            enable_author_search: resource.enable_author_search,
            enable_book_search: resource.enable_book_search,
            enable_automatic_refresh: resource.enable_automatic_refresh,
            settings: resource.settings,
            tags: resource.tags,
            status: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProviderTestResponse {
    pub valid: bool,
    pub errors: Vec<ValidationFailure>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/providers
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<ProviderResource>> {
    let definitions = state.registry().all().map_err(registry_error)?;
    Ok(Json(definitions.into_iter().map(Into::into).collect()))
}

/// GET /api/v1/providers/{id}
pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<ProviderResource> {
    let definition = state.registry().get(id).map_err(registry_error)?;
    Ok(Json(definition.into()))
}

/// POST /api/v1/providers
pub async fn create_provider(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProviderResource>,
) -> Result<(StatusCode, Json<ProviderResource>), ApiError> {
    let created = state
        .registry()
        .create(body.into())
        .map_err(registry_error)?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// PUT /api/v1/providers/{id}
///
/// The id in the path wins over any id in the body.
pub async fn update_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ProviderResource>,
) -> ApiResult<ProviderResource> {
    let mut definition = ProviderDefinition::from(body);
    definition.id = id;
    let updated = state.registry().update(definition).map_err(registry_error)?;
    Ok(Json(updated.into()))
}

/// DELETE /api/v1/providers/{id}
pub async fn delete_provider(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.registry().delete(id).map_err(registry_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/providers/test
///
/// Test a definition without saving it. Failures come back as 400 with the
/// check error as the message.
pub async fn test_provider(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProviderResource>,
) -> ApiResult<ProviderTestResponse> {
    let result = state.registry().test(&body.into()).await;
    if !result.is_valid() {
        return Err(api_error(StatusCode::BAD_REQUEST, result.to_string()));
    }
    Ok(Json(ProviderTestResponse {
        valid: true,
        errors: result.errors,
    }))
}

/// GET /api/v1/providers/schema
pub async fn provider_schema(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderTemplate>> {
    Json(state.registry().schema())
}

/// GET /api/v1/providers/status
pub async fn provider_status(State(state): State<Arc<AppState>>) -> Json<Vec<ProviderStatus>> {
    Json(state.status_tracker().all())
}
