use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::error::AppError;
use crate::metadata::{MetadataError, NewTenant, TenantRecord};
use crate::state::SharedState;
use crate::tenant::TenantState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct TenantResponse {
    #[serde(flatten)]
    pub record: TenantRecord,
    /// Registry state; absent when the tenant is not loaded.
    pub state: Option<TenantState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

fn describe(state: &SharedState, record: TenantRecord) -> TenantResponse {
    let registry_state = state.registry.state(&record.name);
    let last_error = state
        .registry
        .last_error(&record.name)
        .map(|e| e.to_string());
    TenantResponse {
        record,
        state: registry_state,
        last_error,
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/tenants
pub async fn list_tenants(
    State(state): State<SharedState>,
) -> Result<Json<Vec<TenantResponse>>, AppError> {
    let records = state.store.list()?;
    Ok(Json(
        records.into_iter().map(|r| describe(&state, r)).collect(),
    ))
}

/// GET /api/tenants/pinned
pub async fn list_pinned(
    State(state): State<SharedState>,
) -> Result<Json<Vec<TenantResponse>>, AppError> {
    let records = state.store.list_pinned()?;
    Ok(Json(
        records.into_iter().map(|r| describe(&state, r)).collect(),
    ))
}

/// POST /api/tenants
///
/// Returns once the created handlers have run, so in strict mode the tenant
/// is Ready by the time the response is sent.
pub async fn create_tenant(
    State(state): State<SharedState>,
    Json(body): Json<NewTenant>,
) -> Result<(StatusCode, Json<TenantResponse>), AppError> {
    let record = state.store.create(body).await?;
    tracing::info!("tenant {} created ({:?})", record.name, record.status);
    Ok((StatusCode::CREATED, Json(describe(&state, record))))
}

/// GET /api/tenants/{name}
pub async fn get_tenant(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<TenantResponse>, AppError> {
    let record = state
        .store
        .find_by_name(&name)?
        .ok_or(MetadataError::NotFound(name))?;
    Ok(Json(describe(&state, record)))
}

/// DELETE /api/tenants/{name}
pub async fn delete_tenant(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.destroy(&name).await?;
    tracing::info!("tenant {} destroyed", name);
    Ok(StatusCode::NO_CONTENT)
}
