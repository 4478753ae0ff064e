//! Batch handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use shared::{Action, Batch, Resource};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::batch::{BatchFilter, CreateBatchInput, UpdateBatchInput};
use crate::services::BatchService;
use crate::AppState;

/// Query parameters for expiring batches
#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    #[serde(default = "default_expiry_days")]
    pub days: i64,
}

fn default_expiry_days() -> i64 {
    30
}

pub async fn list_batches(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<BatchFilter>,
) -> Result<Json<Vec<Batch>>, AppError> {
    user.require(Resource::Batch, Action::View)?;
    let service = BatchService::new(state.db, &state.config);
    Ok(Json(service.list(user.business_id, filter).await?))
}

pub async fn get_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<Batch>, AppError> {
    user.require(Resource::Batch, Action::View)?;
    let service = BatchService::new(state.db, &state.config);
    Ok(Json(service.get(user.business_id, batch_id).await?))
}

pub async fn create_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateBatchInput>,
) -> Result<(StatusCode, Json<Batch>), AppError> {
    user.require(Resource::Batch, Action::Create)?;
    let service = BatchService::new(state.db, &state.config);
    let batch = service.create(user.business_id, user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

pub async fn update_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<UpdateBatchInput>,
) -> Result<Json<Batch>, AppError> {
    user.require(Resource::Batch, Action::Edit)?;
    let service = BatchService::new(state.db, &state.config);
    Ok(Json(service.update(user.business_id, batch_id, input).await?))
}

pub async fn delete_batch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(batch_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Batch, Action::Delete)?;
    let service = BatchService::new(state.db, &state.config);
    service.delete(user.business_id, batch_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Batches with stock expiring within `days`
pub async fn expiring_batches(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<Vec<Batch>>, AppError> {
    user.require(Resource::Batch, Action::View)?;
    if query.days < 0 {
        return Err(AppError::validation("days", "Days cannot be negative"));
    }
    let service = BatchService::new(state.db, &state.config);
    let today = Utc::now().date_naive();
    Ok(Json(service.expiring(user.business_id, query.days, today).await?))
}
