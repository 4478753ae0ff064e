//! Receipt and payment handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Action, PaginatedResponse, Resource};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::receipt::{CreateReceiptInput, Receipt, ReceiptDetail, ReceiptFilter};
use crate::services::ReceiptService;
use crate::AppState;

pub async fn list_receipts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<ReceiptFilter>,
) -> Result<Json<PaginatedResponse<Receipt>>, AppError> {
    user.require(Resource::Receipt, Action::View)?;
    let service = ReceiptService::new(state.db, &state.config);
    Ok(Json(service.list(user.business_id, filter).await?))
}

pub async fn get_receipt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(receipt_id): Path<Uuid>,
) -> Result<Json<ReceiptDetail>, AppError> {
    user.require(Resource::Receipt, Action::View)?;
    let service = ReceiptService::new(state.db, &state.config);
    Ok(Json(service.get(user.business_id, receipt_id).await?))
}

/// Record money in or out and apply it oldest voucher first
pub async fn create_receipt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateReceiptInput>,
) -> Result<(StatusCode, Json<ReceiptDetail>), AppError> {
    user.require(Resource::Receipt, Action::Create)?;
    let service = ReceiptService::new(state.db, &state.config);
    let receipt = service.create(user.business_id, user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn delete_receipt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(receipt_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Receipt, Action::Delete)?;
    let service = ReceiptService::new(state.db, &state.config);
    service.delete(user.business_id, receipt_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
