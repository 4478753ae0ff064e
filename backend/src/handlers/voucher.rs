//! Voucher (invoice, purchase, note, stock) handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{Action, PaginatedResponse, Resource, VoucherType};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::voucher::{
    CreateVoucherInput, UpdateVoucherInput, Voucher, VoucherDetail, VoucherFilter,
};
use crate::services::VoucherService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NextNumberQuery {
    #[serde(rename = "type")]
    pub voucher_type: VoucherType,
}

#[derive(Debug, Serialize)]
pub struct NextNumberResponse {
    pub voucher_type: VoucherType,
    pub number: String,
}

pub async fn list_vouchers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<VoucherFilter>,
) -> Result<Json<PaginatedResponse<Voucher>>, AppError> {
    user.require(Resource::Voucher, Action::View)?;
    let service = VoucherService::new(state.db, &state.config);
    Ok(Json(service.list(user.business_id, filter).await?))
}

pub async fn get_voucher(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(voucher_id): Path<Uuid>,
) -> Result<Json<VoucherDetail>, AppError> {
    user.require(Resource::Voucher, Action::View)?;
    let service = VoucherService::new(state.db, &state.config);
    Ok(Json(service.get(user.business_id, voucher_id).await?))
}

pub async fn create_voucher(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateVoucherInput>,
) -> Result<(StatusCode, Json<VoucherDetail>), AppError> {
    user.require(Resource::Voucher, Action::Create)?;
    let service = VoucherService::new(state.db, &state.config);
    let voucher = service.create(user.business_id, user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(voucher)))
}

pub async fn update_voucher(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(voucher_id): Path<Uuid>,
    Json(input): Json<UpdateVoucherInput>,
) -> Result<Json<VoucherDetail>, AppError> {
    user.require(Resource::Voucher, Action::Edit)?;
    let service = VoucherService::new(state.db, &state.config);
    Ok(Json(service.update(user.business_id, voucher_id, input).await?))
}

pub async fn delete_voucher(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(voucher_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Voucher, Action::Delete)?;
    let service = VoucherService::new(state.db, &state.config);
    service.delete(user.business_id, voucher_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Preview the number the next voucher of a type would get
pub async fn next_number(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<NextNumberQuery>,
) -> Result<Json<NextNumberResponse>, AppError> {
    user.require(Resource::Voucher, Action::Create)?;
    let service = VoucherService::new(state.db, &state.config);
    let number = service.next_number(user.business_id, query.voucher_type).await?;
    Ok(Json(NextNumberResponse {
        voucher_type: query.voucher_type,
        number,
    }))
}
