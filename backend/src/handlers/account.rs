//! Customer and supplier account handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared::{Account, AccountStatement, Action, Resource};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::account::{AccountFilter, CreateAccountInput, UpdateAccountInput};
use crate::services::AccountService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatementQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn list_accounts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<AccountFilter>,
) -> Result<Json<Vec<Account>>, AppError> {
    user.require(Resource::Account, Action::View)?;
    let service = AccountService::new(state.db);
    Ok(Json(service.list(user.business_id, filter).await?))
}

pub async fn get_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Account>, AppError> {
    user.require(Resource::Account, Action::View)?;
    let service = AccountService::new(state.db);
    Ok(Json(service.get(user.business_id, account_id).await?))
}

pub async fn create_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateAccountInput>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    user.require(Resource::Account, Action::Create)?;
    let service = AccountService::new(state.db);
    let account = service.create(user.business_id, input).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn update_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(account_id): Path<Uuid>,
    Json(input): Json<UpdateAccountInput>,
) -> Result<Json<Account>, AppError> {
    user.require(Resource::Account, Action::Edit)?;
    let service = AccountService::new(state.db);
    Ok(Json(service.update(user.business_id, account_id, input).await?))
}

pub async fn delete_account(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(account_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Account, Action::Delete)?;
    let service = AccountService::new(state.db);
    service.delete(user.business_id, account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ledger statement with running balance
pub async fn account_statement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(account_id): Path<Uuid>,
    Query(query): Query<StatementQuery>,
) -> Result<Json<AccountStatement>, AppError> {
    user.require(Resource::Account, Action::View)?;
    let service = AccountService::new(state.db);
    let statement = service
        .statement(user.business_id, account_id, query.from, query.to)
        .await?;
    Ok(Json(statement))
}
