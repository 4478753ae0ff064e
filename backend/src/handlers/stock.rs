//! Stock ledger handlers

use axum::{
    extract::{Path, Query, State},
    response::Response,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared::{Action, DateRange, Resource};
use uuid::Uuid;

use super::{export, ExportFormat};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::stock::{ProductLedger, ReconcileReport};
use crate::services::StockService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    pub product_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub format: ExportFormat,
}

impl StockQuery {
    fn range(&self) -> Result<DateRange, AppError> {
        let range = DateRange::from_bounds(self.from, self.to);
        if range.is_valid() {
            Ok(range)
        } else {
            Err(AppError::validation("from", "Start date is after end date"))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileQuery {
    #[serde(default)]
    pub repair: bool,
}

/// Movements of one product with running balance
pub async fn product_ledger(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    Query(query): Query<StockQuery>,
) -> Result<Json<ProductLedger>, AppError> {
    user.require(Resource::Stock, Action::View)?;
    let service = StockService::new(state.db);
    let ledger = service
        .product_ledger(user.business_id, product_id, query.range()?)
        .await?;
    Ok(Json(ledger))
}

/// Opening, in, out and closing per product
pub async fn stock_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<StockQuery>,
) -> Result<Response, AppError> {
    user.require(Resource::Stock, Action::View)?;
    if query.format == ExportFormat::Csv {
        user.require(Resource::Stock, Action::Export)?;
    }
    let service = StockService::new(state.db);
    let rows = service.summary(user.business_id, query.range()?).await?;
    export(query.format, "stock_summary", rows)
}

/// Opening, in, out and closing per batch
pub async fn batch_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<StockQuery>,
) -> Result<Response, AppError> {
    user.require(Resource::Stock, Action::View)?;
    if query.format == ExportFormat::Csv {
        user.require(Resource::Stock, Action::Export)?;
    }
    let service = StockService::new(state.db);
    let rows = service
        .batch_summary(user.business_id, query.product_id, query.range()?)
        .await?;
    export(query.format, "batch_summary", rows)
}

/// Compare stored stock counters with the ledger, optionally rewriting them
pub async fn reconcile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<ReconcileReport>, AppError> {
    user.require(Resource::Stock, Action::Edit)?;
    let service = StockService::new(state.db);
    let report = service.reconcile(user.business_id, query.repair).await?;
    Ok(Json(report))
}
