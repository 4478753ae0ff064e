//! Reporting handlers for outstanding balances and the day book

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use shared::{Action, DateRange, ReceiptKind, Resource};
use uuid::Uuid;

use super::{export, ExportFormat};
use crate::error::AppError;
use crate::middleware::{AuthUser, CurrentUser};
use crate::services::{ReceiptService, ReportService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct OutstandingQuery {
    pub kind: ReceiptKind,
    pub account_id: Option<Uuid>,
    pub as_of: Option<NaiveDate>,
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Debug, Deserialize)]
pub struct DayBookQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub format: ExportFormat,
}

fn check_report_access(user: &AuthUser, format: ExportFormat) -> Result<(), AppError> {
    user.require(Resource::Report, Action::View)?;
    if format == ExportFormat::Csv {
        user.require(Resource::Report, Action::Export)?;
    }
    Ok(())
}

/// Unpaid sales (`kind=receipt`) or purchases (`kind=payment`) with age in days
pub async fn outstanding(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<OutstandingQuery>,
) -> Result<Response, AppError> {
    check_report_access(&user, query.format)?;
    let service = ReceiptService::new(state.db, &state.config);
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let rows = service
        .outstanding(user.business_id, query.kind, query.account_id, as_of)
        .await?;
    let filename = format!("outstanding_{}", query.kind.as_str());
    export(query.format, &filename, rows)
}

/// Every voucher and receipt in a window, with totals per document type
///
/// `to` defaults to today and `from` to `to`.
pub async fn day_book(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DayBookQuery>,
) -> Result<Response, AppError> {
    check_report_access(&user, query.format)?;
    let to = query.to.unwrap_or_else(|| Utc::now().date_naive());
    let range = DateRange::from_bounds(Some(query.from.unwrap_or(to)), Some(to));

    let service = ReportService::new(state.db);
    let book = service.day_book(user.business_id, range).await?;
    match query.format {
        ExportFormat::Json => Ok(Json(book).into_response()),
        ExportFormat::Csv => export(query.format, "day_book", book.entries),
    }
}
