//! HTTP request handlers

pub mod account;
pub mod auth;
pub mod batch;
pub mod health;
pub mod product;
pub mod receipt;
pub mod report;
pub mod staff;
pub mod stock;
pub mod voucher;

use axum::{
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::services::ReportService;

/// Output format selected with `?format=`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Render rows as JSON or as a CSV attachment
pub(crate) fn export<T: Serialize>(format: ExportFormat, filename: &str, rows: Vec<T>) -> AppResult<Response> {
    match format {
        ExportFormat::Json => Ok(Json(rows).into_response()),
        ExportFormat::Csv => {
            let csv = ReportService::export_to_csv(&rows)?;
            let disposition = format!("attachment; filename=\"{}.csv\"", filename);
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                csv,
            )
                .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[derive(Serialize)]
    struct Row {
        code: &'static str,
        qty: i32,
    }

    #[test]
    fn csv_export_sets_attachment_headers() {
        let rows = vec![Row { code: "P001", qty: 4 }];
        let response = export(ExportFormat::Csv, "stock", rows).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"stock.csv\""
        );
    }

    #[test]
    fn json_is_the_default_format() {
        assert_eq!(ExportFormat::default(), ExportFormat::Json);
        let response = export(ExportFormat::Json, "stock", vec![Row { code: "P001", qty: 1 }]).unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
