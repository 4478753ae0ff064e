//! Product catalogue handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::{Action, Product, Resource};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::services::product::{CreateProductInput, ImportReport, ProductFilter, UpdateProductInput};
use crate::services::ProductService;
use crate::AppState;

pub async fn list_products(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<ProductFilter>,
) -> Result<Json<Vec<Product>>, AppError> {
    user.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db, &state.config);
    Ok(Json(service.list(user.business_id, filter).await?))
}

pub async fn get_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    user.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db, &state.config);
    Ok(Json(service.get(user.business_id, product_id).await?))
}

pub async fn create_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    user.require(Resource::Product, Action::Create)?;
    let service = ProductService::new(state.db, &state.config);
    let product = service.create(user.business_id, user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> Result<Json<Product>, AppError> {
    user.require(Resource::Product, Action::Edit)?;
    let service = ProductService::new(state.db, &state.config);
    Ok(Json(service.update(user.business_id, product_id, input).await?))
}

pub async fn delete_product(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Product, Action::Delete)?;
    let service = ProductService::new(state.db, &state.config);
    service.delete(user.business_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Products at or below their reorder level
pub async fn low_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Product>>, AppError> {
    user.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db, &state.config);
    Ok(Json(service.low_stock(user.business_id).await?))
}

/// Bulk create from a CSV request body
pub async fn import_products(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: String,
) -> Result<Json<ImportReport>, AppError> {
    user.require(Resource::Product, Action::Create)?;
    if body.trim().is_empty() {
        return Err(AppError::validation("body", "CSV body is empty"));
    }
    let service = ProductService::new(state.db, &state.config);
    Ok(Json(service.import_csv(user.business_id, user.user_id, &body).await?))
}
