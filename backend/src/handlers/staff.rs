//! Staff management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::{Action, Resource, User};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{AuthUser, CurrentUser};
use crate::services::staff::{Actor, CreateStaffInput, ResetPasswordInput, UpdateStaffInput};
use crate::services::StaffService;
use crate::AppState;

fn actor(user: &AuthUser) -> Actor {
    Actor {
        user_id: user.user_id,
        role: user.role,
    }
}

pub async fn list_staff(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<User>>, AppError> {
    user.require(Resource::Staff, Action::View)?;
    let service = StaffService::new(state.db);
    Ok(Json(service.list(user.business_id).await?))
}

pub async fn get_staff(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    user.require(Resource::Staff, Action::View)?;
    let service = StaffService::new(state.db);
    Ok(Json(service.get(user.business_id, user_id).await?))
}

pub async fn create_staff(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateStaffInput>,
) -> Result<(StatusCode, Json<User>), AppError> {
    user.require(Resource::Staff, Action::Create)?;
    let service = StaffService::new(state.db);
    let staff = service.create(user.business_id, actor(&user), input).await?;
    Ok((StatusCode::CREATED, Json(staff)))
}

pub async fn update_staff(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateStaffInput>,
) -> Result<Json<User>, AppError> {
    user.require(Resource::Staff, Action::Edit)?;
    let service = StaffService::new(state.db);
    Ok(Json(service.update(user.business_id, actor(&user), user_id, input).await?))
}

pub async fn reset_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<ResetPasswordInput>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Staff, Action::Edit)?;
    let service = StaffService::new(state.db);
    service.reset_password(user.business_id, actor(&user), user_id, input).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_staff(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    user.require(Resource::Staff, Action::Delete)?;
    let service = StaffService::new(state.db);
    service.delete(user.business_id, actor(&user), user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
