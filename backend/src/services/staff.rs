//! Staff account management
//!
//! A business always keeps at least one active owner.

use bcrypt::{hash, DEFAULT_COST};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{StaffRole, User};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::auth::{parse_role, AuthService};

/// Staff service
#[derive(Clone)]
pub struct StaffService {
    db: PgPool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStaffInput {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub phone: Option<String>,
    pub role: StaffRole,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateStaffInput {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    pub role: Option<StaffRole>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordInput {
    pub password: String,
}

/// Who is acting on a staff record
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: StaffRole,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    business_id: Uuid,
    email: String,
    name: String,
    phone: Option<String>,
    role: String,
    is_active: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            business_id: row.business_id,
            email: row.email,
            name: row.name,
            phone: row.phone,
            role: parse_role(&row.role)?,
            is_active: row.is_active,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const USER_COLUMNS: &str = r#"
    id, business_id, email, name, phone, role, is_active, last_login_at, created_at, updated_at
"#;

/// Only owners may grant or touch the owner role
fn check_role_grant(actor: Actor, role: StaffRole) -> AppResult<()> {
    if role == StaffRole::Owner && actor.role != StaffRole::Owner {
        return Err(AppError::InsufficientPermissions);
    }
    Ok(())
}

/// Whether a change takes an active owner out of the owner set
fn removes_owner(current_role: StaffRole, current_active: bool, role: StaffRole, active: bool) -> bool {
    current_role == StaffRole::Owner && current_active && (role != StaffRole::Owner || !active)
}

impl StaffService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list(&self, business_id: Uuid) -> AppResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE business_id = $1 ORDER BY name",
            USER_COLUMNS
        ))
        .bind(business_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(User::try_from).collect()
    }

    pub async fn get(&self, business_id: Uuid, user_id: Uuid) -> AppResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1 AND business_id = $2",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(business_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Staff member".to_string()))?;

        row.try_into()
    }

    pub async fn create(&self, business_id: Uuid, actor: Actor, input: CreateStaffInput) -> AppResult<User> {
        input.validate()?;
        shared::validate_password(&input.password).map_err(|m| AppError::validation("password", m))?;
        if let Some(phone) = &input.phone {
            shared::validate_phone(phone).map_err(|m| AppError::validation("phone", m))?;
        }
        check_role_grant(actor, input.role)?;

        let password_hash = hash(&input.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (business_id, role, email, password_hash, name, phone)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(business_id)
        .bind(input.role.as_str())
        .bind(&input.email)
        .bind(&password_hash)
        .bind(input.name.trim())
        .bind(&input.phone)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(%business_id, user_id = %row.id, "Added {} {}", input.role.as_str(), input.email);
        row.try_into()
    }

    pub async fn update(
        &self,
        business_id: Uuid,
        actor: Actor,
        user_id: Uuid,
        input: UpdateStaffInput,
    ) -> AppResult<User> {
        input.validate()?;
        if let Some(phone) = &input.phone {
            shared::validate_phone(phone).map_err(|m| AppError::validation("phone", m))?;
        }

        let mut tx = self.db.begin().await?;

        let current: User = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1 AND business_id = $2 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(business_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Staff member".to_string()))?
        .try_into()?;

        let role = input.role.unwrap_or(current.role);
        let is_active = input.is_active.unwrap_or(current.is_active);

        if current.role != role || current.role == StaffRole::Owner {
            check_role_grant(actor, current.role)?;
            check_role_grant(actor, role)?;
        }

        if removes_owner(current.role, current.is_active, role, is_active) {
            ensure_other_owner(&mut tx, business_id, user_id).await?;
        }

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($3, name),
                phone = COALESCE($4, phone),
                role = $5,
                is_active = $6,
                updated_at = NOW()
            WHERE id = $1 AND business_id = $2
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(business_id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(&input.phone)
        .bind(role.as_str())
        .bind(is_active)
        .fetch_one(&mut *tx)
        .await?;

        if !is_active || role != current.role {
            // Existing tokens still carry the old role
            AuthService::revoke_all(&mut *tx, user_id).await?;
        }

        tx.commit().await?;

        tracing::info!(%business_id, %user_id, role = role.as_str(), is_active, "Updated staff member");
        row.try_into()
    }

    /// Set a new password and end every session of the user
    pub async fn reset_password(
        &self,
        business_id: Uuid,
        actor: Actor,
        user_id: Uuid,
        input: ResetPasswordInput,
    ) -> AppResult<()> {
        shared::validate_password(&input.password).map_err(|m| AppError::validation("password", m))?;

        let target = self.get(business_id, user_id).await?;
        if target.id != actor.user_id {
            check_role_grant(actor, target.role)?;
        }

        let password_hash = hash(&input.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let mut tx = self.db.begin().await?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(&password_hash)
            .execute(&mut *tx)
            .await?;
        AuthService::revoke_all(&mut *tx, user_id).await?;
        tx.commit().await?;

        tracing::info!(%business_id, %user_id, "Password reset");
        Ok(())
    }

    pub async fn delete(&self, business_id: Uuid, actor: Actor, user_id: Uuid) -> AppResult<()> {
        if actor.user_id == user_id {
            return Err(AppError::conflict("staff", "You cannot delete your own account"));
        }

        let mut tx = self.db.begin().await?;

        let current: User = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1 AND business_id = $2 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(business_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Staff member".to_string()))?
        .try_into()?;

        check_role_grant(actor, current.role)?;
        if removes_owner(current.role, current.is_active, StaffRole::Owner, false) {
            ensure_other_owner(&mut tx, business_id, user_id).await?;
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%business_id, %user_id, "Deleted staff member");
        Ok(())
    }
}

/// Fail unless another active owner exists; owner rows stay locked until commit
async fn ensure_other_owner(conn: &mut PgConnection, business_id: Uuid, user_id: Uuid) -> AppResult<()> {
    let owners = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT id FROM users
        WHERE business_id = $1 AND role = 'owner' AND is_active = true
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(business_id)
    .fetch_all(conn)
    .await?;

    if owners.iter().all(|id| *id == user_id) {
        tracing::warn!(%business_id, %user_id, "Refused to remove the last owner");
        return Err(AppError::conflict("staff", "A business must keep at least one active owner"));
    }
    Ok(())
}
