//! Authentication service for business registration, login, and token management

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use shared::{permission_strings, Business, StaffRole};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
}

/// Input for registering a new business with its owner account
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterBusinessInput {
    #[validate(length(min = 1, max = 200, message = "Business name is required"))]
    pub business_name: String,
    /// Short code printed on documents (e.g. "MART")
    pub business_code: String,
    pub gstin: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 200, message = "Owner name is required"))]
    pub owner_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
}

/// Response after successful registration
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub business_id: Uuid,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub tokens: AuthTokens,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub business_id: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Profile of the signed-in user
#[derive(Debug, Serialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: StaffRole,
    pub permissions: Vec<String>,
    pub business: Business,
}

/// User info from database
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    business_id: Uuid,
    role: String,
    password_hash: String,
    is_active: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct BusinessRow {
    id: Uuid,
    name: String,
    business_code: String,
    gstin: Option<String>,
    address: Option<String>,
    phone: Option<String>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

/// Decode and validate an access token
pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

/// Parse a stored role name
pub(crate) fn parse_role(role: &str) -> AppResult<StaffRole> {
    StaffRole::from_str(role).ok_or_else(|| AppError::Internal(format!("Unknown staff role '{}'", role)))
}

impl AuthService {
    /// Create a new AuthService instance
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
        }
    }

    /// Register a new business with owner account
    pub async fn register_business(
        &self,
        input: RegisterBusinessInput,
    ) -> AppResult<RegisterResponse> {
        input.validate()?;

        shared::validate_business_code(&input.business_code)
            .map_err(|m| AppError::validation("business_code", m))?;
        shared::validate_password(&input.password)
            .map_err(|m| AppError::validation("password", m))?;
        if let Some(gstin) = &input.gstin {
            shared::validate_gstin(gstin).map_err(|m| AppError::validation("gstin", m))?;
        }

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM businesses WHERE business_code = $1",
        )
        .bind(&input.business_code)
        .fetch_one(&self.db)
        .await?;

        if existing > 0 {
            return Err(AppError::conflict("business", "Business code already exists"));
        }

        let email_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = lower($1))",
        )
        .bind(&input.email)
        .fetch_one(&self.db)
        .await?;

        if email_taken {
            return Err(AppError::DuplicateEntry("email".to_string()));
        }

        let password_hash = hash(&input.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

        let mut tx = self.db.begin().await?;

        let business_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO businesses (name, business_code, gstin, address, phone)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&input.business_name)
        .bind(&input.business_code)
        .bind(&input.gstin)
        .bind(&input.address)
        .bind(&input.phone)
        .fetch_one(&mut *tx)
        .await?;

        let user_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (business_id, role, email, password_hash, name, phone)
            VALUES ($1, 'owner', $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(business_id)
        .bind(&input.email)
        .bind(&password_hash)
        .bind(&input.owner_name)
        .bind(&input.phone)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%business_id, %user_id, "Registered business {}", input.business_code);

        let tokens = self.generate_tokens(user_id, business_id, StaffRole::Owner)?;
        self.store_refresh_token(user_id, &tokens.refresh_token).await?;

        Ok(RegisterResponse {
            business_id,
            user_id,
            tokens,
        })
    }

    /// Authenticate user with email and password
    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthTokens> {
        let user = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, business_id, role, password_hash, is_active
            FROM users
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        if !user.is_active {
            return Err(AppError::Unauthorized("Account is disabled".to_string()));
        }

        let valid = verify(password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;

        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let role = parse_role(&user.role)?;
        let tokens = self.generate_tokens(user.id, user.business_id, role)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        tracing::info!(user_id = %user.id, "User logged in");

        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair; the old one is revoked
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let token_hash = self.hash_token(refresh_token)?;

        let mut tx = self.db.begin().await?;

        let (user_id, business_id, role) = sqlx::query_as::<_, (Uuid, Uuid, String)>(
            r#"
            UPDATE refresh_tokens rt
            SET revoked_at = NOW()
            FROM users u
            WHERE u.id = rt.user_id
              AND rt.token_hash = $1
              AND rt.expires_at > NOW()
              AND rt.revoked_at IS NULL
              AND u.is_active = true
            RETURNING rt.user_id, u.business_id, u.role
            "#,
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::InvalidToken)?;

        let role = parse_role(&role)?;
        let tokens = self.generate_tokens(user_id, business_id, role)?;
        self.insert_refresh_token(&mut tx, user_id, &tokens.refresh_token).await?;

        tx.commit().await?;

        Ok(tokens)
    }

    /// Revoke a refresh token
    pub async fn logout(&self, user_id: Uuid, refresh_token: &str) -> AppResult<()> {
        let token_hash = self.hash_token(refresh_token)?;
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = NOW() WHERE token_hash = $1 AND user_id = $2 AND revoked_at IS NULL",
        )
        .bind(&token_hash)
        .bind(user_id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Revoke every refresh token of a user (deactivation, password reset)
    pub async fn revoke_all<'e, E>(executor: E, user_id: Uuid) -> AppResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query("UPDATE refresh_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL")
            .bind(user_id)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Profile of the signed-in user with their business
    pub async fn profile(&self, business_id: Uuid, user_id: Uuid) -> AppResult<Profile> {
        let (name, email, role) = sqlx::query_as::<_, (String, String, String)>(
            "SELECT name, email, role FROM users WHERE id = $1 AND business_id = $2",
        )
        .bind(user_id)
        .bind(business_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let business = sqlx::query_as::<_, BusinessRow>(
            r#"
            SELECT id, name, business_code, gstin, address, phone, created_at, updated_at
            FROM businesses WHERE id = $1
            "#,
        )
        .bind(business_id)
        .fetch_one(&self.db)
        .await?;

        let role = parse_role(&role)?;

        Ok(Profile {
            user_id,
            name,
            email,
            role,
            permissions: permission_strings(role),
            business: Business {
                id: business.id,
                name: business.name,
                business_code: business.business_code,
                gstin: business.gstin,
                address: business.address,
                phone: business.phone,
                created_at: business.created_at,
                updated_at: business.updated_at,
            },
        })
    }

    /// Generate access and refresh tokens
    pub(crate) fn generate_tokens(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        role: StaffRole,
    ) -> AppResult<AuthTokens> {
        let now = Utc::now();
        let access_exp = now + Duration::seconds(self.access_token_expiry);

        let access_claims = Claims {
            sub: user_id.to_string(),
            business_id: business_id.to_string(),
            role: role.as_str().to_string(),
            permissions: permission_strings(role),
            exp: access_exp.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access_claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))?;

        // Two v4 UUIDs give 244 random bits
        let refresh_token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let mut conn = self.db.acquire().await?;
        self.insert_refresh_token(&mut conn, user_id, token).await
    }

    async fn insert_refresh_token(
        &self,
        conn: &mut sqlx::PgConnection,
        user_id: Uuid,
        token: &str,
    ) -> AppResult<()> {
        let token_hash = self.hash_token(token)?;
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(expires_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Keyed digest of a refresh token for storage
    fn hash_token(&self, token: &str) -> AppResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.jwt_secret.as_bytes())
            .map_err(|e| AppError::Internal(format!("Token hashing failed: {}", e)))?;
        mac.update(token.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        let config = Config::for_tests();
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .expect("lazy pool");
        AuthService::new(pool, &config)
    }

    #[tokio::test]
    async fn test_access_token_round_trip() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let business_id = Uuid::new_v4();
        let tokens = svc.generate_tokens(user_id, business_id, StaffRole::Cashier).unwrap();

        let claims = decode_access_token(&tokens.access_token, "test-secret").unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.business_id, business_id.to_string());
        assert_eq!(claims.role, "cashier");
        assert!(claims.permissions.contains(&"voucher:create".to_string()));

        assert!(decode_access_token(&tokens.access_token, "other-secret").is_err());
    }

    #[tokio::test]
    async fn test_refresh_tokens_are_unique_and_hashed() {
        let svc = service();
        let a = svc.generate_tokens(Uuid::new_v4(), Uuid::new_v4(), StaffRole::Owner).unwrap();
        let b = svc.generate_tokens(Uuid::new_v4(), Uuid::new_v4(), StaffRole::Owner).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);

        let h1 = svc.hash_token(&a.refresh_token).unwrap();
        let h2 = svc.hash_token(&a.refresh_token).unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, a.refresh_token);
        assert_ne!(h1, svc.hash_token(&b.refresh_token).unwrap());
    }
}
