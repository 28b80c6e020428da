//! Authentication service: password hashing, JWT sessions, login, and user management.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::user::{CreateUser, User};
use crate::services::session::SessionStore;

/// Maximum failed login attempts before account lockout.
const MAX_FAILED_ATTEMPTS: i32 = 3;

/// Lockout duration in minutes after exceeding max failed attempts.
const LOCKOUT_DURATION_MINUTES: i64 = 30;

/// JWT claims embedded in access and refresh tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub user_id: String,
    pub role: String,
    pub token_type: String,
    /// Unique token id, the key used for revocation on logout.
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

/// Token pair returned on successful login.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Hash a plaintext password with argon2id.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))
}

/// Verify a plaintext password against a stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| AppError::Internal(format!("Invalid hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Generate a JWT token pair (access + refresh).
pub fn generate_tokens(
    user: &User,
    jwt_secret: &str,
    access_expiry_secs: i64,
    refresh_expiry_secs: i64,
) -> Result<TokenPair, AppError> {
    let now = Utc::now();
    let encoding_key = EncodingKey::from_secret(jwt_secret.as_bytes());

    let access_claims = Claims {
        sub: user.username.clone(),
        user_id: user.id.to_string(),
        role: serde_json::to_string(&user.role)
            .unwrap_or_default()
            .trim_matches('"')
            .to_string(),
        token_type: "access".to_string(),
        jti: Uuid::new_v4().to_string(),
        exp: (now + Duration::seconds(access_expiry_secs)).timestamp(),
        iat: now.timestamp(),
    };

    let refresh_claims = Claims {
        sub: user.username.clone(),
        user_id: user.id.to_string(),
        role: access_claims.role.clone(),
        token_type: "refresh".to_string(),
        jti: Uuid::new_v4().to_string(),
        exp: (now + Duration::seconds(refresh_expiry_secs)).timestamp(),
        iat: now.timestamp(),
    };

    let access_token = jsonwebtoken::encode(&Header::default(), &access_claims, &encoding_key)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {e}")))?;

    let refresh_token = jsonwebtoken::encode(&Header::default(), &refresh_claims, &encoding_key)
        .map_err(|e| AppError::Internal(format!("Token generation failed: {e}")))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: access_expiry_secs,
    })
}

/// Validate a JWT signature and expiry, returning the claims.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<Claims, AppError> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let validation = Validation::default();

    jsonwebtoken::decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized)
}

/// Create a new user with hashed password.
pub async fn create_user(pool: &PgPool, input: &CreateUser) -> Result<User, AppError> {
    input.validate()?;
    let password_hash = hash_password(&input.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, email, password_hash, display_name, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(&input.username)
    .bind(&input.email)
    .bind(&password_hash)
    .bind(&input.display_name)
    .bind(&input.role)
    .fetch_one(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict("Username or email already exists".to_string())
        }
        _ => AppError::Database(e),
    })?;

    tracing::info!(user_id = %user.id, username = %user.username, "User created");
    Ok(user)
}

/// Authenticate a user by username and password, returning a token pair.
pub async fn login(
    pool: &PgPool,
    username: &str,
    password: &str,
    jwt_secret: &str,
    access_expiry_secs: i64,
    refresh_expiry_secs: i64,
) -> Result<TokenPair, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    // Check account lockout
    if let Some(locked_until) = user.locked_until {
        if locked_until > Utc::now() {
            return Err(AppError::Unauthorized);
        }
    }

    if !user.is_active {
        return Err(AppError::Unauthorized);
    }

    if !verify_password(password, &user.password_hash)? {
        let new_attempts = user.failed_login_attempts + 1;
        if new_attempts >= MAX_FAILED_ATTEMPTS {
            let lock_until = Utc::now() + Duration::minutes(LOCKOUT_DURATION_MINUTES);
            sqlx::query(
                "UPDATE users SET failed_login_attempts = $1, locked_until = $2 WHERE id = $3",
            )
            .bind(new_attempts)
            .bind(lock_until)
            .bind(user.id)
            .execute(pool)
            .await?;
            tracing::warn!(username = %user.username, "Account locked after failed logins");
        } else {
            sqlx::query("UPDATE users SET failed_login_attempts = $1 WHERE id = $2")
                .bind(new_attempts)
                .bind(user.id)
                .execute(pool)
                .await?;
        }
        return Err(AppError::Unauthorized);
    }

    sqlx::query(
        r#"
        UPDATE users
        SET failed_login_attempts = 0, locked_until = NULL, last_login = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user.id)
    .execute(pool)
    .await?;

    generate_tokens(&user, jwt_secret, access_expiry_secs, refresh_expiry_secs)
}

/// Exchange a valid refresh token for a new pair; the old refresh token is revoked.
pub async fn refresh_token(
    pool: &PgPool,
    sessions: &SessionStore,
    refresh_token_str: &str,
    jwt_secret: &str,
    access_expiry_secs: i64,
    refresh_expiry_secs: i64,
) -> Result<TokenPair, AppError> {
    let claims = validate_token(refresh_token_str, jwt_secret)?;

    if claims.token_type != "refresh" || sessions.is_revoked(&claims.jti).await? {
        return Err(AppError::Unauthorized);
    }

    let user_id: Uuid = claims
        .user_id
        .parse()
        .map_err(|_| AppError::Unauthorized)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active = true")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    sessions.revoke(&claims.jti, claims.exp).await?;
    generate_tokens(&user, jwt_secret, access_expiry_secs, refresh_expiry_secs)
}

/// Revoke the access token and, when supplied, the matching refresh token.
///
/// Invalid or expired refresh tokens are ignored: there is nothing to revoke.
pub async fn logout(
    sessions: &SessionStore,
    access_jti: &str,
    access_exp: i64,
    refresh_token_str: Option<&str>,
    jwt_secret: &str,
) -> Result<(), AppError> {
    sessions.revoke(access_jti, access_exp).await?;
    if let Some(claims) = refresh_token_str.and_then(|t| validate_token(t, jwt_secret).ok()) {
        if claims.token_type == "refresh" {
            sessions.revoke(&claims.jti, claims.exp).await?;
        }
    }
    Ok(())
}

/// Find a user by ID.
pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<User, AppError> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// List all users ordered by display name.
pub async fn list_users(pool: &PgPool) -> Result<Vec<User>, AppError> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY display_name ASC")
        .fetch_all(pool)
        .await?;
    Ok(users)
}

/// Point a user at a newly stored signature image, returning the replaced path.
pub async fn set_signature(
    pool: &PgPool,
    user_id: Uuid,
    signature_path: &str,
) -> Result<(User, Option<String>), AppError> {
    let previous = sqlx::query_scalar::<_, Option<String>>(
        "SELECT signature_path FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET signature_path = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(signature_path)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok((user, previous))
}
