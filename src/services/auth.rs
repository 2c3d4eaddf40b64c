use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use rand_core::OsRng;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Session, User};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Failed to parse password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Create a new user. Names are unique; duplicates are a conflict.
pub async fn create_user(
    pool: &SqlitePool,
    name: &str,
    password: &str,
    is_admin: bool,
) -> AppResult<User> {
    let name = name.trim();
    if name.len() < 2 {
        return Err(AppError::validation("Username must be at least 2 characters"));
    }
    if password.len() < 8 {
        return Err(AppError::validation("Password must be at least 8 characters"));
    }

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Err(AppError::conflict("Username already taken"));
    }

    let id = Uuid::new_v4().to_string();
    let password_hash = hash_password(password)?;

    sqlx::query("INSERT INTO users (id, name, password_hash, is_admin) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(name)
        .bind(&password_hash)
        .bind(is_admin)
        .execute(pool)
        .await?;

    Ok(User {
        id,
        name: name.to_string(),
        password_hash,
        is_admin,
        created_at: Utc::now().to_rfc3339(),
    })
}

/// Authenticate user and create a session with the configured TTL
pub async fn authenticate(
    pool: &SqlitePool,
    username: &str,
    password: &str,
    session_ttl_hours: i64,
) -> AppResult<(User, Session)> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE name = ?")
        .bind(username.trim())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid username or password"))?;

    if !verify_password(password, &user.password_hash)? {
        return Err(AppError::unauthorized("Invalid username or password"));
    }

    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires_at = (now + Duration::hours(session_ttl_hours)).to_rfc3339();

    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
        .bind(&token)
        .bind(&user.id)
        .bind(&expires_at)
        .execute(pool)
        .await?;

    let session = Session {
        token,
        user_id: user.id.clone(),
        created_at: now.to_rfc3339(),
        expires_at,
    };

    Ok((user, session))
}

/// Validate session token and get user. Expired sessions are treated as
/// missing; the sweeper deletes them later.
pub async fn validate_session(pool: &SqlitePool, token: &str) -> AppResult<User> {
    let session: Session = sqlx::query_as("SELECT * FROM sessions WHERE token = ?")
        .bind(token)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid session"))?;

    let expires = DateTime::parse_from_rfc3339(&session.expires_at)
        .map_err(|e| AppError::Internal(format!("Bad session expiry: {}", e)))?;
    if expires < Utc::now() {
        return Err(AppError::unauthorized("Session expired"));
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&session.user_id)
        .fetch_one(pool)
        .await?;

    Ok(user)
}

/// Delete a session token (logout). Unknown tokens are a no-op.
pub async fn logout(pool: &SqlitePool, token: &str) -> AppResult<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove sessions past their expiry. Returns the number removed.
pub async fn cleanup_expired_sessions(pool: &SqlitePool) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_register_login_and_session() {
        let pool = db::test_pool().await;

        let user = create_user(&pool, "kestrel", "password123", false)
            .await
            .unwrap();
        assert!(!user.is_admin);

        // Duplicate name is a conflict
        let err = create_user(&pool, "kestrel", "password123", false)
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);

        let (_, session) = authenticate(&pool, "kestrel", "password123", 720)
            .await
            .unwrap();
        let validated = validate_session(&pool, &session.token).await.unwrap();
        assert_eq!(validated.id, user.id);

        logout(&pool, &session.token).await.unwrap();
        assert!(validate_session(&pool, &session.token).await.is_err());
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let pool = db::test_pool().await;
        create_user(&pool, "mira", "password123", false)
            .await
            .unwrap();

        let err = authenticate(&pool, "mira", "nope-nope", 720)
            .await
            .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_session_rejected_and_swept() {
        let pool = db::test_pool().await;
        let user = create_user(&pool, "rin", "password123", false)
            .await
            .unwrap();

        let expired = (Utc::now() - Duration::hours(1)).to_rfc3339();
        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind("stale-token")
            .bind(&user.id)
            .bind(&expired)
            .execute(&pool)
            .await
            .unwrap();

        let err = validate_session(&pool, "stale-token").await.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);

        let removed = cleanup_expired_sessions(&pool).await.unwrap();
        assert_eq!(removed, 1);
    }
}
