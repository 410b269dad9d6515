//! User directory.
//!
//! Identities originate in LDAP and are mirrored into the `users` table by the sync
//! microservice. Logins are checked against the mirrored Argon2 password hashes.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Database;
use crate::error::AppResult;
use crate::session::Principal;

/// Directory-derived profile of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub login: String,
    pub display_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Returns the principal when the login exists and the password matches.
    async fn authenticate(&self, login: &str, password: &str) -> AppResult<Option<Principal>>;
    async fn profile(&self, login: &str) -> AppResult<Option<UserProfile>>;
}

/// Hashes a password in PHC format (Argon2id, random salt).
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// `Ok(false)` on mismatch, `Err` when the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, argon2::password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Directory backed by the mirrored `users` table.
#[derive(Clone)]
pub struct PgDirectory {
    db: Database,
}

#[derive(sqlx::FromRow)]
struct Credentials {
    id: Uuid,
    login: String,
    display_name: String,
    is_admin: bool,
    password_hash: Option<String>,
}

impl PgDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn authenticate(&self, login: &str, password: &str) -> AppResult<Option<Principal>> {
        let row: Option<Credentials> = sqlx::query_as(
            "SELECT id, login, display_name, is_admin, password_hash FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(self.db.reader())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let Some(hash) = row.password_hash else {
            tracing::debug!("User {} has no password hash mirrored yet", row.login);
            return Ok(None);
        };

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| anyhow::anyhow!("password verification task failed: {}", e))?;

        match matches {
            Ok(true) => Ok(Some(Principal {
                id: row.id,
                login: row.login,
                display_name: row.display_name,
                is_admin: row.is_admin,
            })),
            Ok(false) => Ok(None),
            Err(e) => {
                tracing::warn!("Stored password hash for {} is unusable: {}", row.login, e);
                Ok(None)
            }
        }
    }

    async fn profile(&self, login: &str) -> AppResult<Option<UserProfile>> {
        let profile = sqlx::query_as::<_, UserProfile>(
            "SELECT id, login, display_name, email, department, title, gender, phone, is_admin, synced_at \
             FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(self.db.reader())
        .await?;
        Ok(profile)
    }
}
