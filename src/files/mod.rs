//! Document gateway.
//!
//! File operations are forwarded to an external document-management backend on
//! behalf of the signed-in user. The gateway refuses to delegate unless a path, a
//! principal and the principal's backend credential are all present. Failures from
//! the backend propagate unchanged; there is no retry at this layer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{validation, AppError, AppResult};
use crate::metrics::Metrics;
use crate::session::{Principal, Session};

pub mod http;

pub use http::HttpDocumentBackend;

/// Message for every refused delegation.
pub const NOT_AUTHORIZED: &str = "Not authorized";

/// A file or folder as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

/// Backend login for one principal.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// External document-management system.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn list_folder(&self, credential: &Credential, path: &str) -> AppResult<Vec<FileEntry>>;
    async fn put_file(
        &self,
        credential: &Credential,
        path: &str,
        content: Vec<u8>,
    ) -> AppResult<FileEntry>;
    async fn get_file(&self, credential: &Credential, path: &str) -> AppResult<Vec<u8>>;
    /// A link the browser can open directly.
    async fn get_file_url(&self, credential: &Credential, path: &str) -> AppResult<String>;
}

/// Identity the gateway acts for, taken from the request session.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub user: Option<Principal>,
    pub credential: Option<String>,
}

impl Caller {
    pub fn from_session(session: &Session) -> Self {
        Self { user: session.principal(), credential: session.credential() }
    }
}

#[derive(Clone)]
pub struct FileGateway {
    backend: Arc<dyn DocumentBackend>,
    metrics: Metrics,
}

impl FileGateway {
    pub fn new(backend: Arc<dyn DocumentBackend>, metrics: Metrics) -> Self {
        Self { backend, metrics }
    }

    /// Refuses callers without a path, a user or a credential.
    fn credential(&self, op: &str, caller: &Caller, path: &str) -> AppResult<Credential> {
        match (&caller.user, caller.credential.as_deref()) {
            (Some(user), Some(secret)) if !path.trim().is_empty() && !secret.is_empty() => {
                Ok(Credential { username: user.login.clone(), secret: secret.to_string() })
            }
            _ => {
                self.metrics.inc_file_denied();
                tracing::debug!("Refusing {} for '{}': missing path, user or credential", op, path);
                Err(AppError::Unauthorized(NOT_AUTHORIZED.to_string()))
            }
        }
    }

    /// Checks the preconditions shared by every operation.
    fn authorize(&self, op: &str, caller: &Caller, path: &str) -> AppResult<Credential> {
        let credential = self.credential(op, caller, path)?;
        validation::validate_path(path)?;
        self.metrics.inc_file_ops();
        tracing::debug!("{} {} for {}", op, path, credential.username);
        Ok(credential)
    }

    /// Runs the caller checks of `op` without touching the backend, so callers can
    /// refuse a request before looking at its payload.
    pub fn check(&self, op: &str, caller: &Caller, path: &str) -> AppResult<()> {
        self.credential(op, caller, path).map(|_| ())
    }

    pub async fn list_folder(&self, caller: &Caller, path: &str) -> AppResult<Vec<FileEntry>> {
        let credential = self.authorize("list_folder", caller, path)?;
        self.backend.list_folder(&credential, path).await
    }

    pub async fn put_file(
        &self,
        caller: &Caller,
        path: &str,
        content: Vec<u8>,
    ) -> AppResult<FileEntry> {
        let credential = self.authorize("put_file", caller, path)?;
        self.backend.put_file(&credential, path, content).await
    }

    pub async fn get_file(&self, caller: &Caller, path: &str) -> AppResult<Vec<u8>> {
        let credential = self.authorize("get_file", caller, path)?;
        self.backend.get_file(&credential, path).await
    }

    pub async fn get_file_url(&self, caller: &Caller, path: &str) -> AppResult<String> {
        let credential = self.authorize("get_file_url", caller, path)?;
        self.backend.get_file_url(&credential, path).await
    }
}
