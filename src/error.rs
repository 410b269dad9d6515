use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::error::Error;
use std::fmt;

/// The primary error type for the application.
///
/// Every handler, resolver and gateway call reports failures through this enum. The
/// response it produces carries a [`Fault`] so the exception filter can decide the
/// final, transport-specific shape.
#[derive(Debug)]
pub enum AppError {
    /// Unrecognized faults. Logged with the full chain, never shown to clients verbatim.
    Internal(anyhow::Error),
    /// For client errors due to invalid requests.
    BadRequest(String),
    /// For when a requested resource is not found.
    NotFound(String),
    /// Missing user or credential for an operation that needs one.
    Unauthorized(String),
    /// Denied by the auth guard.
    Forbidden(String),
    /// For when a specific field in a request fails validation.
    ValidationError {
        /// The name of the field that failed validation.
        field: String,
        /// A message describing the validation error.
        message: String,
    },
    /// For when a dependency (session store, database, microservice) is temporarily unavailable.
    ServiceUnavailable(String),
    /// For errors related to database operations.
    Database(String),
    /// Failure while persisting session state.
    Session(String),
    /// A failure reported by an external backend, passed through with its status.
    Upstream {
        /// Status reported by the backend (502 when the backend could not be reached).
        status: u16,
        /// Message reported by the backend.
        message: String,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::ValidationError { field, message } => {
                write!(f, "Validation error on field '{}': {}", field, message)
            }
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Session(msg) => write!(f, "Session error: {}", msg),
            AppError::Upstream { status, message } => {
                write!(f, "Upstream error ({}): {}", status, message)
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Transport-neutral description of a failure, attached to error responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub status: StatusCode,
    pub code: &'static str,
    /// The message as thrown; GraphQL clients receive it unchanged.
    pub message: String,
    /// Debug chain or panic payload for unrecognized faults.
    pub detail: Option<String>,
    /// `false` for faults the application did not raise on purpose.
    pub recognized: bool,
}

impl Fault {
    /// A fault nobody raised on purpose, e.g. a panic in a handler.
    pub fn unrecognized(message: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
            detail,
            recognized: false,
        }
    }

    pub fn is_authorization(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED || self.status == StatusCode::FORBIDDEN
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::Database(_) | AppError::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) | AppError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Session(_) => "SESSION_ERROR",
            AppError::Upstream { .. } => "UPSTREAM_ERROR",
        }
    }

    /// The message as raised, without the category prefix `Display` adds.
    pub fn message(&self) -> String {
        match self {
            AppError::Internal(e) => e.to_string(),
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::ServiceUnavailable(msg)
            | AppError::Database(msg)
            | AppError::Session(msg) => msg.clone(),
            AppError::ValidationError { field, message } => format!("{}: {}", field, message),
            AppError::Upstream { message, .. } => message.clone(),
        }
    }

    pub fn fault(&self) -> Fault {
        let detail = match self {
            AppError::Internal(e) => Some(format!("{:?}", e)),
            AppError::Database(msg) | AppError::Session(msg) => Some(msg.clone()),
            _ => None,
        };
        Fault {
            status: self.status(),
            code: self.code(),
            message: self.message(),
            detail,
            recognized: !matches!(self, AppError::Internal(_)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let fault = self.fault();

        let (error_message, details) = match &self {
            AppError::Internal(_) => {
                let error_id = uuid::Uuid::new_v4();
                (
                    "An internal server error occurred".to_string(),
                    Some(json!({ "error_id": error_id.to_string() })),
                )
            }
            AppError::Database(_) => ("A database error occurred".to_string(), None),
            AppError::ValidationError { field, message } => (
                format!("Validation failed for field '{}'", field),
                Some(json!({ "field": field, "message": message })),
            ),
            _ => (fault.message.clone(), None),
        };

        let mut body = json!({
            "error": {
                "code": fault.code,
                "message": error_message,
            },
            "status": fault.status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        let mut response = (fault.status, Json(body)).into_response();
        response.extensions_mut().insert(fault);
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            _ => AppError::Database(format!("Database error: {}", err)),
        }
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// An extension trait for `Option` that provides a convenient way to convert
/// an `Option` to a `Result` with a `NotFound` error.
pub trait OptionExt<T> {
    /// Converts an `Option<T>` to a `Result<T, AppError>`.
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(format!("{} not found", entity)))
    }
}

/// Request validation helpers.
pub mod validation {
    use super::*;

    /// Validates a document path: non-empty after trimming, no NUL bytes, no `..` segments.
    pub fn validate_path(path: &str) -> AppResult<()> {
        if path.trim().is_empty() {
            return Err(AppError::ValidationError {
                field: "path".to_string(),
                message: "Path cannot be empty".to_string(),
            });
        }

        if path.contains('\0') {
            return Err(AppError::ValidationError {
                field: "path".to_string(),
                message: "Path contains null characters".to_string(),
            });
        }

        if path.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(AppError::ValidationError {
                field: "path".to_string(),
                message: "Path must not contain '..' segments".to_string(),
            });
        }

        Ok(())
    }

    /// Validates that a required text field is present.
    pub fn validate_required(value: &str, field: &str) -> AppResult<()> {
        if value.trim().is_empty() {
            return Err(AppError::ValidationError {
                field: field.to_string(),
                message: "Value is required".to_string(),
            });
        }
        Ok(())
    }
}
