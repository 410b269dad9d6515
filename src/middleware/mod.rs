//! Middleware components for HTTP request processing.
//!
//! The request pipeline is assembled from these pieces in [`crate::routes::router`]:
//! the exception filter wraps the session layer, and the guards sit on the route
//! groups that need them.

pub mod auth;
pub mod filter;

pub use auth::{require_admin, require_auth, AdminUser, CurrentUser, Guard};
pub use filter::{http_exception_filter, ExceptionFilter, FaultContext, FilterOutcome, GraphQlError};
