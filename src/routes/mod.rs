//! HTTP route handlers and the router that assembles the request pipeline.
//!
//! - `health`: liveness, readiness, version and metrics
//! - `auth`: login page, login/logout and the signed-in user's profile
//! - `files`: REST surface of the document gateway
//! - `admin`: administrator-only operations
//!
//! Layers, outermost first: access log, exception filter, session, panic catcher.
//! Guards are route layers on the groups that need them; GraphQL guards per field.

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;

use crate::graphql::graphql_handler;
use crate::logging;
use crate::middleware::filter::panic_response;
use crate::middleware::{http_exception_filter, require_admin, require_auth};
use crate::session::session_middleware;
use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod files;
pub mod health;

/// Upload limit for `PUT /api/files`.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/me", get(auth::me))
        .route("/api/profile", get(auth::profile))
        .route("/api/files", get(files::list_folder).put(files::put_file))
        .route("/api/files/content", get(files::get_file))
        .route("/api/files/url", get(files::get_file_url))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/admin/ldap/sync", post(admin::trigger_sync))
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/version", get(health::version))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/auth/login", get(auth::login_page).post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/graphql", post(graphql_handler))
        .merge(protected)
        .merge(admin)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(state.sessions.clone(), session_middleware))
        .layer(from_fn_with_state(state.filter.clone(), http_exception_filter))
        .layer(logging::http_trace_layer())
        .with_state(state)
}
