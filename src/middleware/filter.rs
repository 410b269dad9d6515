//! Terminal error handling.
//!
//! Handlers, guards and resolvers report failures as [`AppError`](crate::error::AppError),
//! whose responses carry a [`Fault`]. The filter inspects that fault once the inner
//! stack has produced a response and decides the final shape for the transport:
//!
//! - HTTP 403: redirect to the login page
//! - HTTP 5xx: rendered error page with the original status
//! - HTTP, other statuses: the JSON error body as produced
//! - GraphQL: a structured error entry carrying the message unchanged
//!
//! Every fault is logged here. Authorization denials are routine and go to DEBUG,
//! recognized faults to WARN, unrecognized ones to ERROR with their full detail.

use std::any::Any;

use axum::{
    extract::{Request, State},
    http::{
        header::{LOCATION, SET_COOKIE},
        Method, StatusCode,
    },
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Fault;
use crate::metrics::Metrics;

/// Where the fault happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultContext {
    Http { method: Method, path: String },
    GraphQl { parent_type: String, field: String },
}

/// One entry of a GraphQL `errors` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphQlError {
    pub message: String,
    /// Empty for request-level errors that never reached a field.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    pub extensions: GraphQlErrorExtensions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphQlErrorExtensions {
    pub code: String,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>, path: Vec<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path,
            extensions: GraphQlErrorExtensions { code: code.into() },
        }
    }
}

/// The response decision for a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Keep the response the handler produced.
    Passthrough,
    Redirect { location: String },
    ErrorPage { status: StatusCode },
    GraphQl(GraphQlError),
}

#[derive(Clone)]
pub struct ExceptionFilter {
    login_path: String,
    metrics: Metrics,
}

impl ExceptionFilter {
    pub fn new(login_path: impl Into<String>, metrics: Metrics) -> Self {
        Self { login_path: login_path.into(), metrics }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Logs the fault and decides the response for it.
    pub fn catch(&self, fault: &Fault, ctx: &FaultContext) -> FilterOutcome {
        self.log(fault, ctx);
        match ctx {
            FaultContext::Http { .. } => {
                if fault.status == StatusCode::FORBIDDEN {
                    FilterOutcome::Redirect { location: self.login_path.clone() }
                } else if fault.status.is_server_error() {
                    FilterOutcome::ErrorPage { status: fault.status }
                } else {
                    FilterOutcome::Passthrough
                }
            }
            FaultContext::GraphQl { field, .. } => {
                self.metrics.inc_graphql_errors();
                FilterOutcome::GraphQl(GraphQlError::new(
                    fault.message.clone(),
                    vec![field.clone()],
                    fault.code,
                ))
            }
        }
    }

    fn log(&self, fault: &Fault, ctx: &FaultContext) {
        if fault.is_authorization() {
            match ctx {
                FaultContext::Http { method, path } => {
                    tracing::debug!("{} {} denied: {}", method, path, fault.message)
                }
                FaultContext::GraphQl { parent_type, field } => {
                    tracing::debug!("{}.{} denied: {}", parent_type, field, fault.message)
                }
            }
            return;
        }

        self.metrics.inc_faults();
        let internal_http = matches!(ctx, FaultContext::Http { .. })
            && fault.status == StatusCode::INTERNAL_SERVER_ERROR;
        if fault.recognized && !internal_http {
            match ctx {
                FaultContext::Http { method, path } => tracing::warn!(
                    "{} {} failed with {}: {}",
                    method,
                    path,
                    fault.status.as_u16(),
                    fault.message
                ),
                FaultContext::GraphQl { parent_type, field } => tracing::warn!(
                    "{}.{} failed with {}: {}",
                    parent_type,
                    field,
                    fault.code,
                    fault.message
                ),
            }
        } else {
            // An HTTP 500 always carries its detail, recognized or not
            let detail = match (&fault.detail, fault.recognized) {
                (Some(detail), _) => detail.as_str(),
                (None, true) => fault.message.as_str(),
                (None, false) => "no detail available",
            };
            match ctx {
                FaultContext::Http { method, path } => tracing::error!(
                    "{} {} failed: {}\n{}",
                    method,
                    path,
                    fault.message,
                    detail
                ),
                FaultContext::GraphQl { parent_type, field } => tracing::error!(
                    "{}.{} failed: {}\n{}",
                    parent_type,
                    field,
                    fault.message,
                    detail
                ),
            }
        }
    }
}

/// Applies the filter to every HTTP response that carries a [`Fault`].
pub async fn http_exception_filter(
    State(filter): State<ExceptionFilter>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let res = next.run(req).await;

    let Some(fault) = res.extensions().get::<Fault>().cloned() else {
        return res;
    };

    let mut replaced = match filter.catch(&fault, &FaultContext::Http { method, path }) {
        FilterOutcome::Redirect { location } => {
            (StatusCode::FOUND, [(LOCATION, location)]).into_response()
        }
        FilterOutcome::ErrorPage { status } => (status, render_error_page(status)).into_response(),
        FilterOutcome::Passthrough | FilterOutcome::GraphQl(_) => return res,
    };
    // Session cookies set further in still have to reach the browser
    for cookie in res.headers().get_all(SET_COOKIE) {
        replaced.headers_mut().append(SET_COOKIE, cookie.clone());
    }
    replaced
}

/// Generic error view. Never includes fault details.
pub fn render_error_page(status: StatusCode) -> Html<String> {
    let reason = status.canonical_reason().unwrap_or("Error");
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{code} {reason}</title></head>\n<body>\n<h1>{code}</h1>\n<p>{reason}</p>\n<p>Something went wrong on our side. Please try again later.</p>\n<p><a href=\"/\">Back to the portal</a></p>\n</body>\n</html>\n",
        code = status.as_u16(),
        reason = reason
    ))
}

/// Turns a handler panic into a 500 carrying an unrecognized [`Fault`].
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let payload = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let fault = Fault::unrecognized("Handler panicked", Some(payload));
    let mut res = StatusCode::INTERNAL_SERVER_ERROR.into_response();
    res.extensions_mut().insert(fault);
    res
}
