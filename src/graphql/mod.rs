//! GraphQL-over-HTTP endpoint.
//!
//! Requests are dispatched on their root field through a [`ResolverRegistry`]. Each
//! entry pairs a resolver with the [`Guard`] it runs behind. Failures are shaped by the
//! exception filter in its GraphQL context, so the error list always carries the
//! message exactly as raised.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};
use crate::middleware::{FaultContext, FilterOutcome, GraphQlError, Guard};
use crate::session::{Principal, Session};
use crate::state::AppState;

pub mod parser;
pub mod resolvers;

pub use parser::{operation_hint, parse_operation, DocumentError, OperationType, RootField};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    pub query: String,
    /// Informational only; the first operation in the document is executed.
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Option<Map<String, Value>>,
}

/// Everything a resolver may use.
pub struct ResolverContext {
    pub state: AppState,
    pub session: Session,
    /// Set whenever the session has one, even for public fields.
    pub principal: Option<Principal>,
    pub args: Map<String, Value>,
}

impl ResolverContext {
    pub fn optional_str(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    pub fn required_str(&self, name: &str) -> AppResult<&str> {
        self.optional_str(name).ok_or_else(|| AppError::ValidationError {
            field: name.to_string(),
            message: "Argument is required".to_string(),
        })
    }
}

type Resolver = Arc<dyn Fn(ResolverContext) -> BoxFuture<'static, AppResult<Value>> + Send + Sync>;

#[derive(Clone)]
pub struct ResolverEntry {
    pub guard: Guard,
    resolver: Resolver,
}

/// Root fields the endpoint can resolve.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    entries: HashMap<(OperationType, String), ResolverEntry>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, operation: OperationType, field: &str, guard: Guard, resolver: F)
    where
        F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<Value>> + Send + 'static,
    {
        let resolver: Resolver =
            Arc::new(move |ctx: ResolverContext| -> BoxFuture<'static, AppResult<Value>> {
                Box::pin(resolver(ctx))
            });
        self.entries.insert((operation, field.to_string()), ResolverEntry { guard, resolver });
    }

    pub fn lookup(&self, operation: OperationType, field: &str) -> Option<&ResolverEntry> {
        self.entries.get(&(operation, field.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn error_body(error: GraphQlError) -> Value {
    json!({ "data": Value::Null, "errors": [error] })
}

/// `POST /graphql`
pub async fn graphql_handler(
    State(state): State<AppState>,
    session: Session,
    body: Result<Json<GraphQlRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let error = GraphQlError::new(rejection.body_text(), Vec::new(), "BAD_REQUEST");
            return (StatusCode::BAD_REQUEST, Json(error_body(error))).into_response();
        }
    };

    let variables = request.variables.unwrap_or_default();
    let root = match parse_operation(&request.query, &variables) {
        Ok(root) => root,
        Err(err) => {
            let parent_type = operation_hint(&request.query).map_or("Document", OperationType::type_name);
            tracing::debug!("{} rejected with {}: {}", parent_type, err.code(), err);
            let error = GraphQlError::new(err.to_string(), Vec::new(), err.code());
            return Json(error_body(error)).into_response();
        }
    };

    let parent_type = root.operation.type_name();
    let response_key = root.response_key().to_string();
    tracing::debug!(
        "GraphQL {}.{} (operation {})",
        parent_type,
        root.name,
        request.operation_name.as_deref().unwrap_or("anonymous")
    );

    let Some(entry) = state.graphql.lookup(root.operation, &root.name).cloned() else {
        let message = format!("Cannot query field \"{}\" on type \"{}\".", root.name, parent_type);
        tracing::debug!("{}.{} rejected with GRAPHQL_VALIDATION_FAILED: {}", parent_type, root.name, message);
        let error = GraphQlError::new(message, Vec::new(), "GRAPHQL_VALIDATION_FAILED");
        return Json(error_body(error)).into_response();
    };

    let outcome = match entry.guard.check(Some(&session)) {
        Ok(principal) => {
            let ctx = ResolverContext {
                state: state.clone(),
                session: session.clone(),
                principal,
                args: root.arguments,
            };
            (entry.resolver)(ctx).await
        }
        Err(denied) => {
            state.metrics.inc_auth_denied();
            Err(denied)
        }
    };

    match outcome {
        Ok(value) => {
            let mut data = Map::new();
            data.insert(response_key, value);
            Json(json!({ "data": data })).into_response()
        }
        Err(e) => {
            let fault = e.fault();
            let ctx = FaultContext::GraphQl {
                parent_type: parent_type.to_string(),
                field: root.name.clone(),
            };
            let mut error = match state.filter.catch(&fault, &ctx) {
                FilterOutcome::GraphQl(error) => error,
                _ => GraphQlError::new(fault.message.clone(), Vec::new(), fault.code),
            };
            error.path = vec![response_key];
            Json(error_body(error)).into_response()
        }
    }
}
