use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

use super::{OperationType, ResolverContext, ResolverRegistry};
use crate::error::{AppError, AppResult};
use crate::files::Caller;
use crate::middleware::auth::DENIED;
use crate::middleware::Guard;
use crate::types::UserView;

/// The portal's root fields.
pub fn portal_registry() -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();
    registry.register(OperationType::Query, "me", Guard::Authenticated, me);
    registry.register(OperationType::Query, "folderFiles", Guard::Authenticated, folder_files);
    registry.register(OperationType::Query, "getFile", Guard::Authenticated, get_file);
    registry.register(OperationType::Query, "getFileURL", Guard::Authenticated, get_file_url);
    registry.register(OperationType::Mutation, "putFile", Guard::Authenticated, put_file);
    registry
}

fn to_value<T: serde::Serialize>(value: T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))
}

async fn me(ctx: ResolverContext) -> AppResult<Value> {
    let principal = ctx
        .principal
        .clone()
        .ok_or_else(|| AppError::Forbidden(DENIED.to_string()))?;
    to_value(UserView::new(&principal, ctx.session.is_admin()))
}

// A missing path is left to the gateway, which refuses it like a missing credential

async fn folder_files(ctx: ResolverContext) -> AppResult<Value> {
    let caller = Caller::from_session(&ctx.session);
    let path = ctx.optional_str("path").unwrap_or_default();
    let entries = ctx.state.files.list_folder(&caller, path).await?;
    to_value(entries)
}

async fn get_file(ctx: ResolverContext) -> AppResult<Value> {
    let caller = Caller::from_session(&ctx.session);
    let path = ctx.optional_str("path").unwrap_or_default();
    let content = ctx.state.files.get_file(&caller, path).await?;
    Ok(Value::String(BASE64.encode(content)))
}

async fn get_file_url(ctx: ResolverContext) -> AppResult<Value> {
    let caller = Caller::from_session(&ctx.session);
    let path = ctx.optional_str("path").unwrap_or_default();
    let url = ctx.state.files.get_file_url(&caller, path).await?;
    Ok(Value::String(url))
}

async fn put_file(ctx: ResolverContext) -> AppResult<Value> {
    let caller = Caller::from_session(&ctx.session);
    let path = ctx.optional_str("path").unwrap_or_default();
    ctx.state.files.check("put_file", &caller, path)?;
    let content = BASE64
        .decode(ctx.required_str("content")?)
        .map_err(|_| AppError::ValidationError {
            field: "content".to_string(),
            message: "Content must be base64 encoded".to_string(),
        })?;
    let entry = ctx.state.files.put_file(&caller, path, content).await?;
    to_value(entry)
}
