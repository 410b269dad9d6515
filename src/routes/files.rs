use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::error::AppResult;
use crate::files::{Caller, FileEntry};
use crate::session::Session;
use crate::state::AppState;
use crate::types::{FileUrlResponse, PathQuery};

pub async fn list_folder(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<PathQuery>,
) -> AppResult<Json<Vec<FileEntry>>> {
    let entries = state.files.list_folder(&Caller::from_session(&session), &q.path).await?;
    Ok(Json(entries))
}

pub async fn put_file(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<PathQuery>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<FileEntry>)> {
    let entry = state
        .files
        .put_file(&Caller::from_session(&session), &q.path, body.to_vec())
        .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn get_file(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<PathQuery>,
) -> AppResult<Response> {
    let content = state.files.get_file(&Caller::from_session(&session), &q.path).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], content).into_response())
}

pub async fn get_file_url(
    State(state): State<AppState>,
    session: Session,
    Query(q): Query<PathQuery>,
) -> AppResult<Json<FileUrlResponse>> {
    let url = state.files.get_file_url(&Caller::from_session(&session), &q.path).await?;
    Ok(Json(FileUrlResponse { url }))
}
