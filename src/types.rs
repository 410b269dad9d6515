use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::Principal;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// The signed-in user as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub login: String,
    pub display_name: String,
    pub is_admin: bool,
}

impl UserView {
    pub fn new(principal: &Principal, is_admin: bool) -> Self {
        Self {
            id: principal.id,
            login: principal.login.clone(),
            display_name: principal.display_name.clone(),
            is_admin,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct FileUrlResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub requested_by: String,
    pub result: serde_json::Value,
}
