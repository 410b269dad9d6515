use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Credential, DocumentBackend, FileEntry};
use crate::config::FilesConfig;
use crate::error::{AppError, AppResult};

/// Document backend reached over its REST API with HTTP basic auth.
#[derive(Clone)]
pub struct HttpDocumentBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ShareLink {
    url: String,
}

impl HttpDocumentBackend {
    pub fn new(cfg: &FilesConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self { client, base_url: cfg.url.trim_end_matches('/').to_string() })
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> AppResult<reqwest::Response> {
        let res = request.send().await.map_err(unreachable_backend)?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let code = if status.is_client_error() || status.is_server_error() {
            status.as_u16()
        } else {
            502
        };
        let body = res.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            format!("Document backend returned HTTP {}", status.as_u16())
        } else {
            body
        };
        tracing::warn!("Document backend answered {}: {}", status.as_u16(), message);
        Err(AppError::Upstream { status: code, message })
    }
}

fn unreachable_backend(err: reqwest::Error) -> AppError {
    tracing::warn!("Document backend request failed: {}", err);
    AppError::Upstream { status: 502, message: format!("Document backend unreachable: {}", err) }
}

fn invalid_payload(err: reqwest::Error) -> AppError {
    AppError::Upstream {
        status: 502,
        message: format!("Document backend sent an invalid response: {}", err),
    }
}

#[async_trait]
impl DocumentBackend for HttpDocumentBackend {
    async fn list_folder(&self, credential: &Credential, path: &str) -> AppResult<Vec<FileEntry>> {
        let request = self
            .client
            .get(self.endpoint("folders"))
            .query(&[("path", path)])
            .basic_auth(&credential.username, Some(&credential.secret));
        self.send(request).await?.json().await.map_err(invalid_payload)
    }

    async fn put_file(
        &self,
        credential: &Credential,
        path: &str,
        content: Vec<u8>,
    ) -> AppResult<FileEntry> {
        let request = self
            .client
            .put(self.endpoint("files"))
            .query(&[("path", path)])
            .basic_auth(&credential.username, Some(&credential.secret))
            .body(content);
        self.send(request).await?.json().await.map_err(invalid_payload)
    }

    async fn get_file(&self, credential: &Credential, path: &str) -> AppResult<Vec<u8>> {
        let request = self
            .client
            .get(self.endpoint("files"))
            .query(&[("path", path)])
            .basic_auth(&credential.username, Some(&credential.secret));
        let bytes = self.send(request).await?.bytes().await.map_err(invalid_payload)?;
        Ok(bytes.to_vec())
    }

    async fn get_file_url(&self, credential: &Credential, path: &str) -> AppResult<String> {
        let request = self
            .client
            .post(self.endpoint("shares"))
            .basic_auth(&credential.username, Some(&credential.secret))
            .json(&json!({ "path": path }));
        let link: ShareLink = self.send(request).await?.json().await.map_err(invalid_payload)?;
        Ok(link.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let cfg = FilesConfig { url: "http://docs.local:8080/api/".to_string(), timeout_secs: 5 };
        let backend = HttpDocumentBackend::new(&cfg).unwrap();
        assert_eq!(backend.endpoint("folders"), "http://docs.local:8080/api/folders");
    }
}
