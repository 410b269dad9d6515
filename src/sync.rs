//! Trigger for the directory synchronization microservice.
//!
//! The sync job itself runs elsewhere. This side only sends one request over the
//! microservice's Redis transport and waits for its reply:
//!
//! - request `{pattern, data, id}` published on channel `<pattern>`
//! - replies `{id, response | err, isDisposed}` published on `<pattern>.reply`; a
//!   request is finished once a reply for its id has `isDisposed` set

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::MicroserviceConfig;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait SyncTrigger: Send + Sync {
    /// Asks the sync service to run and returns whatever it reported.
    async fn trigger(&self, requested_by: &str) -> AppResult<Value>;
}

#[derive(Debug, Serialize)]
struct SyncRequest<'a> {
    pattern: &'a str,
    data: Value,
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SyncReply {
    id: String,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    err: Option<Value>,
    #[serde(default, rename = "isDisposed")]
    is_disposed: bool,
}

pub fn reply_channel(pattern: &str) -> String {
    format!("{}.reply", pattern)
}

pub fn encode_request(pattern: &str, id: &str, requested_by: &str) -> serde_json::Result<String> {
    serde_json::to_string(&SyncRequest { pattern, data: json!({ "requestedBy": requested_by }), id })
}

/// Folds the reply packets for one request id.
#[derive(Debug)]
pub struct ReplyCollector {
    id: String,
    response: Option<Value>,
}

impl ReplyCollector {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), response: None }
    }

    /// Returns the final outcome once the request is done, `None` while more packets are due.
    pub fn accept(&mut self, payload: &str) -> Option<AppResult<Value>> {
        let reply: SyncReply = match serde_json::from_str(payload) {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!("Ignoring malformed sync reply: {}", e);
                return None;
            }
        };
        if reply.id != self.id {
            return None;
        }

        if let Some(err) = reply.err.filter(|e| !e.is_null()) {
            let message = match &err {
                Value::String(s) => s.clone(),
                Value::Object(map) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string()),
                other => other.to_string(),
            };
            return Some(Err(AppError::Upstream { status: 502, message }));
        }
        if let Some(response) = reply.response.filter(|r| !r.is_null()) {
            self.response = Some(response);
        }
        if reply.is_disposed {
            return Some(Ok(self.response.take().unwrap_or(Value::Null)));
        }
        None
    }
}

fn unavailable(err: redis::RedisError) -> AppError {
    tracing::error!("Sync microservice transport failed: {}", err);
    AppError::ServiceUnavailable("Sync microservice unavailable".to_string())
}

pub struct RedisSyncClient {
    client: redis::Client,
    pattern: String,
    timeout: Duration,
}

impl RedisSyncClient {
    /// Does not connect; every trigger opens its own connections.
    pub fn new(cfg: &MicroserviceConfig) -> anyhow::Result<Self> {
        let client = redis::Client::open(cfg.url.as_str())?;
        Ok(Self {
            client,
            pattern: cfg.sync_pattern.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
        })
    }
}

#[async_trait]
impl SyncTrigger for RedisSyncClient {
    async fn trigger(&self, requested_by: &str) -> AppResult<Value> {
        let id = Uuid::new_v4().to_string();
        let payload = encode_request(&self.pattern, &id, requested_by)
            .map_err(|e| AppError::Internal(e.into()))?;

        // Subscribe before publishing so a fast reply is not missed
        let mut pubsub = self.client.get_async_pubsub().await.map_err(unavailable)?;
        pubsub.subscribe(reply_channel(&self.pattern)).await.map_err(unavailable)?;

        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(unavailable)?;
        let receivers: i64 = conn.publish(&self.pattern, payload).await.map_err(unavailable)?;
        if receivers == 0 {
            tracing::warn!("No sync service is listening on '{}'", self.pattern);
            return Err(AppError::ServiceUnavailable("Sync microservice unavailable".to_string()));
        }
        tracing::info!("Directory sync {} requested by {}", id, requested_by);

        let mut collector = ReplyCollector::new(id.clone());
        let wait = async {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let Ok(payload) = msg.get_payload::<String>() else {
                    continue;
                };
                if let Some(outcome) = collector.accept(&payload) {
                    return outcome;
                }
            }
            Err(AppError::ServiceUnavailable("Sync reply channel closed".to_string()))
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!("Directory sync {} timed out after {:?}", id, self.timeout);
                Err(AppError::ServiceUnavailable("Sync microservice did not answer in time".to_string()))
            }
        }
    }
}
