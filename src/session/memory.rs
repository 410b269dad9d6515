use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{SessionError, SessionId, SessionRecord, SessionStore};

/// Process-local store with the same expiry semantics as the Redis store.
///
/// Only suitable for a single instance; used by tests and local runs.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<RwLock<HashMap<SessionId, (SessionRecord, Instant)>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records that have not yet expired.
    pub async fn live_count(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|(_, deadline)| *deadline > now).count()
    }

    /// Drops expired records.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().await.retain(|_, (_, deadline)| *deadline > now);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(id) {
                Some((record, deadline)) if *deadline > now => return Ok(Some(record.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        self.entries.write().await.remove(id);
        Ok(None)
    }

    async fn save(&self, record: &SessionRecord, ttl: Duration) -> Result<(), SessionError> {
        let deadline = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(record.id.clone(), (record.clone(), deadline));
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), SessionError> {
        self.entries.write().await.remove(id);
        Ok(())
    }
}
