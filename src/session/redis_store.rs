use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{SessionError, SessionId, SessionRecord, SessionStore};

const KEY_PREFIX: &str = "sess:";

/// Session store backed by a shared Redis instance.
///
/// Records are stored as JSON under `sess:<id>` with a native Redis TTL, so expiry
/// is enforced by the store rather than by the servers.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    /// Connects to the session cache. Failure is fatal for the caller: the portal cannot
    /// serve authenticated traffic without it.
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        let client = redis::Client::open(url).map_err(|e| {
            tracing::error!("Invalid session store URL: {}", e);
            SessionError::from(e)
        })?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            tracing::error!("Could not connect to the session store: {}", e);
            SessionError::from(e)
        })?;
        Ok(Self { conn })
    }

    fn key(id: &SessionId) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }
}

impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        SessionError::Backend(err.to_string())
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::key(id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, record: &SessionRecord, ttl: Duration) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(Self::key(&record.id), payload, seconds).await?;
        Ok(())
    }

    async fn destroy(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let id = SessionId::parse("0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(RedisSessionStore::key(&id), "sess:0123456789abcdef0123456789abcdef");
    }
}
