use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use cookie::{time, Cookie, SameSite};
use serde_json::Value;

use super::{
    expiry_after, CookieSigner, Principal, SessionError, SessionId, SessionRecord, SessionStore,
    ADMIN_CLAIM,
};
use crate::config::SessionConfig;
use crate::error::AppError;

/// Per-request handle on the resolved session.
///
/// Handlers mutate it freely; the middleware persists the result once the response
/// is ready. Cloning shares the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Mutex<SessionState>>,
}

struct SessionState {
    record: SessionRecord,
    /// Whether the record exists in the store.
    persisted: bool,
    changed: bool,
    destroyed: bool,
    /// Id abandoned by a regeneration, to be removed from the store.
    replaced: Option<SessionId>,
}

enum Commit {
    Unchanged,
    Save { record: SessionRecord, replaced: Option<SessionId> },
    Destroy { ids: Vec<SessionId> },
}

impl Session {
    fn fresh(ttl: Duration) -> Self {
        Self::from_state(SessionRecord::new(SessionId::generate(), ttl), false)
    }

    fn from_state(record: SessionRecord, persisted: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionState {
                record,
                persisted,
                changed: false,
                destroyed: false,
                replaced: None,
            })),
        }
    }

    /// Builds a handle around an existing record, as if it had been loaded from the store.
    pub fn from_record(record: SessionRecord) -> Self {
        Self::from_state(record, true)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn id(&self) -> SessionId {
        self.state().record.id.clone()
    }

    pub fn principal(&self) -> Option<Principal> {
        let state = self.state();
        if state.destroyed {
            return None;
        }
        state.record.principal.clone()
    }

    pub fn credential(&self) -> Option<String> {
        let state = self.state();
        if state.destroyed {
            return None;
        }
        state.record.credential.clone()
    }

    pub fn claim(&self, key: &str) -> Option<Value> {
        self.state().record.claims.get(key).cloned()
    }

    /// Admin when either the principal or the session claims say so.
    pub fn is_admin(&self) -> bool {
        match self.principal() {
            Some(principal) => {
                principal.is_admin
                    || self.claim(ADMIN_CLAIM).and_then(|v| v.as_bool()).unwrap_or(false)
            }
            None => false,
        }
    }

    pub fn set_claim(&self, key: impl Into<String>, value: Value) {
        let mut state = self.state();
        state.record.claims.insert(key.into(), value);
        state.changed = true;
    }

    /// Attaches a principal and regenerates the id so a pre-login id cannot be reused.
    pub fn login(&self, principal: Principal, credential: Option<String>) {
        let mut state = self.state();
        if state.persisted {
            let old = state.record.id.clone();
            state.replaced = Some(old);
        }
        state.record.id = SessionId::generate();
        state.persisted = false;
        state
            .record
            .claims
            .insert(ADMIN_CLAIM.to_string(), Value::Bool(principal.is_admin));
        state.record.principal = Some(principal);
        state.record.credential = credential;
        state.changed = true;
        state.destroyed = false;
    }

    /// Marks the session for removal from the store.
    pub fn destroy(&self) {
        self.state().destroyed = true;
    }

    fn take_commit(&self) -> Commit {
        let mut state = self.state();
        if state.destroyed {
            let mut ids = Vec::new();
            if state.persisted {
                ids.push(state.record.id.clone());
            }
            if let Some(old) = state.replaced.take() {
                ids.push(old);
            }
            state.persisted = false;
            state.changed = false;
            return Commit::Destroy { ids };
        }
        if !state.changed {
            return Commit::Unchanged;
        }
        state.changed = false;
        state.persisted = true;
        Commit::Save { record: state.record.clone(), replaced: state.replaced.take() }
    }
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("session middleware is not installed")))
    }
}

/// Resolves and persists sessions for the middleware.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    signer: CookieSigner,
    cookie_name: String,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, cfg: &SessionConfig) -> Self {
        Self {
            store,
            signer: CookieSigner::new(&cfg.secret),
            cookie_name: cfg.cookie_name.clone(),
            ttl: Duration::from_secs(cfg.cookie_ttl_secs),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn signer(&self) -> &CookieSigner {
        &self.signer
    }

    /// Finds the first correctly signed session cookie.
    pub fn session_id_from(&self, headers: &HeaderMap) -> Option<SessionId> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .filter(|cookie| cookie.name() == self.cookie_name)
            .find_map(|cookie| self.signer.verify(cookie.value()))
    }

    /// Loads the session named by the request cookie, or starts an empty one.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Session, SessionError> {
        let Some(id) = self.session_id_from(headers) else {
            return Ok(Session::fresh(self.ttl));
        };
        match self.store.load(&id).await? {
            Some(record) => Ok(Session::from_record(record)),
            None => {
                tracing::debug!("Session {} expired or unknown", id);
                Ok(Session::fresh(self.ttl))
            }
        }
    }

    /// Writes back a changed session. Returns the `Set-Cookie` value to send, if any.
    pub async fn commit(&self, session: &Session) -> Result<Option<HeaderValue>, SessionError> {
        match session.take_commit() {
            Commit::Unchanged => Ok(None),
            Commit::Save { mut record, replaced } => {
                if let Some(old) = replaced {
                    self.store.destroy(&old).await?;
                }
                record.expires_at = expiry_after(self.ttl);
                self.store.save(&record, self.ttl).await?;
                Ok(Some(self.set_cookie(&record.id)))
            }
            Commit::Destroy { ids } => {
                for id in &ids {
                    self.store.destroy(id).await?;
                }
                Ok(Some(self.clear_cookie()))
            }
        }
    }

    /// Path `/`, readable by client scripts, lifetime from configuration.
    pub fn set_cookie(&self, id: &SessionId) -> HeaderValue {
        let max_age = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        self.cookie_header(self.signer.sign(id), time::Duration::seconds(max_age))
    }

    pub fn clear_cookie(&self) -> HeaderValue {
        self.cookie_header(String::new(), time::Duration::ZERO)
    }

    fn cookie_header(&self, value: String, max_age: time::Duration) -> HeaderValue {
        let cookie = Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .max_age(max_age)
            .same_site(SameSite::Lax)
            .build();
        HeaderValue::from_str(&cookie.to_string()).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

/// Resolves the session before the handler runs and persists it afterwards.
pub async fn session_middleware(
    State(manager): State<SessionManager>,
    mut req: Request,
    next: Next,
) -> Response {
    let session = match manager.resolve(req.headers()).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!("Failed to resolve session: {}", e);
            return AppError::ServiceUnavailable("Session store unavailable".to_string())
                .into_response();
        }
    };
    req.extensions_mut().insert(session.clone());

    let mut res = next.run(req).await;

    match manager.commit(&session).await {
        Ok(Some(cookie)) => {
            res.headers_mut().append(SET_COOKIE, cookie);
            res
        }
        Ok(None) => res,
        Err(e) => {
            tracing::error!("Failed to persist session: {}", e);
            AppError::from(e).into_response()
        }
    }
}
