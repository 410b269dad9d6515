//! Stand-ins and helpers shared by the pipeline tests.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::Database;
use crate::directory::{Directory, UserProfile};
use crate::error::{AppError, AppResult};
use crate::files::{Credential, DocumentBackend, FileEntry};
use crate::routes;
use crate::session::{
    MemorySessionStore, Principal, SessionError, SessionId, SessionRecord, SessionStore,
};
use crate::state::{AppState, Collaborators};
use crate::sync::SyncTrigger;

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.session.secret = "test-secret".to_string();
    // Nothing listens on port 1
    cfg.database.host = "127.0.0.1".to_string();
    cfg.database.port = 1;
    cfg
}

pub fn unreachable_db(cfg: &AppConfig) -> Database {
    Database::connect_lazy(&cfg.database).unwrap()
}

pub fn principal(login: &str, is_admin: bool) -> Principal {
    Principal {
        id: Uuid::new_v4(),
        login: login.to_string(),
        display_name: format!("{} (test)", login),
        is_admin,
    }
}

/// Two users: `jdoe`/`secret` and the administrator `admin`/`admin-pass`.
pub struct StubDirectory {
    users: HashMap<String, (String, Principal)>,
}

impl StubDirectory {
    pub fn new() -> Self {
        let mut users = HashMap::new();
        users.insert("jdoe".to_string(), ("secret".to_string(), principal("jdoe", false)));
        users.insert("admin".to_string(), ("admin-pass".to_string(), principal("admin", true)));
        Self { users }
    }
}

#[async_trait]
impl Directory for StubDirectory {
    async fn authenticate(&self, login: &str, password: &str) -> AppResult<Option<Principal>> {
        Ok(self
            .users
            .get(login)
            .filter(|(expected, _)| expected == password)
            .map(|(_, principal)| principal.clone()))
    }

    async fn profile(&self, login: &str) -> AppResult<Option<UserProfile>> {
        Ok(self.users.get(login).map(|(_, p)| UserProfile {
            id: p.id,
            login: p.login.clone(),
            display_name: p.display_name.clone(),
            email: Some(format!("{}@example.test", p.login)),
            department: Some("IT".to_string()),
            title: None,
            gender: None,
            phone: None,
            is_admin: p.is_admin,
            synced_at: None,
        }))
    }
}

/// Document backend that records every call it receives.
///
/// Paths with special behaviour: `/boom` fails with a backend 500, `/nope` with a 404,
/// `/panic` panics.
#[derive(Default)]
pub struct RecordingBackend {
    calls: AtomicUsize,
    last_credential: Mutex<Option<Credential>>,
    stored: Mutex<HashMap<String, Vec<u8>>>,
}

impl RecordingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_credential(&self) -> Option<Credential> {
        self.last_credential.lock().unwrap().clone()
    }

    fn record(&self, credential: &Credential) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_credential.lock().unwrap() = Some(credential.clone());
    }
}

#[async_trait]
impl DocumentBackend for RecordingBackend {
    async fn list_folder(&self, credential: &Credential, path: &str) -> AppResult<Vec<FileEntry>> {
        self.record(credential);
        match path {
            "/boom" => Err(AppError::Upstream { status: 500, message: "backend exploded".to_string() }),
            "/nope" => Err(AppError::Upstream { status: 404, message: "No such folder: /nope".to_string() }),
            "/panic" => panic!("document backend panicked"),
            _ => Ok(vec![FileEntry {
                name: "report.pdf".to_string(),
                path: format!("{}/report.pdf", path.trim_end_matches('/')),
                is_folder: false,
                size: 42,
                modified: None,
            }]),
        }
    }

    async fn put_file(
        &self,
        credential: &Credential,
        path: &str,
        content: Vec<u8>,
    ) -> AppResult<FileEntry> {
        self.record(credential);
        let size = content.len() as u64;
        self.stored.lock().unwrap().insert(path.to_string(), content);
        Ok(FileEntry {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            is_folder: false,
            size,
            modified: None,
        })
    }

    async fn get_file(&self, credential: &Credential, path: &str) -> AppResult<Vec<u8>> {
        self.record(credential);
        self.stored.lock().unwrap().get(path).cloned().ok_or_else(|| AppError::Upstream {
            status: 404,
            message: format!("No such file: {}", path),
        })
    }

    async fn get_file_url(&self, credential: &Credential, path: &str) -> AppResult<String> {
        self.record(credential);
        Ok(format!("https://docs.example.test/share{}", path))
    }
}

#[derive(Default)]
pub struct StubSync {
    calls: AtomicUsize,
}

impl StubSync {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncTrigger for StubSync {
    async fn trigger(&self, requested_by: &str) -> AppResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "users": 3, "requestedBy": requested_by }))
    }
}

/// A session store whose backend is down.
pub struct FailingStore;

#[async_trait]
impl SessionStore for FailingStore {
    async fn load(&self, _id: &SessionId) -> Result<Option<SessionRecord>, SessionError> {
        Err(SessionError::Backend("connection refused".to_string()))
    }

    async fn save(&self, _record: &SessionRecord, _ttl: Duration) -> Result<(), SessionError> {
        Err(SessionError::Backend("connection refused".to_string()))
    }

    async fn destroy(&self, _id: &SessionId) -> Result<(), SessionError> {
        Err(SessionError::Backend("connection refused".to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemorySessionStore,
    pub backend: Arc<RecordingBackend>,
    pub sync: Arc<StubSync>,
}

pub fn build_state(cfg: AppConfig, store: Arc<dyn SessionStore>) -> (AppState, Arc<RecordingBackend>, Arc<StubSync>) {
    let backend = Arc::new(RecordingBackend::default());
    let sync = Arc::new(StubSync::default());
    let db = unreachable_db(&cfg);
    let state = AppState::new(
        cfg,
        Collaborators {
            db,
            session_store: store,
            directory: Arc::new(StubDirectory::new()),
            documents: backend.clone(),
            sync: sync.clone(),
        },
    );
    (state, backend, sync)
}

pub fn test_app() -> TestApp {
    let store = MemorySessionStore::new();
    let (state, backend, sync) = build_state(test_config(), Arc::new(store.clone()));
    TestApp { router: routes::router(state.clone()), state, store, backend, sync }
}

pub async fn send(router: &Router, req: Request<Body>) -> Response {
    router.clone().oneshot(req).await.unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: Method, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_bytes(res: Response) -> Vec<u8> {
    res.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(res: Response) -> Value {
    serde_json::from_slice(&body_bytes(res).await).unwrap()
}

pub async fn body_text(res: Response) -> String {
    String::from_utf8(body_bytes(res).await).unwrap()
}

/// The `name=value` pair of the first `Set-Cookie` header.
pub fn session_cookie(res: &Response) -> Option<String> {
    res.headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
}

/// Signs in through the login endpoint and returns the cookie pair to send back.
pub async fn login(app: &TestApp, login: &str, password: &str) -> String {
    let req = json_request(
        Method::POST,
        "/auth/login",
        json!({ "login": login, "password": password }),
        None,
    );
    let res = send(&app.router, req).await;
    assert_eq!(res.status(), 200, "login as {} failed", login);
    session_cookie(&res).expect("login sets the session cookie")
}

/// Collects everything logged on the current thread while the guard is alive.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

pub struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter(self.0.clone())
    }
}

pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
