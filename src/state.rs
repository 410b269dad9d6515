use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Database;
use crate::directory::Directory;
use crate::files::{DocumentBackend, FileGateway};
use crate::graphql::{resolvers::portal_registry, ResolverRegistry};
use crate::metrics::Metrics;
use crate::middleware::ExceptionFilter;
use crate::session::{SessionManager, SessionStore};
use crate::sync::SyncTrigger;

/// The shared application state.
///
/// Built once by the composition root and cloned into every handler, guard and
/// resolver. Every collaborator behind a trait object can be swapped for a stand-in,
/// which is how the tests run the full pipeline without Redis, PostgreSQL or the
/// document backend.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Database,
    pub sessions: SessionManager,
    pub directory: Arc<dyn Directory>,
    pub files: FileGateway,
    pub sync: Arc<dyn SyncTrigger>,
    pub graphql: Arc<ResolverRegistry>,
    pub filter: ExceptionFilter,
    pub metrics: Metrics,
}

/// External collaborators the state is wired from.
pub struct Collaborators {
    pub db: Database,
    pub session_store: Arc<dyn SessionStore>,
    pub directory: Arc<dyn Directory>,
    pub documents: Arc<dyn DocumentBackend>,
    pub sync: Arc<dyn SyncTrigger>,
}

impl AppState {
    pub fn new(config: AppConfig, parts: Collaborators) -> Self {
        let metrics = Metrics::new();
        let sessions = SessionManager::new(parts.session_store, &config.session);
        let filter = ExceptionFilter::new(config.server.login_path.clone(), metrics.clone());
        let files = FileGateway::new(parts.documents, metrics.clone());

        Self {
            config: Arc::new(config),
            db: parts.db,
            sessions,
            directory: parts.directory,
            files,
            sync: parts.sync,
            graphql: Arc::new(portal_registry()),
            filter,
            metrics,
        }
    }
}
