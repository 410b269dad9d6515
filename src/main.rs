use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use portal::config::{self, DEVELOPMENT_SESSION_SECRET};
use portal::db::{self, Database};
use portal::directory::PgDirectory;
use portal::files::HttpDocumentBackend;
use portal::logging;
use portal::routes;
use portal::session::RedisSessionStore;
use portal::state::{AppState, Collaborators};
use portal::sync::RedisSyncClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration (embedded defaults -> portal.toml -> env/.env)
    let app_cfg = config::load()?;

    // Logging (stdout + daily rolling file + optional remote collector)
    let _log_guards = logging::init(&app_cfg.log, &app_cfg.database)?;
    if app_cfg.session.secret == DEVELOPMENT_SESSION_SECRET {
        tracing::warn!("Using the development session secret - set SESSION_SECRET in production");
    }

    // Sessions cannot fall back to process memory: without the store, nobody can sign in
    let session_store = RedisSessionStore::connect(&app_cfg.session.redis_url()).await?;

    let db = Database::connect_lazy(&app_cfg.database)?;
    db::init_db(&db, &app_cfg.database.schema).await?;

    let documents = HttpDocumentBackend::new(&app_cfg.files)?;
    let sync = RedisSyncClient::new(&app_cfg.microservice)?;

    let state = AppState::new(
        app_cfg.clone(),
        Collaborators {
            db: db.clone(),
            session_store: Arc::new(session_store),
            directory: Arc::new(PgDirectory::new(db)),
            documents: Arc::new(documents),
            sync: Arc::new(sync),
        },
    );
    let app = routes::router(state);

    let host = app_cfg.server.host.clone();
    let port = app_cfg.server.port;
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Portal listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
