use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::LevelFilter;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;

use crate::config::DatabaseConfig;

/// Primary pool for writes plus read replicas.
///
/// Reads rotate over the replicas; without replicas they go to the primary. All pools
/// connect lazily so the server can start while the database is still coming up.
#[derive(Clone)]
pub struct Database {
    primary: PgPool,
    replicas: Arc<[PgPool]>,
    next: Arc<AtomicUsize>,
}

fn connect_options(cfg: &DatabaseConfig, host: &str, port: u16) -> PgConnectOptions {
    let opts = PgConnectOptions::new()
        .host(host)
        .port(port)
        .username(&cfg.username)
        .database(&cfg.database)
        .options([("search_path", cfg.schema.as_str())]);
    let opts = if cfg.password.is_empty() { opts } else { opts.password(&cfg.password) };

    // Statements go to the `sqlx::query` target and through the log sink
    let statements = if cfg.logging { LevelFilter::Debug } else { LevelFilter::Off };
    opts.log_statements(statements).log_slow_statements(
        LevelFilter::Warn,
        Duration::from_millis(cfg.slow_query_threshold_ms),
    )
}

fn lazy_pool(cfg: &DatabaseConfig, opts: PgConnectOptions) -> PgPool {
    PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy_with(opts)
}

impl Database {
    pub fn connect_lazy(cfg: &DatabaseConfig) -> anyhow::Result<Self> {
        let primary = lazy_pool(cfg, connect_options(cfg, &cfg.host, cfg.port));
        let replicas: Vec<PgPool> = cfg
            .replica_endpoints()?
            .into_iter()
            .map(|(host, port)| lazy_pool(cfg, connect_options(cfg, &host, port)))
            .collect();

        tracing::info!(
            "Database {} on {}:{} (schema {}, {} read replica(s))",
            cfg.database,
            cfg.host,
            cfg.port,
            cfg.schema,
            replicas.len()
        );

        Ok(Self { primary, replicas: replicas.into(), next: Arc::new(AtomicUsize::new(0)) })
    }

    pub fn writer(&self) -> &PgPool {
        &self.primary
    }

    pub fn reader(&self) -> &PgPool {
        if self.replicas.is_empty() {
            return &self.primary;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
        &self.replicas[i]
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.primary).await?;
        Ok(())
    }
}

/// Quotes an identifier for interpolation into DDL.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub async fn init_db(db: &Database, schema: &str) -> anyhow::Result<()> {
    let pool = db.writer();

    if schema != "public" {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
            .execute(pool)
            .await?;
    }

    // One row per directory identity, mirrored by the directory sync job
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            login TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            email TEXT NULL,
            department TEXT NULL,
            title TEXT NULL,
            gender TEXT NULL,
            phone TEXT NULL,
            is_admin BOOLEAN NOT NULL DEFAULT FALSE,
            password_hash TEXT NULL,
            synced_at TIMESTAMPTZ NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    )
    .execute(pool)
    .await?;

    if let Err(e) =
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_department ON users(department)")
            .execute(pool)
            .await
    {
        tracing::warn!("Failed to create index idx_users_department: {}", e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("portal"), "\"portal\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
