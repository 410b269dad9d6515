#[cfg(test)]
mod tests {
    use crate::config::AppConfig;
    use crate::db::Database;
    use sqlx::PgPool;

    fn endpoint(pool: &PgPool) -> (String, u16) {
        let opts = pool.connect_options();
        (opts.get_host().to_string(), opts.get_port())
    }

    fn database_config(replicas: &[&str]) -> crate::config::DatabaseConfig {
        let mut cfg = AppConfig::default().database;
        cfg.host = "primary.example.test".to_string();
        cfg.port = 5432;
        cfg.replicas = replicas.iter().map(|r| r.to_string()).collect();
        cfg
    }

    #[tokio::test]
    async fn test_reads_rotate_over_replicas() {
        let db = Database::connect_lazy(&database_config(&["r1.example.test:5433", "r2.example.test"]))
            .unwrap();
        assert_eq!(db.replica_count(), 2);

        let first = endpoint(db.reader());
        let second = endpoint(db.reader());
        let third = endpoint(db.reader());

        assert_ne!(first, second);
        assert_eq!(first, third);
        let mut seen = vec![first, second];
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("r1.example.test".to_string(), 5433),
                ("r2.example.test".to_string(), 5432),
            ]
        );
    }

    #[tokio::test]
    async fn test_writes_go_to_primary() {
        let db = Database::connect_lazy(&database_config(&["r1.example.test"])).unwrap();
        assert_eq!(endpoint(db.writer()), ("primary.example.test".to_string(), 5432));
    }

    #[tokio::test]
    async fn test_reads_use_primary_without_replicas() {
        let db = Database::connect_lazy(&database_config(&[])).unwrap();
        assert_eq!(db.replica_count(), 0);
        assert_eq!(endpoint(db.reader()), ("primary.example.test".to_string(), 5432));
        assert_eq!(endpoint(db.reader()), ("primary.example.test".to_string(), 5432));
    }

    #[tokio::test]
    async fn test_blank_replica_entries_are_skipped() {
        let db = Database::connect_lazy(&database_config(&["", "  "])).unwrap();
        assert_eq!(db.replica_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_replica_port() {
        assert!(Database::connect_lazy(&database_config(&["r1.example.test:99999"])).is_err());
    }

    #[tokio::test]
    async fn test_ping_fails_without_server() {
        let mut cfg = database_config(&[]);
        cfg.host = "127.0.0.1".to_string();
        cfg.port = 1;
        let db = Database::connect_lazy(&cfg).unwrap();
        assert!(db.ping().await.is_err());
    }
}
