use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Request pipeline counters for monitoring
#[derive(Clone)]
pub struct Metrics {
    pub auth_denied: Arc<AtomicU64>,
    pub logins_succeeded: Arc<AtomicU64>,
    pub logins_failed: Arc<AtomicU64>,
    pub faults: Arc<AtomicU64>,
    pub graphql_errors: Arc<AtomicU64>,
    pub file_ops: Arc<AtomicU64>,
    pub file_denied: Arc<AtomicU64>,
    pub sync_triggered: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            auth_denied: Arc::new(AtomicU64::new(0)),
            logins_succeeded: Arc::new(AtomicU64::new(0)),
            logins_failed: Arc::new(AtomicU64::new(0)),
            faults: Arc::new(AtomicU64::new(0)),
            graphql_errors: Arc::new(AtomicU64::new(0)),
            file_ops: Arc::new(AtomicU64::new(0)),
            file_denied: Arc::new(AtomicU64::new(0)),
            sync_triggered: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_auth_denied(&self) {
        self.auth_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_logins_succeeded(&self) {
        self.logins_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_logins_failed(&self) {
        self.logins_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_faults(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_graphql_errors(&self) {
        self.graphql_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_file_ops(&self) {
        self.file_ops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_file_denied(&self) {
        self.file_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sync_triggered(&self) {
        self.sync_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            auth_denied: self.auth_denied.load(Ordering::Relaxed),
            logins_succeeded: self.logins_succeeded.load(Ordering::Relaxed),
            logins_failed: self.logins_failed.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            graphql_errors: self.graphql_errors.load(Ordering::Relaxed),
            file_ops: self.file_ops.load(Ordering::Relaxed),
            file_denied: self.file_denied.load(Ordering::Relaxed),
            sync_triggered: self.sync_triggered.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub auth_denied: u64,
    pub logins_succeeded: u64,
    pub logins_failed: u64,
    pub faults: u64,
    pub graphql_errors: u64,
    pub file_ops: u64,
    pub file_denied: u64,
    pub sync_triggered: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let counters: [(&str, &str, u64); 8] = [
            ("portal_auth_denied", "Requests denied by the auth guard", self.auth_denied),
            ("portal_logins_succeeded", "Successful logins", self.logins_succeeded),
            ("portal_logins_failed", "Rejected logins", self.logins_failed),
            ("portal_faults", "Faults handled by the exception filter", self.faults),
            ("portal_graphql_errors", "GraphQL field errors", self.graphql_errors),
            ("portal_file_ops", "File operations delegated to the document backend", self.file_ops),
            ("portal_file_denied", "File operations refused before delegation", self.file_denied),
            ("portal_sync_triggered", "Directory synchronizations triggered", self.sync_triggered),
        ];

        let mut body = String::new();
        for (name, help, value) in counters {
            body.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        }
        body.push_str(&format!(
            "# HELP portal_uptime_seconds Uptime seconds\n# TYPE portal_uptime_seconds gauge\nportal_uptime_seconds {}\n",
            self.uptime_seconds
        ));
        body
    }
}
