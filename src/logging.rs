//! Process-wide log sink.
//!
//! One subscriber is installed per process. It fans events out to stdout, a daily
//! rolling file and, when `LOG_SERVER` is set, a remote collector that receives one
//! JSON object per event over UDP. The HTTP access log, the database query log and
//! the application log all flow through it and are told apart by their target.

use std::io;
use std::net::UdpSocket;
use std::sync::Arc;

use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{DatabaseConfig, LogConfig};

/// Target used by the HTTP access log.
pub const HTTP_TARGET: &str = "http";
/// Target sqlx uses for statement logging.
pub const DATABASE_TARGET: &str = "sqlx::query";

/// Keeps the non-blocking writers flushing. Hold it until the process exits.
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Maps a configured level name onto a tracing level.
///
/// Accepts the tracing names plus the names older portal deployments use
/// (`silly`, `verbose`, `http`, `log`).
pub fn normalize_level(raw: &str) -> Option<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" | "silly" => Some(Level::TRACE),
        "debug" | "verbose" => Some(Level::DEBUG),
        "info" | "http" | "log" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "fatal" => Some(Level::ERROR),
        _ => None,
    }
}

/// Builds the filter directives for the configured level and query logging.
pub fn filter_directives(log: &LogConfig, database: &DatabaseConfig) -> String {
    let level = normalize_level(&log.level).unwrap_or(Level::INFO);
    let base = level.as_str().to_ascii_lowercase();
    let mut directives = vec![base.clone(), format!("{}={}", HTTP_TARGET, base)];
    if database.logging {
        directives.push(format!("{}=debug", DATABASE_TARGET));
    } else {
        directives.push(format!("{}=warn", DATABASE_TARGET));
    }
    directives.join(",")
}

/// Installs the global subscriber. `RUST_LOG` overrides the computed directives.
pub fn init(log: &LogConfig, database: &DatabaseConfig) -> anyhow::Result<LogGuards> {
    std::fs::create_dir_all(&log.dir).ok();
    let mut guards = Vec::new();

    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);
    let file_appender = tracing_appender::rolling::daily(&log.dir, &log.file);
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    guards.push(file_guard);

    let remote_layer = match log.server.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(addr) => {
            let writer = UdpLogWriter::connect(addr)?;
            let (remote_nb, remote_guard) = tracing_appender::non_blocking(writer);
            guards.push(remote_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(remote_nb)
                    .boxed(),
            )
        }
        None => None,
    };

    if normalize_level(&log.level).is_none() {
        eprintln!("Unknown LOG_LEVEL '{}', falling back to info", log.level);
    }
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(log, database)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .with(remote_layer)
        .try_init()?;

    Ok(LogGuards { _guards: guards })
}

/// Access-log layer: one span per request, one INFO event per response.
pub fn http_trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::INFO)
                .latency_unit(LatencyUnit::Millis),
        )
}

/// Sends every formatted event as a single datagram.
#[derive(Clone)]
pub struct UdpLogWriter {
    socket: Arc<UdpSocket>,
}

impl UdpLogWriter {
    pub fn connect(addr: &str) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(addr)?;
        Ok(Self { socket: Arc::new(socket) })
    }
}

impl io::Write for UdpLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A collector that is down must not take the process with it
        match self.socket.send(buf) {
            Ok(n) => Ok(n),
            Err(_) => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
