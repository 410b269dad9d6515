use serde::Deserialize;

/// Settings a production deployment must override.
pub const DEVELOPMENT_SESSION_SECRET: &str = "portal-development-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Fixed path the exception filter redirects to on 403.
    pub login_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub level: String,
    /// Optional `host:port` of a remote log collector (JSON over UDP).
    pub server: Option<String>,
    pub dir: String,
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub redis_uri: Option<String>,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: u32,
    pub secret: String,
    pub cookie_name: String,
    pub cookie_ttl_secs: u64,
}

impl SessionConfig {
    /// Connection string for the session store. An explicit URI wins over host/port/db.
    pub fn redis_url(&self) -> String {
        match self.redis_uri.as_deref().map(str::trim) {
            Some(uri) if !uri.is_empty() => uri.to_string(),
            _ => format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub schema: String,
    /// Read replicas as `host[:port]`.
    pub replicas: Vec<String>,
    pub max_connections: u32,
    pub logging: bool,
    pub slow_query_threshold_ms: u64,
}

impl DatabaseConfig {
    /// Parses the replica list into `(host, port)` pairs, defaulting to the primary's port.
    pub fn replica_endpoints(&self) -> anyhow::Result<Vec<(String, u16)>> {
        self.replicas
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(|r| match r.rsplit_once(':') {
                Some((host, port)) => {
                    let port = port
                        .parse::<u16>()
                        .map_err(|e| anyhow::anyhow!("invalid database replica '{}': {}", r, e))?;
                    Ok((host.to_string(), port))
                }
                None => Ok((r.to_string(), self.port)),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MicroserviceConfig {
    pub url: String,
    pub sync_pattern: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub session: SessionConfig,
    pub database: DatabaseConfig,
    pub files: FilesConfig,
    pub microservice: MicroserviceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => panic!("Failed to deserialize default config: {}", e),
            },
            Err(e) => panic!("Failed to parse default config: {}", e),
        }
    }
}

/// Environment variables the portal has always been deployed with, mapped onto config keys.
const NAMED_ENV: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("LOG_LEVEL", "log.level"),
    ("LOG_SERVER", "log.server"),
    ("SESSION_REDIS_URI", "session.redis_uri"),
    ("SESSION_REDIS_HOST", "session.redis_host"),
    ("SESSION_REDIS_PORT", "session.redis_port"),
    ("SESSION_REDIS_DB", "session.redis_db"),
    ("SESSION_SECRET", "session.secret"),
    ("SESSION_COOKIE_TTL", "session.cookie_ttl_secs"),
    ("DATABASE_HOST", "database.host"),
    ("DATABASE_PORT", "database.port"),
    ("DATABASE_USERNAME", "database.username"),
    ("DATABASE_PASSWORD", "database.password"),
    ("DATABASE_DATABASE", "database.database"),
    ("DATABASE_SCHEMA", "database.schema"),
    ("DATABASE_MAX_CONNECTIONS", "database.max_connections"),
    ("DATABASE_LOGGING", "database.logging"),
    ("MICROSERVICE_URL", "microservice.url"),
    ("FILES_URL", "files.url"),
];

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: portal.toml (in CWD)
        .add_source(::config::File::with_name("portal").required(false));

    if let Ok(custom_path) = std::env::var("PORTAL_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    builder = builder.add_source(::config::Environment::with_prefix("PORTAL").separator("__"));

    // Named variables last to have highest precedence
    for (var, key) in NAMED_ENV {
        builder = builder.set_override_option(*key, env_value(var))?;
    }
    if let Some(replicas) = env_value("DATABASE_REPLICAS") {
        let list: Vec<String> = replicas
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        builder = builder.set_override("database.replicas", list)?;
    }

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

fn env_value(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    if !cfg.server.login_path.starts_with('/') {
        return Err(anyhow::anyhow!("server.login_path must start with '/'"));
    }

    if cfg.session.secret.is_empty() {
        return Err(anyhow::anyhow!("session.secret must not be empty"));
    }
    if cfg.session.cookie_name.trim().is_empty() {
        return Err(anyhow::anyhow!("session.cookie_name must not be empty"));
    }
    if cfg.session.cookie_ttl_secs == 0 {
        return Err(anyhow::anyhow!("session.cookie_ttl_secs must be > 0"));
    }

    if cfg.database.max_connections == 0 {
        return Err(anyhow::anyhow!("database.max_connections must be > 0"));
    }
    cfg.database.replica_endpoints()?;

    if cfg.files.timeout_secs == 0 {
        return Err(anyhow::anyhow!("files.timeout_secs must be > 0"));
    }
    if cfg.microservice.timeout_secs == 0 {
        return Err(anyhow::anyhow!("microservice.timeout_secs must be > 0"));
    }

    Ok(())
}
