use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(super) server: ServerSettings,
    pub(super) runtime: RuntimeSettings,
    pub(super) api: ApiSettings,
    pub(super) security: SecuritySettings,
    pub(super) cors: CorsSettings,
    pub(super) database: DatabaseSettings,
    pub(super) redis: RedisSettings,
    pub(super) s3: S3Settings,
    pub(super) exam: ExamSettings,
    pub(super) admin: AdminSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerSettings {
    pub(super) host: ServerHost,
    pub(super) port: ServerPort,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiSettings {
    pub(crate) project_name: String,
    pub(crate) version: String,
    pub(crate) api_v1_str: String,
}

#[derive(Debug, Clone)]
pub(crate) struct SecuritySettings {
    pub(crate) secret_key: String,
    pub(crate) access_token_expire_minutes: u64,
    pub(crate) algorithm: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CorsSettings {
    pub(crate) origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct DatabaseSettings {
    pub(crate) server: String,
    pub(crate) port: u16,
    pub(crate) user: String,
    pub(crate) password: String,
    pub(crate) name: String,
    pub(crate) max_connections: u32,
    pub(crate) url: Option<String>,
}

impl DatabaseSettings {
    /// An explicit DATABASE_URL wins over the assembled POSTGRES_* parts.
    pub(crate) fn database_url(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!(
                "postgresql://{user}:{password}@{server}:{port}/{name}",
                user = self.user,
                password = self.password,
                server = self.server,
                port = self.port,
                name = self.name
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RedisSettings {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) db: u16,
    pub(crate) password: String,
}

impl RedisSettings {
    pub(crate) fn redis_url(&self) -> String {
        let credentials =
            if self.password.is_empty() { String::new() } else { format!(":{}@", self.password) };
        format!("redis://{credentials}{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct S3Settings {
    pub(crate) endpoint: String,
    pub(crate) access_key: String,
    pub(crate) secret_key: String,
    pub(crate) bucket: String,
    pub(crate) region: String,
}

impl S3Settings {
    pub(crate) fn is_configured(&self) -> bool {
        !self.access_key.is_empty() && !self.secret_key.is_empty() && !self.bucket.is_empty()
    }
}

/// Sweep cadence and invalidation buffer for the live session layer.
#[derive(Debug, Clone)]
pub(crate) struct ExamSettings {
    pub(crate) sweep_interval_seconds: u64,
    pub(crate) change_feed_capacity: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct AdminSettings {
    pub(crate) first_admin_email: String,
    pub(crate) first_admin_password: String,
}

#[derive(Debug, Clone)]
pub(crate) struct TelemetrySettings {
    pub(crate) log_level: String,
    pub(crate) json: bool,
    pub(crate) prometheus_enabled: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) environment: Environment,
    pub(crate) strict_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Test => "test",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ServerHost(pub(super) String);

impl ServerHost {
    pub(super) fn parse(value: String) -> Result<Self, ConfigError> {
        match value.trim() {
            "" => Err(ConfigError::InvalidHost(value)),
            _ => Ok(Self(value)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ServerPort(pub(super) u16);

impl ServerPort {
    pub(super) fn parse(value: String) -> Result<Self, ConfigError> {
        match value.parse::<u16>() {
            Ok(port) if port > 0 => Ok(Self(port)),
            _ => Err(ConfigError::InvalidPort(value)),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("invalid bind host: {0}")]
    InvalidHost(String),
    #[error("invalid bind port: {0}")]
    InvalidPort(String),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("invalid cors origins: {0}")]
    InvalidCors(String),
    #[error("missing required secret {0}")]
    MissingSecret(&'static str),
}
