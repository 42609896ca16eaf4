use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8084;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_DRIVER_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_HORIZON_DAYS: u32 = 4;
pub const DEFAULT_EXPIRING_NOTICE_DAYS: u32 = 3;
pub const DEFAULT_NOTIFY_QUEUE: usize = 256;

/// Top-level config (sweep.toml + SWEEP_* env overrides).
///
/// Nested keys are separated by a double underscore in the environment,
/// e.g. `SWEEP_SCHEDULER__HORIZON_DAYS=7`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// How incoming HTTP callers are identified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    /// Bearer token validated by the auth service.
    Remote,
    /// Trust `X-User-Id` / `X-User-Role` headers. Local development only.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_mode")]
    pub mode: AuthMode,
    /// Base URL of the auth service, e.g. `http://auth:8081`.
    #[serde(default = "default_auth_url")]
    pub url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: default_auth_mode(),
            url: default_auth_url(),
        }
    }
}

/// Daily driver tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between driver passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Run one pass immediately at startup.
    #[serde(default = "bool_true")]
    pub run_on_startup: bool,
    /// Days ahead of today that count as "due" for materialization.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    /// Days before `end_date` the expiring-soon event is sent.
    #[serde(default = "default_expiring_notice_days")]
    pub expiring_notice_days: u32,
    /// Subscriptions processed concurrently within one pass.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_DRIVER_INTERVAL_SECS,
            run_on_startup: true,
            horizon_days: DEFAULT_HORIZON_DAYS,
            expiring_notice_days: DEFAULT_EXPIRING_NOTICE_DAYS,
            concurrency: default_concurrency(),
        }
    }
}

/// Sibling services the scheduler talks to over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default = "default_orders_url")]
    pub orders_url: String,
    #[serde(default = "default_notifications_url")]
    pub notifications_url: String,
    /// Bearer token the driver presents to the order service.
    pub service_token: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            orders_url: default_orders_url(),
            notifications_url: default_notifications_url(),
            service_token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Capacity of the outbound event queue; events are dropped when full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_NOTIFY_QUEUE,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_auth_mode() -> AuthMode {
    AuthMode::Remote
}
fn default_auth_url() -> String {
    "http://localhost:8081".to_string()
}
fn default_interval_secs() -> u64 {
    DEFAULT_DRIVER_INTERVAL_SECS
}
fn default_horizon_days() -> u32 {
    DEFAULT_HORIZON_DAYS
}
fn default_expiring_notice_days() -> u32 {
    DEFAULT_EXPIRING_NOTICE_DAYS
}
fn default_concurrency() -> usize {
    8
}
fn default_orders_url() -> String {
    "http://localhost:8082".to_string()
}
fn default_notifications_url() -> String {
    "http://localhost:8083".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_queue_capacity() -> usize {
    DEFAULT_NOTIFY_QUEUE
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sweep/sweep.db", home)
}

impl SweepConfig {
    /// Load config from a TOML file with SWEEP_* env var overrides.
    ///
    /// Uses the explicit path when given, else `~/.sweep/sweep.toml`.
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SweepConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SWEEP_").split("__"))
            .extract()
            .map_err(|e| crate::error::SweepError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the driver cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.scheduler.interval_secs == 0 {
            return Err(crate::error::SweepError::Config(
                "scheduler.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.scheduler.concurrency == 0 {
            return Err(crate::error::SweepError::Config(
                "scheduler.concurrency must be greater than zero".to_string(),
            ));
        }
        if self.notifications.queue_capacity == 0 {
            return Err(crate::error::SweepError::Config(
                "notifications.queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.sweep/sweep.toml", home)
}
