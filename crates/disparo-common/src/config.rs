//! Configuration for Disparo

use serde::{Deserialize, Serialize};

/// Environment variable pointing at an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "DISPARO_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Webhook transport configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Campaign scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Campaign health monitor configuration
    #[serde(default)]
    pub health: HealthConfig,

    /// Conversation recovery configuration
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Instance name reported in outbound envelopes
    #[serde(default = "default_instance")]
    pub instance: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
        }
    }
}

fn default_instance() -> String {
    "disparo".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable the HTTP API
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,

    /// API bind address
    #[serde(default = "default_api_bind")]
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            bind: default_api_bind(),
        }
    }
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// How a relay transport forwards the target URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayKind {
    /// Target URL appended to the relay base (`https://relay/` + target)
    Prefix,
    /// Target URL passed as a query parameter (`https://relay/?url=target`)
    Query,
}

/// Intermediary relay used when direct delivery fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Name reported as `method_used` on success
    pub name: String,

    /// Forwarding style
    pub kind: RelayKind,

    /// Relay base URL
    pub base_url: String,

    /// Query parameter carrying the target (query relays only)
    #[serde(default = "default_relay_param")]
    pub param: String,
}

fn default_relay_param() -> String {
    "url".to_string()
}

/// Webhook transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-request timeout in seconds; unset leaves the client default
    pub timeout_secs: Option<u64>,

    /// Relays tried in order after the direct call fails
    #[serde(default)]
    pub relays: Vec<RelayConfig>,
}

/// Campaign scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Enable the scheduler timer
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between scheduler ticks
    #[serde(default = "default_scheduler_interval")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_scheduler_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_scheduler_interval() -> u64 {
    5
}

/// Timeout in minutes per declared campaign class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassTimeouts {
    #[serde(default = "default_immediate_timeout")]
    pub immediate: i64,
    #[serde(default = "default_scheduled_timeout")]
    pub scheduled: i64,
    #[serde(default = "default_bulk_timeout")]
    pub bulk: i64,
    #[serde(default = "default_long_running_timeout")]
    pub long_running: i64,
}

impl Default for ClassTimeouts {
    fn default() -> Self {
        Self {
            immediate: default_immediate_timeout(),
            scheduled: default_scheduled_timeout(),
            bulk: default_bulk_timeout(),
            long_running: default_long_running_timeout(),
        }
    }
}

fn default_immediate_timeout() -> i64 {
    5
}

fn default_scheduled_timeout() -> i64 {
    10
}

fn default_bulk_timeout() -> i64 {
    30
}

fn default_long_running_timeout() -> i64 {
    120
}

/// Campaign health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Enable the health monitor timer
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between health checks
    #[serde(default = "default_health_interval")]
    pub poll_interval_secs: u64,

    /// Timeout in minutes for campaigns without a declared class
    #[serde(default = "default_base_timeout")]
    pub base_timeout_minutes: i64,

    /// Timeouts per declared class
    #[serde(default)]
    pub class_timeouts: ClassTimeouts,

    /// How recent an acknowledgement must be to extend the timeout
    #[serde(default = "default_ack_window")]
    pub ack_window_minutes: i64,

    /// Extended timeout when an acknowledgement carries no custom value
    #[serde(default = "default_ack_timeout")]
    pub ack_default_timeout_minutes: i64,

    /// Where stuck-campaign notifications go; falls back to the campaign webhook
    pub notify_url: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_health_interval(),
            base_timeout_minutes: default_base_timeout(),
            class_timeouts: ClassTimeouts::default(),
            ack_window_minutes: default_ack_window(),
            ack_default_timeout_minutes: default_ack_timeout(),
            notify_url: None,
        }
    }
}

fn default_health_interval() -> u64 {
    120
}

fn default_base_timeout() -> i64 {
    15
}

fn default_ack_window() -> i64 {
    5
}

fn default_ack_timeout() -> i64 {
    60
}

/// When a freshly activated conversation first becomes due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Due after the first flow step's own delay
    #[default]
    Immediate,
    /// Due after the rule's timeout
    AfterTimeout,
}

/// Conversation recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Enable the recovery sweep timer
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between recovery sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Activation timing
    #[serde(default)]
    pub activation_mode: ActivationMode,

    /// Webhook used by flow steps without an override
    pub default_webhook_url: Option<String>,

    /// Event name placed on recovery deliveries
    #[serde(default = "default_recovery_event")]
    pub event: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: default_sweep_interval(),
            activation_mode: ActivationMode::default(),
            default_webhook_url: None,
            event: default_recovery_event(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_recovery_event() -> String {
    "recovery_message".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from the environment override or default locations
    pub fn load() -> crate::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(std::path::Path::new(&path));
        }

        let paths = [
            std::path::PathBuf::from("./disparo.toml"),
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/disparo/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_sections() {
        let health = HealthConfig::default();
        assert_eq!(health.poll_interval_secs, 120);
        assert_eq!(health.base_timeout_minutes, 15);
        assert_eq!(health.class_timeouts.long_running, 120);

        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.poll_interval_secs, 5);

        let recovery = RecoveryConfig::default();
        assert_eq!(recovery.sweep_interval_secs, 60);
        assert_eq!(recovery.activation_mode, ActivationMode::Immediate);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
instance = "loja-centro"

[database]
backend = "postgres"
url = "postgres://localhost/disparo"

[logging]
format = "text"

[[webhook.relays]]
name = "corsproxy"
kind = "query"
base_url = "https://relay.example.com/"

[[webhook.relays]]
name = "prefix-relay"
kind = "prefix"
base_url = "https://proxy.example.com/"

[health]
base_timeout_minutes = 20

[health.class_timeouts]
bulk = 45

[recovery]
activation_mode = "after_timeout"
default_webhook_url = "https://n8n.example.com/webhook/recovery"
"#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.server.instance, "loja-centro");
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/disparo"));
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.webhook.relays.len(), 2);
        assert_eq!(config.webhook.relays[0].kind, RelayKind::Query);
        assert_eq!(config.webhook.relays[0].param, "url");
        assert_eq!(config.health.base_timeout_minutes, 20);
        assert_eq!(config.health.class_timeouts.bulk, 45);
        assert_eq!(config.health.class_timeouts.immediate, 5);
        assert_eq!(config.recovery.activation_mode, ActivationMode::AfterTimeout);
        assert_eq!(config.scheduler.poll_interval_secs, 5);
    }

    #[test]
    fn test_missing_database_is_rejected() {
        let err = Config::from_toml("[server]\ninstance = \"x\"\n").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
