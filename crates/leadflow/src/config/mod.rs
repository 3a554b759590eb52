use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::leads::{LeadStatus, ScoringConfig};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub leads: LeadEngineConfig,
    pub webhooks: WebhookConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let mut distribution = DistributionConfig::default();
        if let Ok(raw) = env::var("LEADFLOW_AUTO_REASSIGN") {
            distribution.auto_reassign_on_deactivation = parse_flag("LEADFLOW_AUTO_REASSIGN", &raw)?;
        }
        if let Ok(raw) = env::var("LEADFLOW_UNTREATED_STATUSES") {
            distribution.untreated_statuses = parse_statuses(&raw)?;
        }

        let confirmation_ttl_hours = match env::var("LEADFLOW_CONFIRMATION_TTL_HOURS") {
            Ok(raw) => parse_number("LEADFLOW_CONFIRMATION_TTL_HOURS", &raw)?,
            Err(_) => DEFAULT_CONFIRMATION_TTL_HOURS,
        };
        if confirmation_ttl_hours > MAX_CONFIRMATION_TTL_HOURS {
            return Err(ConfigError::InvalidValue {
                key: "LEADFLOW_CONFIRMATION_TTL_HOURS",
                value: confirmation_ttl_hours.to_string(),
            });
        }

        let mut webhooks = WebhookConfig::default();
        if let Ok(raw) = env::var("LEADFLOW_WEBHOOK_MAX_ATTEMPTS") {
            webhooks.max_attempts = parse_number("LEADFLOW_WEBHOOK_MAX_ATTEMPTS", &raw)?;
        }
        if let Ok(raw) = env::var("LEADFLOW_WEBHOOK_BACKOFF_MS") {
            webhooks.backoff_base_ms = parse_number("LEADFLOW_WEBHOOK_BACKOFF_MS", &raw)?;
        }

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            leads: LeadEngineConfig {
                distribution,
                scoring: ScoringConfig::default(),
                confirmation_ttl_hours,
            },
            webhooks,
        })
    }
}

const DEFAULT_CONFIRMATION_TTL_HOURS: u32 = 48;
/// A leap year.
const MAX_CONFIRMATION_TTL_HOURS: u32 = 24 * 366;

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn parse_statuses(raw: &str) -> Result<Vec<LeadStatus>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(|label| {
            LeadStatus::from_label(label).ok_or_else(|| ConfigError::UnknownStatus(label.to_string()))
        })
        .collect()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Rules handed to the lead service instead of being read from ambient state.
#[derive(Debug, Clone)]
pub struct LeadEngineConfig {
    pub distribution: DistributionConfig,
    pub scoring: ScoringConfig,
    pub confirmation_ttl_hours: u32,
}

impl Default for LeadEngineConfig {
    fn default() -> Self {
        Self {
            distribution: DistributionConfig::default(),
            scoring: ScoringConfig::default(),
            confirmation_ttl_hours: DEFAULT_CONFIRMATION_TTL_HOURS,
        }
    }
}

/// Reassignment switches for agent deactivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionConfig {
    pub auto_reassign_on_deactivation: bool,
    /// Statuses whose leads move off a deactivated agent.
    pub untreated_statuses: Vec<LeadStatus>,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            auto_reassign_on_deactivation: true,
            untreated_statuses: vec![
                LeadStatus::PendingCall,
                LeadStatus::EmailConfirmed,
                LeadStatus::CallbackPending,
            ],
        }
    }
}

/// Delivery policy for the webhook worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl WebhookConfig {
    /// Delay before retry number `attempt` (1-based), doubling each time.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << exponent))
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 10_000,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    UnknownStatus(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::UnknownStatus(label) => {
                write!(f, "LEADFLOW_UNTREATED_STATUSES contains unknown status '{label}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::UnknownStatus(_) => None,
        }
    }
}
