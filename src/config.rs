/// Configuration management for the coregate engine
use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Email of the identity seeded when a fresh store is created.
pub const BOOTSTRAP_ADMIN_EMAIL: &str = "admin";

/// Secret of the seeded admin identity. Unsuitable for production as
/// shipped; rotate it immediately after first login.
pub const BOOTSTRAP_ADMIN_SECRET: &str = "admin";

/// Fixed secret assigned by the admin "quick add" helper. Unsuitable for
/// production as shipped.
pub const QUICK_ADD_DEFAULT_SECRET: &str = "chop1234";

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub sso: SsoConfig,
    pub logging: LoggingConfig,
}

/// Device-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Label stamped on every session event recorded from this station
    pub device_name: String,
    pub device_type: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub core_db: PathBuf,
}

/// Idle-timeout supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How often the activity position is sampled
    pub idle_check_interval_ms: u64,
    /// Cumulative idle budget before forced logout
    pub auto_logout_ms: u64,
}

/// External SSO login flow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoConfig {
    /// Where the external login flow starts
    pub landing_url: String,
    /// Pre-login location restored on cancel or timeout
    pub home_url: String,
    /// Profile page scraped after a completed external login
    pub profile_url: String,
    pub poll_interval_ms: u64,
    pub overall_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl GateConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> GateResult<Self> {
        dotenv::dotenv().ok();

        let device_name = env::var("GATE_DEVICE_NAME").unwrap_or_else(|_| "station".to_string());
        let device_type = env::var("GATE_DEVICE_TYPE").unwrap_or_else(|_| "instrument".to_string());

        let data_directory: PathBuf = env::var("GATE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let core_db = env::var("GATE_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("cores.sqlite"));

        let idle_check_interval_ms = parse_ms("GATE_IDLE_CHECK_INTERVAL_MS", 1_000)?;
        let auto_logout_ms = parse_ms("GATE_AUTO_LOGOUT_MS", 600_000)?;

        let landing_url = env::var("GATE_SSO_LANDING_URL").unwrap_or_default();
        let home_url = env::var("GATE_HOME_URL").unwrap_or_default();
        let profile_url = env::var("GATE_SSO_PROFILE_URL").unwrap_or_default();
        let poll_interval_ms = parse_ms("GATE_SSO_POLL_INTERVAL_MS", 1_000)?;
        let overall_timeout_ms = parse_ms("GATE_SSO_TIMEOUT_MS", 100_000)?;

        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(GateConfig {
            service: ServiceConfig {
                device_name,
                device_type,
            },
            storage: StorageConfig {
                data_directory,
                core_db,
            },
            session: SessionConfig {
                idle_check_interval_ms,
                auto_logout_ms,
            },
            sso: SsoConfig {
                landing_url,
                home_url,
                profile_url,
                poll_interval_ms,
                overall_timeout_ms,
            },
            logging: LoggingConfig { level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> GateResult<()> {
        if self.service.device_name.is_empty() {
            return Err(GateError::Validation(
                "Device name cannot be empty".to_string(),
            ));
        }

        if self.session.idle_check_interval_ms == 0 {
            return Err(GateError::Validation(
                "Idle check interval must be non-zero".to_string(),
            ));
        }

        if self.session.auto_logout_ms < self.session.idle_check_interval_ms {
            return Err(GateError::Validation(
                "Auto-logout budget must be at least one idle check interval".to_string(),
            ));
        }

        if self.sso.poll_interval_ms == 0 || self.sso.overall_timeout_ms == 0 {
            return Err(GateError::Validation(
                "SSO timers must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_ms(var: &str, default: u64) -> GateResult<u64> {
    match env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| GateError::Validation(format!("{} must be an integer", var))),
        Err(_) => Ok(default),
    }
}
