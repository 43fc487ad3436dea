//! DataGuard configuration management
//!
//! Duration-valued settings are plain integer fields (seconds or days) so
//! configs serialize cleanly; accessor methods convert to [`Duration`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main DataGuard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataGuardConfig {
    /// Key manager configuration
    #[serde(default)]
    pub keys: KeyManagerConfig,

    /// Access controller configuration
    #[serde(default)]
    pub access: AccessConfig,

    /// Retention scheduler configuration
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Key manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyManagerConfig {
    /// Key size in bytes (32 = AES-256)
    pub key_size: usize,

    /// Scheduled rotation interval in seconds
    pub rotation_interval_secs: u64,

    /// Grace period in seconds before a rotated key is archived
    pub grace_period_secs: u64,

    /// Retention in seconds before an archived key is securely destroyed
    pub archive_retention_secs: u64,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            key_size: 32,
            rotation_interval_secs: 90 * 24 * 3600,             // 90 days
            grace_period_secs: 24 * 3600,                       // 24 hours
            archive_retention_secs: 7 * 365 * 24 * 3600,        // 7 years
        }
    }
}

impl KeyManagerConfig {
    /// Scheduled rotation interval
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    /// Grace period before archival
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Retention before secure destruction
    pub fn archive_retention(&self) -> Duration {
        Duration::from_secs(self.archive_retention_secs)
    }
}

/// Access controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Session timeout in seconds
    pub session_timeout_secs: u64,

    /// Failed login attempts before an account is locked
    pub max_failed_attempts: u32,

    /// Lockout duration in seconds
    pub lockout_duration_secs: u64,

    /// Require MFA verification for high-risk operations
    pub require_mfa: bool,

    /// Enable privilege escalation detection and risk scoring
    pub escalation_detection: bool,

    /// Interval in seconds between expired-session sweeps
    pub sweep_interval_secs: u64,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 8 * 3600,
            max_failed_attempts: 5,
            lockout_duration_secs: 30 * 60,
            require_mfa: true,
            escalation_detection: true,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl AccessConfig {
    /// Session timeout
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Account lockout duration
    pub fn lockout_duration(&self) -> Duration {
        Duration::from_secs(self.lockout_duration_secs)
    }

    /// Expired-session sweep interval
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Retention scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Interval in seconds between purge-job processing ticks
    pub tick_interval_secs: u64,

    /// Register the default category policies at startup
    pub install_default_policies: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 3600,
            install_default_policies: true,
        }
    }
}

impl RetentionConfig {
    /// Purge-job processing interval
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}
