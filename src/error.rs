//! DataGuard error types
//!
//! The taxonomy distinguishes by-design permanent outcomes (crypto-shredding,
//! one-way algorithms) from transient failures and from configuration errors,
//! so callers can tell an expected erasure result apart from a bug.

use thiserror::Error;

/// DataGuard error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration or validation error. Carries every violation found,
    /// never just the first one.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// No key is currently in the `Active` state. Should not occur after
    /// the key manager has been initialized.
    #[error("no active key available")]
    NoActiveKey,

    /// The requested key version does not exist. This is the permanent
    /// outcome for revoked (crypto-shredded) keys.
    #[error("key version {0} not found")]
    KeyNotFound(u32),

    /// The data was produced by a one-way algorithm and can never be
    /// reversed. An expected outcome, not a fault.
    #[error("pseudonymized data is not reversible: {0}")]
    NotReversible(&'static str),

    /// Tokenized data requires an external secure token vault to reverse,
    /// and no vault backend is wired in.
    #[error("token vault not available for de-tokenization")]
    VaultUnavailable,

    /// Transient cryptographic failure (cipher setup, entropy, decode).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// User lookup failed
    #[error("user {0} not found")]
    UserNotFound(String),

    /// User already registered
    #[error("user {0} already exists")]
    UserExists(String),

    /// User account is inactive
    #[error("user account {0} is inactive")]
    UserInactive(String),

    /// User account is locked out
    #[error("user account {0} is locked")]
    UserLocked(String),

    /// Role lookup failed
    #[error("role {0} not found")]
    RoleNotFound(String),

    /// Assigning an already-held role is rejected explicitly, not ignored
    #[error("user {user} already has role {role}")]
    RoleAlreadyAssigned {
        /// User identifier
        user: String,
        /// Role identifier
        role: String,
    },

    /// The role is not held, so it cannot be revoked
    #[error("user {user} does not have role {role}")]
    RoleNotAssigned {
        /// User identifier
        user: String,
        /// Role identifier
        role: String,
    },

    /// The role is configured to require an administrative approval workflow
    #[error("role {0} requires administrative approval")]
    RoleRequiresApproval(String),

    /// Session lookup failed
    #[error("session {0} not found")]
    SessionNotFound(String),

    /// The session is past its expiry
    #[error("session {0} has expired")]
    SessionExpired(String),

    /// Privilege escalation scored above the approval threshold without
    /// a named approver
    #[error("privilege escalation requires approval (risk score {risk_score:.2})")]
    EscalationRequiresApproval {
        /// Computed risk score in [0, 1]
        risk_score: f64,
    },

    /// Retention policy lookup failed
    #[error("retention policy {0} not found")]
    PolicyNotFound(String),

    /// Purge job lookup failed
    #[error("purge job {0} not found")]
    JobNotFound(String),

    /// The purge job has already reached a terminal status
    #[error("purge job {id} is already {status}")]
    JobAlreadyTerminal {
        /// Job identifier
        id: String,
        /// Terminal status the job reached
        status: String,
    },

    /// Legal hold lookup failed
    #[error("legal hold {0} not found")]
    HoldNotFound(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for DataGuard operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error is a by-design permanent outcome rather than a
    /// transient fault. Permanent outcomes are expected during normal
    /// operation (crypto-shredding, one-way algorithms) and should not be
    /// retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::NotReversible(_) | Error::VaultUnavailable | Error::KeyNotFound(_)
        )
    }
}
