//! RBAC data model
//!
//! Users, roles, permissions and sessions, with the GDPR metadata the
//! compliance core needs: data categories, processing purposes, legal bases
//! and consent records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordinal data sensitivity label. The derived ordering is the access rule:
/// a permission grants access to data at or below its own level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    /// Freely shareable
    #[default]
    Public,
    /// Internal use only
    Internal,
    /// Personal data, restricted handling
    Confidential,
    /// Highest sensitivity (audit logs, key material)
    Restricted,
}

impl std::fmt::Display for DataClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Internal => write!(f, "internal"),
            Self::Confidential => write!(f, "confidential"),
            Self::Restricted => write!(f, "restricted"),
        }
    }
}

impl std::str::FromStr for DataClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "internal" => Ok(Self::Internal),
            "confidential" => Ok(Self::Confidential),
            "restricted" => Ok(Self::Restricted),
            other => Err(format!("unknown data classification: {}", other)),
        }
    }
}

/// A (resource, action) access right with its risk profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    /// Stable identifier, referenced by roles
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// What the permission allows
    pub description: String,
    /// Resource the permission applies to; `*` is a wildcard
    pub resource: String,
    /// Action allowed on the resource; `*` is a wildcard
    pub action: String,
    /// Highest data classification this permission may touch
    pub data_classification: DataClassification,
    /// Caller must supply a business justification
    pub requires_justification: bool,
    /// Subject to MFA, justification and classification gates
    pub is_high_risk: bool,
}

impl Permission {
    /// Whether this permission covers the requested resource/action pair.
    /// `*` in either field matches anything.
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        (self.resource == resource || self.resource == "*")
            && (self.action == action || self.action == "*")
    }
}

/// Restricts when sessions under a role may operate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRestrictions {
    /// Allowed hours of day (0-23)
    pub allowed_hours: Vec<u32>,
    /// Allowed days of week ("monday"... lowercase)
    pub allowed_days: Vec<String>,
}

/// Named bundle of permissions with GDPR processing metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Stable identifier, referenced by users
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// What the role is for
    pub description: String,
    /// Permission ids granted by this role
    pub permissions: Vec<String>,
    /// GDPR data categories this role may process
    pub data_categories: Vec<String>,
    /// GDPR processing purposes
    pub processing_purposes: Vec<String>,
    /// GDPR Article 6/9 legal bases
    pub legal_bases: Vec<String>,
    /// Shipped with the system, not administrator-created
    pub is_built_in: bool,
    /// Assignment must go through an approval workflow
    pub requires_approval: bool,
    /// Session duration cap in seconds, overriding the default timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_session_duration_secs: Option<u64>,
    /// Optional time-of-day/day-of-week restrictions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_restrictions: Option<TimeRestrictions>,
}

/// GDPR consent record attached to a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Data category the consent covers
    pub data_category: String,
    /// Processing purpose consented to
    pub processing_purpose: String,
    /// Legal basis the consent supports
    pub legal_basis: String,
    /// Whether consent is currently granted
    pub granted: bool,
    /// When consent was given
    pub granted_at: DateTime<Utc>,
    /// When consent was withdrawn, if it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawn_at: Option<DateTime<Utc>>,
}

/// A system user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier
    pub id: String,
    /// Login name
    pub username: String,
    /// Contact email
    pub email: String,
    /// Assigned role ids
    pub roles: Vec<String>,
    /// Account enabled
    pub is_active: bool,
    /// Locked out after repeated failures
    pub is_locked: bool,
    /// Consecutive failed login attempts
    pub failed_attempts: u32,
    /// Timestamp of the last failed attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failed_attempt: Option<DateTime<Utc>>,
    /// Timestamp of the last successful session creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    /// User has an MFA factor enrolled
    pub mfa_enabled: bool,
    /// Consent records for this data subject
    #[serde(default)]
    pub consent_records: Vec<ConsentRecord>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new active, unlocked user with no roles.
    pub fn new(id: impl Into<String>, username: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
            roles: Vec::new(),
            is_active: true,
            is_locked: false,
            failed_attempts: 0,
            last_failed_attempt: None,
            last_login: None,
            mfa_enabled: false,
            consent_records: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// An authenticated session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
    /// Last successful access through this session
    pub last_activity: DateTime<Utc>,
    /// Source IP address, empty when unknown
    pub ip_address: String,
    /// Client user agent
    pub user_agent: String,
    /// MFA has been verified for this session
    pub mfa_verified: bool,
    /// Time-boxed additional permission ids
    #[serde(default)]
    pub elevated_privileges: Vec<String>,
    /// Expiry of the elevated privileges; never later than `expires_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevated_expires_at: Option<DateTime<Utc>>,
    /// Accessed resources and their last access time
    #[serde(default)]
    pub accessed_resources: HashMap<String, DateTime<Utc>>,
}

impl Session {
    /// Whether the session is past its hard expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Elevated privilege ids still in force at `now`
    pub fn active_elevated(&self, now: DateTime<Utc>) -> &[String] {
        match self.elevated_expires_at {
            Some(until) if now <= until => &self.elevated_privileges,
            _ => &[],
        }
    }
}

/// Context supplied with an access request
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    /// Business justification for the access
    pub justification: Option<String>,
    /// Classification of the data being accessed
    pub data_classification: Option<DataClassification>,
    /// GDPR data category being accessed
    pub data_category: Option<String>,
}

impl AccessContext {
    /// Context with a justification only
    pub fn with_justification(justification: impl Into<String>) -> Self {
        Self {
            justification: Some(justification.into()),
            ..Default::default()
        }
    }
}

/// RBAC metrics for operational visibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacMetrics {
    /// Registered users
    pub total_users: usize,
    /// Users with active accounts
    pub active_users: usize,
    /// Locked-out users
    pub locked_users: usize,
    /// Registered roles
    pub total_roles: usize,
    /// Registered permissions
    pub total_permissions: usize,
    /// Unexpired sessions
    pub active_sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_ordering() {
        assert!(DataClassification::Public < DataClassification::Internal);
        assert!(DataClassification::Internal < DataClassification::Confidential);
        assert!(DataClassification::Confidential < DataClassification::Restricted);
    }

    #[test]
    fn test_classification_parse() {
        assert_eq!(
            "restricted".parse::<DataClassification>().unwrap(),
            DataClassification::Restricted
        );
        assert!("secret".parse::<DataClassification>().is_err());
    }

    #[test]
    fn test_permission_wildcard_matching() {
        let perm = Permission {
            id: "p".to_string(),
            name: "p".to_string(),
            description: String::new(),
            resource: "*".to_string(),
            action: "read".to_string(),
            data_classification: DataClassification::Internal,
            requires_justification: false,
            is_high_risk: false,
        };
        assert!(perm.matches("personal_data", "read"));
        assert!(perm.matches("audit_logs", "read"));
        assert!(!perm.matches("personal_data", "write"));
    }

    #[test]
    fn test_session_elevated_window() {
        let now = Utc::now();
        let mut session = Session {
            id: "s".to_string(),
            user_id: "u".to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
            last_activity: now,
            ip_address: String::new(),
            user_agent: String::new(),
            mfa_verified: false,
            elevated_privileges: vec!["personal_data_delete".to_string()],
            elevated_expires_at: Some(now + chrono::Duration::minutes(10)),
            accessed_resources: HashMap::new(),
        };
        assert_eq!(session.active_elevated(now).len(), 1);

        session.elevated_expires_at = Some(now - chrono::Duration::minutes(1));
        assert!(session.active_elevated(now).is_empty());
    }
}
