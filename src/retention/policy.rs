//! Retention policy model, validation and date math
//!
//! Policies implement GDPR Article 5(1)(e) storage limitation: each data
//! category carries a retention period, a grace period before hard
//! deletion, a purge method and the legal basis that justifies keeping the
//! data at all. Validation collects every violation it finds so an operator
//! sees the whole picture in one pass.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

const DAY_SECS: u64 = 24 * 3600;
const YEAR_SECS: u64 = 365 * DAY_SECS;

/// Maximum retention for `sensitive`-category data without special
/// justification.
const MAX_SENSITIVE_RETENTION_SECS: u64 = 2 * YEAR_SECS;

/// Upper bound on the notification lead time.
const MAX_NOTIFICATION_DAYS: i64 = 90;

/// Rights every marketing-data policy must support.
const MARKETING_REQUIRED_RIGHTS: [&str; 6] = [
    "access",
    "rectification",
    "erasure",
    "restriction",
    "portability",
    "object",
];

/// How records are purged when a policy's retention elapses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeMethod {
    /// Irrecoverable deletion
    SecureDelete,
    /// Replace with data that no longer relates to an identifiable person
    Anonymize,
    /// Replace identifiers with pseudonyms, keeping re-identification keyed
    Pseudonymize,
}

impl std::fmt::Display for PurgeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SecureDelete => write!(f, "secure_delete"),
            Self::Anonymize => write!(f, "anonymize"),
            Self::Pseudonymize => write!(f, "pseudonymize"),
        }
    }
}

/// A data-category retention rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Stable policy identifier
    pub id: String,
    /// Data category the policy governs ("personal", "sensitive", ...)
    pub data_category: String,
    /// How long records are kept, in seconds
    pub retention_period_secs: u64,
    /// Additional time before hard deletion, in seconds
    pub grace_period_secs: u64,
    /// How records are purged
    pub purge_method: PurgeMethod,
    /// GDPR Article 6/9 legal basis for the retention
    pub legal_basis: String,
    /// Data-subject rights that apply to records under this policy
    pub subject_rights: Vec<String>,
    /// Whether the scheduler creates purge jobs automatically
    pub automated_purge: bool,
    /// Days before expiry at which to notify, in [0, 90]
    pub notification_days: i64,
    /// Creation timestamp, set on registration
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl RetentionPolicy {
    /// Check the policy against GDPR requirements, returning every
    /// violation found rather than stopping at the first.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.id.is_empty() {
            violations.push("policy id is required".to_string());
        }
        if self.data_category.is_empty() {
            violations.push("data category is required".to_string());
        }
        if self.retention_period_secs == 0 {
            violations.push("retention period must be greater than 0".to_string());
        }
        if self.legal_basis.is_empty() {
            violations.push("legal basis is required under GDPR Article 6".to_string());
        }
        if self.subject_rights.is_empty() {
            violations.push("at least one data subject right must be specified".to_string());
        }

        if self.data_category == "sensitive" {
            if !self.legal_basis.contains("Article 9") {
                violations.push("sensitive data requires an Article 9 legal basis".to_string());
            }
            if self.retention_period_secs > MAX_SENSITIVE_RETENTION_SECS {
                violations.push(
                    "sensitive data retention must not exceed 2 years without special justification"
                        .to_string(),
                );
            }
        }

        if self.data_category == "marketing" {
            if !self.legal_basis.contains("Consent") {
                violations.push("marketing data requires a consent legal basis".to_string());
            }
            for right in MARKETING_REQUIRED_RIGHTS {
                if !self.subject_rights.iter().any(|r| r == right) {
                    violations.push(format!("marketing data must support the '{}' right", right));
                }
            }
        }

        if self.notification_days < 0 {
            violations.push("notification days cannot be negative".to_string());
        }
        if self.notification_days > MAX_NOTIFICATION_DAYS {
            violations.push("notification period must not exceed 90 days".to_string());
        }

        violations
    }

    /// When a record created at `created_at` exceeds its retention
    pub fn retention_date(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + ChronoDuration::seconds(self.retention_period_secs as i64)
    }

    /// Final deletion deadline including the grace period
    pub fn grace_deadline(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        self.retention_date(created_at) + ChronoDuration::seconds(self.grace_period_secs as i64)
    }

    /// When to notify about the upcoming expiry of a record
    pub fn notification_date(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        self.retention_date(created_at) - ChronoDuration::days(self.notification_days)
    }

    /// Whether a record created at `created_at` is past its retention
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now > self.retention_date(created_at)
    }

    /// Whether a record is past retention but still within the grace window
    pub fn in_grace_period(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now > self.retention_date(created_at) && now < self.grace_deadline(created_at)
    }
}

/// Standard GDPR-aligned retention policies for the common data categories
pub fn default_policies() -> Vec<RetentionPolicy> {
    let now = Utc::now();
    let policy = |id: &str,
                  category: &str,
                  retention: u64,
                  grace: u64,
                  method: PurgeMethod,
                  basis: &str,
                  rights: &[&str],
                  automated: bool,
                  notify: i64| RetentionPolicy {
        id: id.to_string(),
        data_category: category.to_string(),
        retention_period_secs: retention,
        grace_period_secs: grace,
        purge_method: method,
        legal_basis: basis.to_string(),
        subject_rights: rights.iter().map(|r| r.to_string()).collect(),
        automated_purge: automated,
        notification_days: notify,
        created_at: now,
        updated_at: now,
    };

    vec![
        policy(
            "personal-data-standard",
            "personal",
            2 * YEAR_SECS,
            30 * DAY_SECS,
            PurgeMethod::SecureDelete,
            "Article 6(1)(b) - Contract",
            &["access", "rectification", "erasure", "portability"],
            true,
            30,
        ),
        policy(
            "sensitive-data-standard",
            "sensitive",
            YEAR_SECS,
            14 * DAY_SECS,
            PurgeMethod::SecureDelete,
            "Article 9(2)(a) - Explicit consent",
            &["access", "rectification", "erasure", "restriction", "portability"],
            true,
            60,
        ),
        policy(
            "transaction-data-standard",
            "transaction",
            7 * YEAR_SECS,
            90 * DAY_SECS,
            PurgeMethod::Anonymize,
            "Article 6(1)(c) - Legal obligation",
            &["access", "rectification"],
            true,
            90,
        ),
        policy(
            "log-data-standard",
            "log",
            90 * DAY_SECS,
            7 * DAY_SECS,
            PurgeMethod::SecureDelete,
            "Article 6(1)(f) - Legitimate interests",
            &["access", "erasure"],
            true,
            14,
        ),
        // Manual review required before purging marketing data.
        policy(
            "marketing-data-standard",
            "marketing",
            3 * YEAR_SECS,
            30 * DAY_SECS,
            PurgeMethod::Pseudonymize,
            "Article 6(1)(a) - Consent",
            &["access", "rectification", "erasure", "restriction", "portability", "object"],
            false,
            45,
        ),
    ]
}

/// A starting point for building a custom retention policy on a given
/// legal basis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTemplate {
    /// Template name
    pub name: String,
    /// When the template applies
    pub description: String,
    /// Base policy; id and data category are left for the operator to fill
    pub base_policy: RetentionPolicy,
    /// Field names the operator is expected to customize
    pub customizable: Vec<String>,
}

/// Templates for the common GDPR Article 6 legal bases
pub fn policy_templates() -> Vec<PolicyTemplate> {
    let now = Utc::now();
    let base = |retention: u64,
                method: PurgeMethod,
                basis: &str,
                rights: &[&str],
                automated: bool,
                notify: i64| RetentionPolicy {
        id: String::new(),
        data_category: String::new(),
        retention_period_secs: retention,
        grace_period_secs: 30 * DAY_SECS,
        purge_method: method,
        legal_basis: basis.to_string(),
        subject_rights: rights.iter().map(|r| r.to_string()).collect(),
        automated_purge: automated,
        notification_days: notify,
        created_at: now,
        updated_at: now,
    };

    vec![
        PolicyTemplate {
            name: "GDPR Article 6(1)(b) - Contract Performance".to_string(),
            description: "For data necessary to perform a contract with the data subject"
                .to_string(),
            base_policy: base(
                2 * YEAR_SECS,
                PurgeMethod::SecureDelete,
                "Article 6(1)(b) - Contract",
                &["access", "rectification", "erasure", "portability"],
                true,
                30,
            ),
            customizable: vec![
                "retention_period_secs".to_string(),
                "data_category".to_string(),
                "notification_days".to_string(),
            ],
        },
        PolicyTemplate {
            name: "GDPR Article 6(1)(c) - Legal Obligation".to_string(),
            description: "For data retained due to legal obligations (e.g. tax records)"
                .to_string(),
            base_policy: base(
                7 * YEAR_SECS,
                PurgeMethod::Anonymize,
                "Article 6(1)(c) - Legal obligation",
                &["access", "rectification"],
                true,
                90,
            ),
            customizable: vec![
                "retention_period_secs".to_string(),
                "data_category".to_string(),
                "purge_method".to_string(),
            ],
        },
        PolicyTemplate {
            name: "GDPR Article 6(1)(f) - Legitimate Interests".to_string(),
            description: "For data processed for legitimate interests (with balancing test)"
                .to_string(),
            base_policy: base(
                YEAR_SECS,
                PurgeMethod::SecureDelete,
                "Article 6(1)(f) - Legitimate interests",
                &["access", "rectification", "erasure", "restriction", "object"],
                false,
                45,
            ),
            customizable: vec![
                "retention_period_secs".to_string(),
                "data_category".to_string(),
                "automated_purge".to_string(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_policy() -> RetentionPolicy {
        let now = Utc::now();
        RetentionPolicy {
            id: "test-policy".to_string(),
            data_category: "personal".to_string(),
            retention_period_secs: YEAR_SECS,
            grace_period_secs: 30 * DAY_SECS,
            purge_method: PurgeMethod::SecureDelete,
            legal_basis: "Article 6(1)(b) - Contract".to_string(),
            subject_rights: vec!["access".to_string(), "erasure".to_string()],
            automated_purge: true,
            notification_days: 30,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_valid_policy_has_no_violations() {
        assert!(valid_policy().validate().is_empty());
    }

    #[test]
    fn test_validation_collects_all_violations() {
        let mut policy = valid_policy();
        policy.id = String::new();
        policy.legal_basis = String::new();
        let violations = policy.validate();
        assert!(violations.len() >= 2, "got: {:?}", violations);
        assert!(violations.iter().any(|v| v.contains("policy id")));
        assert!(violations.iter().any(|v| v.contains("legal basis")));
    }

    #[test]
    fn test_sensitive_category_constraints() {
        let mut policy = valid_policy();
        policy.data_category = "sensitive".to_string();
        policy.retention_period_secs = 3 * YEAR_SECS;
        // Basis is Article 6, not Article 9, and retention is too long.
        let violations = policy.validate();
        assert_eq!(violations.len(), 2, "got: {:?}", violations);
    }

    #[test]
    fn test_marketing_requires_consent_and_full_rights() {
        let mut policy = valid_policy();
        policy.data_category = "marketing".to_string();
        let violations = policy.validate();
        assert!(violations.iter().any(|v| v.contains("consent")));
        assert!(violations.iter().any(|v| v.contains("'object' right")));
    }

    #[test]
    fn test_notification_bounds() {
        let mut policy = valid_policy();
        policy.notification_days = 91;
        assert_eq!(policy.validate().len(), 1);
        policy.notification_days = -1;
        assert_eq!(policy.validate().len(), 1);
        policy.notification_days = 90;
        assert!(policy.validate().is_empty());
    }

    #[test]
    fn test_default_policies_all_validate() {
        for policy in default_policies() {
            assert!(
                policy.validate().is_empty(),
                "default policy {} should validate",
                policy.id
            );
        }
    }

    #[test]
    fn test_templates_complete_into_valid_policies() {
        for template in policy_templates() {
            let mut policy = template.base_policy.clone();
            // The customizable identity fields are the only gaps.
            policy.id = "custom-policy".to_string();
            policy.data_category = "personal".to_string();
            assert!(
                policy.validate().is_empty(),
                "template {} should complete into a valid policy",
                template.name
            );
            assert!(!template.customizable.is_empty());
        }
    }

    #[test]
    fn test_template_catalog_covers_common_bases() {
        let templates = policy_templates();
        assert_eq!(templates.len(), 3);
        assert!(templates
            .iter()
            .any(|t| t.base_policy.legal_basis.contains("6(1)(b)")));
        assert!(templates
            .iter()
            .any(|t| t.base_policy.legal_basis.contains("6(1)(c)")));
        assert!(templates
            .iter()
            .any(|t| t.base_policy.legal_basis.contains("6(1)(f)")));
    }

    #[test]
    fn test_retention_date_math() {
        let policy = valid_policy();
        let created = Utc::now() - ChronoDuration::seconds(YEAR_SECS as i64 + 60);

        assert!(policy.is_expired(created, Utc::now()));
        assert!(policy.in_grace_period(created, Utc::now()));
        assert_eq!(
            policy.grace_deadline(created),
            policy.retention_date(created) + ChronoDuration::days(30)
        );
        assert!(policy.notification_date(created) < policy.retention_date(created));
    }

    #[test]
    fn test_fresh_record_not_expired() {
        let policy = valid_policy();
        let created = Utc::now();
        assert!(!policy.is_expired(created, Utc::now()));
        assert!(!policy.in_grace_period(created, Utc::now()));
    }
}
