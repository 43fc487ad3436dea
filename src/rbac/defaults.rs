//! Built-in compliance permission and role catalog
//!
//! The default catalog installed at startup: the compliance-oriented
//! permissions (personal-data read/write/delete, data export, audit-log
//! read, pseudonymization management) and the four built-in roles with
//! role-specific legal bases. The highest-privilege roles require an
//! approval workflow for assignment.

use super::types::{DataClassification, Permission, Role};

/// The default compliance permission set
pub fn default_permissions() -> Vec<Permission> {
    vec![
        Permission {
            id: "personal_data_read".to_string(),
            name: "Read Personal Data".to_string(),
            description: "View personal data under GDPR Article 6".to_string(),
            resource: "personal_data".to_string(),
            action: "read".to_string(),
            data_classification: DataClassification::Confidential,
            requires_justification: true,
            is_high_risk: true,
        },
        Permission {
            id: "personal_data_write".to_string(),
            name: "Modify Personal Data".to_string(),
            description: "Create or modify personal data under GDPR Article 16".to_string(),
            resource: "personal_data".to_string(),
            action: "write".to_string(),
            data_classification: DataClassification::Confidential,
            requires_justification: true,
            is_high_risk: true,
        },
        Permission {
            id: "personal_data_delete".to_string(),
            name: "Delete Personal Data".to_string(),
            description: "Delete personal data under GDPR Article 17".to_string(),
            resource: "personal_data".to_string(),
            action: "delete".to_string(),
            data_classification: DataClassification::Confidential,
            requires_justification: true,
            is_high_risk: true,
        },
        Permission {
            id: "data_export".to_string(),
            name: "Export Data".to_string(),
            description: "Export data for portability under GDPR Article 20".to_string(),
            resource: "data_export".to_string(),
            action: "execute".to_string(),
            data_classification: DataClassification::Confidential,
            requires_justification: true,
            is_high_risk: true,
        },
        Permission {
            id: "audit_log_read".to_string(),
            name: "Read Audit Logs".to_string(),
            description: "View audit logs for compliance monitoring".to_string(),
            resource: "audit_logs".to_string(),
            action: "read".to_string(),
            data_classification: DataClassification::Restricted,
            requires_justification: false,
            is_high_risk: false,
        },
        Permission {
            id: "pseudonymization_manage".to_string(),
            name: "Manage Pseudonymization".to_string(),
            description: "Manage pseudonymization keys and processes".to_string(),
            resource: "pseudonymization".to_string(),
            action: "manage".to_string(),
            data_classification: DataClassification::Restricted,
            requires_justification: true,
            is_high_risk: true,
        },
    ]
}

/// The four built-in compliance roles
pub fn default_roles() -> Vec<Role> {
    vec![
        Role {
            id: "compliance_officer".to_string(),
            name: "Compliance Officer".to_string(),
            description: "Full compliance oversight of personal data processing".to_string(),
            permissions: vec![
                "personal_data_read".to_string(),
                "personal_data_write".to_string(),
                "personal_data_delete".to_string(),
                "data_export".to_string(),
                "audit_log_read".to_string(),
                "pseudonymization_manage".to_string(),
            ],
            data_categories: vec![
                "personal".to_string(),
                "sensitive".to_string(),
                "transaction".to_string(),
                "log".to_string(),
            ],
            processing_purposes: vec![
                "compliance".to_string(),
                "audit".to_string(),
                "legal_obligation".to_string(),
            ],
            legal_bases: vec![
                "Article 6(1)(c)".to_string(),
                "Article 6(1)(f)".to_string(),
            ],
            is_built_in: true,
            requires_approval: false,
            max_session_duration_secs: Some(8 * 3600),
            time_restrictions: None,
        },
        Role {
            id: "data_processor".to_string(),
            name: "Data Processor".to_string(),
            description: "Process personal data for specific purposes".to_string(),
            permissions: vec![
                "personal_data_read".to_string(),
                "personal_data_write".to_string(),
            ],
            data_categories: vec!["personal".to_string()],
            processing_purposes: vec![
                "contract_performance".to_string(),
                "legitimate_interests".to_string(),
            ],
            legal_bases: vec![
                "Article 6(1)(b)".to_string(),
                "Article 6(1)(f)".to_string(),
            ],
            is_built_in: true,
            requires_approval: true,
            max_session_duration_secs: Some(4 * 3600),
            time_restrictions: None,
        },
        Role {
            id: "subject_rights_coordinator".to_string(),
            name: "Subject Rights Coordinator".to_string(),
            description: "Handle data subject requests and rights".to_string(),
            permissions: vec![
                "personal_data_read".to_string(),
                "personal_data_delete".to_string(),
                "data_export".to_string(),
            ],
            data_categories: vec!["personal".to_string(), "sensitive".to_string()],
            processing_purposes: vec![
                "data_subject_rights".to_string(),
                "legal_obligation".to_string(),
            ],
            legal_bases: vec!["Article 6(1)(c)".to_string()],
            is_built_in: true,
            requires_approval: true,
            max_session_duration_secs: Some(6 * 3600),
            time_restrictions: None,
        },
        Role {
            id: "auditor".to_string(),
            name: "Compliance Auditor".to_string(),
            description: "Audit compliance and access logs".to_string(),
            permissions: vec!["audit_log_read".to_string()],
            data_categories: vec!["log".to_string()],
            processing_purposes: vec![
                "audit".to_string(),
                "compliance_monitoring".to_string(),
            ],
            legal_bases: vec!["Article 6(1)(f)".to_string()],
            is_built_in: true,
            requires_approval: false,
            max_session_duration_secs: Some(12 * 3600),
            time_restrictions: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_shape() {
        let permissions = default_permissions();
        let roles = default_roles();
        assert_eq!(permissions.len(), 6);
        assert_eq!(roles.len(), 4);
    }

    #[test]
    fn test_roles_reference_known_permissions() {
        let permission_ids: Vec<String> =
            default_permissions().into_iter().map(|p| p.id).collect();
        for role in default_roles() {
            for perm in &role.permissions {
                assert!(permission_ids.contains(perm), "unknown permission {}", perm);
            }
        }
    }

    #[test]
    fn test_highest_privilege_roles_require_approval() {
        let roles = default_roles();
        let processor = roles.iter().find(|r| r.id == "data_processor").unwrap();
        assert!(processor.requires_approval);
        let coordinator = roles
            .iter()
            .find(|r| r.id == "subject_rights_coordinator")
            .unwrap();
        assert!(coordinator.requires_approval);
        let auditor = roles.iter().find(|r| r.id == "auditor").unwrap();
        assert!(!auditor.requires_approval);
    }
}
