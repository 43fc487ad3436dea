//! Audit sink contract and structured event types
//!
//! Every component in the core emits a structured [`AuditEvent`] before
//! returning to its caller, on success and on failure alike. The sink itself
//! (storage, append-only guarantees, shipping) is owned by the surrounding
//! system; this module only defines the contract and two reference
//! implementations: a `tracing`-backed sink and an in-memory capture sink
//! used by tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::Mutex;
use uuid::Uuid;

/// A structured audit record emitted by the compliance core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier
    pub id: String,
    /// Emission timestamp
    pub timestamp: DateTime<Utc>,
    /// Actor the event is attributed to (user id, or "system" for
    /// background tasks)
    pub actor: String,
    /// Operation name, e.g. "key_rotation" or "check_access"
    pub operation: String,
    /// Whether the operation succeeded
    pub success: bool,
    /// Error message for failed operations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Event-specific payload
    pub detail: AuditDetail,
}

impl AuditEvent {
    /// Create a new event with a fresh id and the current timestamp
    pub fn new(actor: impl Into<String>, operation: impl Into<String>, detail: AuditDetail) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            actor: actor.into(),
            operation: operation.into(),
            success: true,
            error: None,
            detail,
        }
    }

    /// Mark the event as failed with the given error message
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

/// Event-specific audit payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditDetail {
    /// Key rotation attempt (scheduled or manual)
    KeyRotation {
        /// Version of the key demoted from `Active`, if one existed
        old_version: Option<u32>,
        /// Version of the newly generated key, if generation succeeded
        new_version: Option<u32>,
        /// "scheduled" or "manual"
        rotation_type: String,
    },
    /// Key lifecycle transition (archival or secure destruction)
    KeyTransition {
        /// Key version
        version: u32,
        /// Status the key transitioned to
        status: String,
    },
    /// Pseudonymize or de-pseudonymize call
    Pseudonymization {
        /// "pseudonymize" or "depseudonymize"
        direction: String,
        /// Algorithm family used
        algorithm: String,
        /// Declared data type ("email", "ip_address", ...)
        data_type: String,
        /// Processing purpose
        purpose: String,
        /// GDPR legal basis
        legal_basis: String,
        /// Key version involved, when resolved
        key_version: Option<u32>,
    },
    /// Access check against a resource/action pair
    AccessAttempt {
        /// Session that made the request
        session_id: String,
        /// Requested resource
        resource: String,
        /// Requested action
        action: String,
        /// Reason code when denied
        denial_reason: Option<String>,
        /// "low" or "high" depending on the matched permission
        risk_level: String,
        /// Legal basis attributed from the granting role
        legal_basis: Option<String>,
    },
    /// Privilege escalation attempt
    PrivilegeEscalation {
        /// Session requesting elevation
        session_id: String,
        /// Permission ids currently held
        from_privileges: Vec<String>,
        /// Permission ids requested
        to_privileges: Vec<String>,
        /// Computed risk score in [0, 1]
        risk_score: f64,
        /// Approver, when one was named
        approved_by: Option<String>,
        /// Business justification supplied by the requester
        justification: String,
    },
    /// Session lifecycle event
    Session {
        /// Session identifier; empty when creation was rejected
        session_id: String,
        /// "created", "rejected", "expired" or "terminated"
        event_type: String,
    },
    /// Retention policy registration or change
    Retention {
        /// Policy identifier
        policy_id: String,
        /// "policy_added", "job_scheduled", "job_cancelled", ...
        event_type: String,
    },
    /// Purge job execution outcome
    PurgeJob {
        /// Job identifier
        job_id: String,
        /// Policy the job executes
        policy_id: String,
        /// Terminal status reached
        status: String,
        /// Whether this was a dry run
        dry_run: bool,
    },
    /// Legal hold created or released
    LegalHold {
        /// Hold identifier
        hold_id: String,
        /// "created" or "released"
        action: String,
    },
}

/// Error returned by a sink that failed to persist an event
#[derive(Debug, thiserror::Error)]
#[error("audit sink write failed: {0}")]
pub struct SinkError(pub String);

/// Destination for audit events.
///
/// Called synchronously from inside the core's operations, so
/// implementations must be fast; buffering or async shipping belongs in the
/// implementation, not in the callers.
pub trait AuditSink: Send + Sync {
    /// Persist one event. A returned error is logged by the core but never
    /// propagated to the operation that emitted the event.
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError>;
}

/// Emit an event to the sink, logging (but not propagating) sink failures.
pub(crate) fn emit(sink: &dyn AuditSink, event: &AuditEvent) {
    if let Err(e) = sink.record(event) {
        tracing::warn!(
            event_id = %event.id,
            operation = %event.operation,
            error = %e,
            "Audit sink write failed; event dropped by sink"
        );
    }
}

/// Sink that emits events as structured `tracing` records
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError> {
        let detail = serde_json::to_string(&event.detail)
            .map_err(|e| SinkError(e.to_string()))?;
        tracing::info!(
            target: "dataguard::audit",
            event_id = %event.id,
            actor = %event.actor,
            operation = %event.operation,
            success = event.success,
            error = event.error.as_deref().unwrap_or(""),
            detail = %detail,
            "audit event"
        );
        Ok(())
    }
}

/// In-memory sink that captures events for inspection in tests
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    /// Create an empty sink wrapped for sharing
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all captured events
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Number of captured events
    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether no events have been captured
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events whose operation name matches
    pub fn events_for(&self, operation: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.operation == operation)
            .collect()
    }
}

impl AuditSink for MemorySink {
    fn record(&self, event: &AuditEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError("sink mutex poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_failed_sets_error() {
        let event = AuditEvent::new(
            "system",
            "key_rotation",
            AuditDetail::KeyRotation {
                old_version: Some(1),
                new_version: None,
                rotation_type: "manual".to_string(),
            },
        )
        .failed("entropy source unavailable");

        assert!(!event.success);
        assert_eq!(event.error.as_deref(), Some("entropy source unavailable"));
    }

    #[test]
    fn test_memory_sink_captures_and_filters() {
        let sink = MemorySink::default();
        let e1 = AuditEvent::new(
            "alice",
            "check_access",
            AuditDetail::Session {
                session_id: "s1".to_string(),
                event_type: "created".to_string(),
            },
        );
        let e2 = AuditEvent::new(
            "system",
            "key_rotation",
            AuditDetail::KeyRotation {
                old_version: None,
                new_version: Some(2),
                rotation_type: "scheduled".to_string(),
            },
        );
        sink.record(&e1).unwrap();
        sink.record(&e2).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events_for("key_rotation").len(), 1);
    }

    #[test]
    fn test_detail_serializes_with_kind_tag() {
        let detail = AuditDetail::LegalHold {
            hold_id: "h1".to_string(),
            action: "created".to_string(),
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "legal_hold");
        assert_eq!(json["action"], "created");
    }

    #[test]
    fn test_emit_swallows_sink_failure() {
        struct FailingSink;
        impl AuditSink for FailingSink {
            fn record(&self, _event: &AuditEvent) -> Result<(), SinkError> {
                Err(SinkError("disk full".to_string()))
            }
        }
        let event = AuditEvent::new(
            "system",
            "noop",
            AuditDetail::Session {
                session_id: "s".to_string(),
                event_type: "created".to_string(),
            },
        );
        // Must not panic or propagate
        emit(&FailingSink, &event);
    }
}
