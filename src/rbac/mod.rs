//! Role-based access control with GDPR compliance gates
//!
//! Authenticates sessions, authorizes resource/action pairs against
//! role-derived permissions, and detects privilege escalation with risk
//! scoring. Every access decision, session lifecycle change and escalation
//! attempt emits an audit event carrying a specific reason code; there is no
//! generic "denied".

mod defaults;
pub mod risk;
mod types;

pub use defaults::{default_permissions, default_roles};
pub use types::{
    AccessContext, ConsentRecord, DataClassification, Permission, RbacMetrics, Role, Session,
    TimeRestrictions, User,
};

use crate::audit::{emit, AuditDetail, AuditEvent, AuditSink};
use crate::config::AccessConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Reason code attached to every denied access decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The session id is unknown
    InvalidSession,
    /// The session is past its expiry
    SessionExpired,
    /// The user is inactive or locked out
    UserInactiveOrLocked,
    /// No effective permission matches the resource/action pair
    InsufficientPermissions,
    /// High-risk permission requires MFA verification
    MfaRequired,
    /// High-risk permission requires a business justification
    JustificationRequired,
    /// Permission's classification level is below the requested data's
    DataClassificationMismatch,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSession => write!(f, "invalid_session"),
            Self::SessionExpired => write!(f, "session_expired"),
            Self::UserInactiveOrLocked => write!(f, "user_inactive_or_locked"),
            Self::InsufficientPermissions => write!(f, "insufficient_permissions"),
            Self::MfaRequired => write!(f, "mfa_required"),
            Self::JustificationRequired => write!(f, "justification_required"),
            Self::DataClassificationMismatch => write!(f, "data_classification_mismatch"),
        }
    }
}

struct Directory {
    users: HashMap<String, User>,
    roles: HashMap<String, Role>,
    permissions: HashMap<String, Permission>,
    sessions: HashMap<String, Session>,
}

/// RBAC access controller
pub struct AccessController {
    state: RwLock<Directory>,
    config: AccessConfig,
    sink: Arc<dyn AuditSink>,
}

impl AccessController {
    /// Create a controller with the built-in permission and role catalog
    /// installed.
    pub fn new(config: AccessConfig, sink: Arc<dyn AuditSink>) -> Self {
        let mut directory = Directory {
            users: HashMap::new(),
            roles: HashMap::new(),
            permissions: HashMap::new(),
            sessions: HashMap::new(),
        };
        for perm in default_permissions() {
            directory.permissions.insert(perm.id.clone(), perm);
        }
        for role in default_roles() {
            directory.roles.insert(role.id.clone(), role);
        }

        Self {
            state: RwLock::new(directory),
            config,
            sink,
        }
    }

    /// Spawn the periodic expired-session sweep. Runs for the lifetime of
    /// the controller.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let controller = self.clone();
        let interval = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = controller.sweep_expired_sessions().await;
                if removed > 0 {
                    tracing::debug!(removed, "Expired sessions swept");
                }
            }
        })
    }

    /// Register a new user. Rejects duplicates explicitly.
    pub async fn add_user(&self, user: User) -> Result<()> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&user.id) {
            return Err(Error::UserExists(user.id));
        }
        for role_id in &user.roles {
            if !state.roles.contains_key(role_id) {
                return Err(Error::RoleNotFound(role_id.clone()));
            }
        }
        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    /// Register a role definition
    pub async fn add_role(&self, role: Role) -> Result<()> {
        let mut state = self.state.write().await;
        for perm_id in &role.permissions {
            if !state.permissions.contains_key(perm_id) {
                return Err(Error::Internal(format!(
                    "role {} references unknown permission {}",
                    role.id, perm_id
                )));
            }
        }
        state.roles.insert(role.id.clone(), role);
        Ok(())
    }

    /// Assign a role to a user. Roles that require administrative approval
    /// are rejected here; granting an already-held role is an explicit
    /// error, not a silent no-op.
    pub async fn assign_role(&self, user_id: &str, role_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let role = state
            .roles
            .get(role_id)
            .ok_or_else(|| Error::RoleNotFound(role_id.to_string()))?;
        if role.requires_approval {
            return Err(Error::RoleRequiresApproval(role_id.to_string()));
        }
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
        if user.roles.iter().any(|r| r == role_id) {
            return Err(Error::RoleAlreadyAssigned {
                user: user_id.to_string(),
                role: role_id.to_string(),
            });
        }
        user.roles.push(role_id.to_string());
        user.updated_at = Utc::now();
        Ok(())
    }

    /// Remove a role from a user
    pub async fn revoke_role(&self, user_id: &str, role_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
        let before = user.roles.len();
        user.roles.retain(|r| r != role_id);
        if user.roles.len() == before {
            return Err(Error::RoleNotAssigned {
                user: user_id.to_string(),
                role: role_id.to_string(),
            });
        }
        user.updated_at = Utc::now();
        Ok(())
    }

    /// Record a failed authentication attempt. Locks the account once the
    /// configured maximum is reached; returns whether the account is now
    /// locked.
    pub async fn record_failed_attempt(&self, user_id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let max = self.config.max_failed_attempts;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
        user.failed_attempts += 1;
        user.last_failed_attempt = Some(Utc::now());
        if user.failed_attempts >= max {
            user.is_locked = true;
            tracing::warn!(user_id, attempts = user.failed_attempts, "User account locked");
        }
        Ok(user.is_locked)
    }

    /// Authenticate a new session for a user.
    ///
    /// Fails if the user is inactive, or locked and still within the
    /// lockout window; a lockout that has elapsed auto-unlocks the account
    /// and resets the failed-attempt counter. The session timeout is capped
    /// by the strictest max-session-duration among the user's roles. Every
    /// rejection emits a failed session audit event before the error is
    /// returned.
    pub async fn create_session(
        &self,
        user_id: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<Session> {
        let now = Utc::now();
        let outcome = {
            let mut state = self.state.write().await;
            open_session(&mut state, &self.config, user_id, ip_address, user_agent, now)
        };

        match outcome {
            Ok(session) => {
                emit(
                    self.sink.as_ref(),
                    &AuditEvent::new(
                        user_id,
                        "session",
                        AuditDetail::Session {
                            session_id: session.id.clone(),
                            event_type: "created".to_string(),
                        },
                    ),
                );
                Ok(session)
            }
            Err(e) => {
                emit(
                    self.sink.as_ref(),
                    &AuditEvent::new(
                        user_id,
                        "session",
                        AuditDetail::Session {
                            // No session was created to identify.
                            session_id: String::new(),
                            event_type: "rejected".to_string(),
                        },
                    )
                    .failed(e.to_string()),
                );
                Err(e)
            }
        }
    }

    /// Mark the session's MFA challenge as completed
    pub async fn mark_mfa_verified(&self, session_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        session.mfa_verified = true;
        Ok(())
    }

    /// Terminate a session before its natural expiry
    pub async fn terminate_session(&self, session_id: &str) -> Result<()> {
        let removed = {
            let mut state = self.state.write().await;
            state
                .sessions
                .remove(session_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?
        };
        emit(
            self.sink.as_ref(),
            &AuditEvent::new(
                removed.user_id.as_str(),
                "session",
                AuditDetail::Session {
                    session_id: session_id.to_string(),
                    event_type: "terminated".to_string(),
                },
            ),
        );
        Ok(())
    }

    /// Authorize a resource/action request for a session.
    ///
    /// Returns the decision as a boolean and always emits an audit event;
    /// denials carry their specific reason code.
    pub async fn check_access(
        &self,
        session_id: &str,
        resource: &str,
        action: &str,
        context: &AccessContext,
    ) -> bool {
        let now = Utc::now();

        // Evaluate under the shared lock.
        let decision = {
            let state = self.state.read().await;
            evaluate_access(&state, session_id, resource, action, context, self.config.require_mfa, now)
        };

        // Update session activity under a short exclusive lock on grants.
        if decision.granted {
            let mut state = self.state.write().await;
            if let Some(session) = state.sessions.get_mut(session_id) {
                session.last_activity = now;
                session.accessed_resources.insert(resource.to_string(), now);
            }
        }

        let mut event = AuditEvent::new(
            decision.user_id.as_deref().unwrap_or("unknown"),
            "check_access",
            AuditDetail::AccessAttempt {
                session_id: session_id.to_string(),
                resource: resource.to_string(),
                action: action.to_string(),
                denial_reason: decision.denial.map(|d| d.to_string()),
                risk_level: if decision.high_risk { "high" } else { "low" }.to_string(),
                legal_basis: decision.legal_basis.clone(),
            },
        );
        if let Some(denial) = decision.denial {
            event = event.failed(denial.to_string());
        }
        emit(self.sink.as_ref(), &event);

        decision.granted
    }

    /// Temporarily grant additional privileges to a session.
    ///
    /// Any requested privilege not already held is an escalation; when
    /// escalation detection is enabled, a risk score is computed and
    /// escalations above the approval threshold are rejected unless an
    /// approver is named. Every attempt is audited with its score, and
    /// failure paths (unknown or expired session included) emit a failed
    /// event before the error is returned. The elevated window never
    /// extends past the session's own expiry.
    pub async fn elevate_privileges(
        &self,
        session_id: &str,
        privileges: &[String],
        duration: Duration,
        justification: &str,
        approved_by: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        let outcome = {
            let mut state = self.state.write().await;
            apply_elevation(
                &mut state,
                &self.config,
                session_id,
                privileges,
                duration,
                approved_by,
                now,
            )
        };

        let (actor, held, risk_score, rejected) = match &outcome {
            Ok(elevation) => (
                elevation.user_id.clone(),
                elevation.held.clone(),
                elevation.risk_score,
                elevation.rejected,
            ),
            Err(_) => ("unknown".to_string(), Vec::new(), 0.0, false),
        };

        let mut event = AuditEvent::new(
            actor.as_str(),
            "privilege_escalation",
            AuditDetail::PrivilegeEscalation {
                session_id: session_id.to_string(),
                from_privileges: held,
                to_privileges: privileges.to_vec(),
                risk_score,
                approved_by: approved_by.map(str::to_string),
                justification: justification.to_string(),
            },
        );
        if rejected {
            event = event.failed("high-risk escalation requires approval");
        } else if let Err(e) = &outcome {
            event = event.failed(e.to_string());
        }
        emit(self.sink.as_ref(), &event);

        outcome?;
        if rejected {
            return Err(Error::EscalationRequiresApproval { risk_score });
        }
        Ok(())
    }

    /// Remove every session past its expiry, emitting a session-expired
    /// audit event for each. Returns the number removed.
    pub async fn sweep_expired_sessions(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<Session> = {
            let mut state = self.state.write().await;
            let ids: Vec<String> = state
                .sessions
                .values()
                .filter(|s| s.is_expired(now))
                .map(|s| s.id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| state.sessions.remove(id))
                .collect()
        };

        for session in &expired {
            emit(
                self.sink.as_ref(),
                &AuditEvent::new(
                    session.user_id.as_str(),
                    "session",
                    AuditDetail::Session {
                        session_id: session.id.clone(),
                        event_type: "expired".to_string(),
                    },
                ),
            );
        }
        expired.len()
    }

    /// Snapshot of a session, if it exists
    pub async fn session(&self, session_id: &str) -> Option<Session> {
        self.state.read().await.sessions.get(session_id).cloned()
    }

    /// RBAC metrics snapshot
    pub async fn metrics(&self) -> RbacMetrics {
        let state = self.state.read().await;
        let now = Utc::now();
        RbacMetrics {
            total_users: state.users.len(),
            active_users: state.users.values().filter(|u| u.is_active).count(),
            locked_users: state.users.values().filter(|u| u.is_locked).count(),
            total_roles: state.roles.len(),
            total_permissions: state.permissions.len(),
            active_sessions: state
                .sessions
                .values()
                .filter(|s| !s.is_expired(now))
                .count(),
        }
    }
}

struct AccessDecision {
    granted: bool,
    denial: Option<DenialReason>,
    high_risk: bool,
    user_id: Option<String>,
    legal_basis: Option<String>,
}

impl AccessDecision {
    fn denied(reason: DenialReason, user_id: Option<String>) -> Self {
        Self {
            granted: false,
            denial: Some(reason),
            high_risk: false,
            user_id,
            legal_basis: None,
        }
    }
}

fn evaluate_access(
    state: &Directory,
    session_id: &str,
    resource: &str,
    action: &str,
    context: &AccessContext,
    require_mfa: bool,
    now: DateTime<Utc>,
) -> AccessDecision {
    let session = match state.sessions.get(session_id) {
        Some(s) => s,
        None => return AccessDecision::denied(DenialReason::InvalidSession, None),
    };
    let user_id = Some(session.user_id.clone());

    if session.is_expired(now) {
        return AccessDecision::denied(DenialReason::SessionExpired, user_id);
    }

    let user = match state.users.get(&session.user_id) {
        Some(u) if u.is_active && !u.is_locked => u,
        _ => return AccessDecision::denied(DenialReason::UserInactiveOrLocked, user_id),
    };

    // Effective set: union across roles, plus unexpired elevated privileges.
    let effective = effective_permission_ids(state, user, session, now);
    let matched = effective
        .iter()
        .filter_map(|id| state.permissions.get(id))
        .find(|p| p.matches(resource, action));

    let permission = match matched {
        Some(p) => p,
        None => return AccessDecision::denied(DenialReason::InsufficientPermissions, user_id),
    };

    if permission.is_high_risk {
        if require_mfa && !session.mfa_verified {
            return AccessDecision::denied(DenialReason::MfaRequired, user_id);
        }
        if permission.requires_justification
            && context
                .justification
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
        {
            return AccessDecision::denied(DenialReason::JustificationRequired, user_id);
        }
        if let Some(requested) = context.data_classification {
            if permission.data_classification < requested {
                return AccessDecision::denied(DenialReason::DataClassificationMismatch, user_id);
            }
        }
    }

    AccessDecision {
        granted: true,
        denial: None,
        high_risk: permission.is_high_risk,
        legal_basis: legal_basis_for(state, user, &permission.id),
        user_id,
    }
}

/// Validate the user and register a new session under the exclusive lock.
fn open_session(
    state: &mut Directory,
    config: &AccessConfig,
    user_id: &str,
    ip_address: &str,
    user_agent: &str,
    now: DateTime<Utc>,
) -> Result<Session> {
    let timeout = {
        let user = state
            .users
            .get(user_id)
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
        if !user.is_active {
            return Err(Error::UserInactive(user_id.to_string()));
        }
        role_capped_timeout(state, user, config.session_timeout())
    };

    let lockout = config.lockout_duration();
    let user = state
        .users
        .get_mut(user_id)
        .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;

    if user.is_locked {
        let still_locked = user
            .last_failed_attempt
            .map(|t| now.signed_duration_since(t) < chrono_duration(lockout))
            .unwrap_or(false);
        if still_locked {
            return Err(Error::UserLocked(user_id.to_string()));
        }
        user.is_locked = false;
        user.failed_attempts = 0;
    }

    let session = Session {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        created_at: now,
        expires_at: now + chrono_duration(timeout),
        last_activity: now,
        ip_address: ip_address.to_string(),
        user_agent: user_agent.to_string(),
        mfa_verified: !config.require_mfa,
        elevated_privileges: Vec::new(),
        elevated_expires_at: None,
        accessed_resources: HashMap::new(),
    };

    user.last_login = Some(now);
    user.updated_at = now;
    state.sessions.insert(session.id.clone(), session.clone());
    Ok(session)
}

struct Elevation {
    user_id: String,
    held: Vec<String>,
    risk_score: f64,
    rejected: bool,
}

/// Score and, unless rejected, apply a privilege elevation under the
/// exclusive lock.
#[allow(clippy::too_many_arguments)]
fn apply_elevation(
    state: &mut Directory,
    config: &AccessConfig,
    session_id: &str,
    privileges: &[String],
    duration: Duration,
    approved_by: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Elevation> {
    let session = state
        .sessions
        .get(session_id)
        .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?
        .clone();
    if session.is_expired(now) {
        return Err(Error::SessionExpired(session_id.to_string()));
    }
    let user = state
        .users
        .get(&session.user_id)
        .ok_or_else(|| Error::UserNotFound(session.user_id.clone()))?;

    let held: Vec<String> = effective_permission_ids(state, user, &session, now);
    let is_escalation = privileges.iter().any(|p| !held.contains(p));

    let requests_high_risk = privileges
        .iter()
        .any(|p| state.permissions.get(p).map(|perm| perm.is_high_risk).unwrap_or(false));

    let risk_score = if is_escalation && config.escalation_detection {
        risk::escalation_risk(risk::RiskInput {
            ip_known: !session.ip_address.is_empty(),
            hour_of_day: now.hour(),
            requests_high_risk,
            session_age: now
                .signed_duration_since(session.created_at)
                .to_std()
                .unwrap_or_default(),
        })
    } else {
        0.0
    };

    let rejected = is_escalation
        && config.escalation_detection
        && risk_score > risk::APPROVAL_THRESHOLD
        && approved_by.is_none();

    if !rejected {
        let elevated_until = std::cmp::min(now + chrono_duration(duration), session.expires_at);
        if let Some(live) = state.sessions.get_mut(session_id) {
            live.elevated_privileges = privileges.to_vec();
            live.elevated_expires_at = Some(elevated_until);
        }
    }

    Ok(Elevation {
        user_id: session.user_id,
        held,
        risk_score,
        rejected,
    })
}

/// Union of permission ids across the user's roles and the session's
/// unexpired elevated privileges.
fn effective_permission_ids(
    state: &Directory,
    user: &User,
    session: &Session,
    now: DateTime<Utc>,
) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for role_id in &user.roles {
        if let Some(role) = state.roles.get(role_id) {
            for perm_id in &role.permissions {
                if !ids.contains(perm_id) {
                    ids.push(perm_id.clone());
                }
            }
        }
    }
    for perm_id in session.active_elevated(now) {
        if !ids.contains(perm_id) {
            ids.push(perm_id.clone());
        }
    }
    ids
}

/// Legal basis attributed from the first of the user's roles granting the
/// permission.
fn legal_basis_for(state: &Directory, user: &User, permission_id: &str) -> Option<String> {
    for role_id in &user.roles {
        if let Some(role) = state.roles.get(role_id) {
            if role.permissions.iter().any(|p| p == permission_id) {
                if let Some(basis) = role.legal_bases.first() {
                    return Some(basis.clone());
                }
            }
        }
    }
    None
}

/// Session timeout capped by the strictest role-level duration limit.
fn role_capped_timeout(state: &Directory, user: &User, default_timeout: Duration) -> Duration {
    user.roles
        .iter()
        .filter_map(|role_id| state.roles.get(role_id))
        .filter_map(|role| role.max_session_duration_secs)
        .map(Duration::from_secs)
        .min()
        .map(|cap| std::cmp::min(cap, default_timeout))
        .unwrap_or(default_timeout)
}

fn chrono_duration(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}
