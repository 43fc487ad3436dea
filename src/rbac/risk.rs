//! Privilege escalation risk scoring
//!
//! A pure function over an explicit input snapshot, so weights can be
//! tested in isolation from the session store. Scores are additive over
//! named factors and capped at 1.0.

use std::time::Duration;

/// Added when the requesting session has no known source IP
pub const WEIGHT_UNKNOWN_IP: f64 = 0.2;

/// Added when the request falls outside business hours
pub const WEIGHT_OUTSIDE_BUSINESS_HOURS: f64 = 0.3;

/// Added when any requested privilege is flagged high-risk
pub const WEIGHT_HIGH_RISK_PRIVILEGE: f64 = 0.4;

/// Added when the session is younger than [`NEW_SESSION_THRESHOLD`]
pub const WEIGHT_NEW_SESSION: f64 = 0.2;

/// Sessions younger than this are considered suspiciously new
pub const NEW_SESSION_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// First hour of the business day (inclusive)
pub const BUSINESS_HOURS_START: u32 = 7;

/// Last hour of the business day (inclusive)
pub const BUSINESS_HOURS_END: u32 = 19;

/// Escalations scoring above this require a named approver
pub const APPROVAL_THRESHOLD: f64 = 0.7;

/// Snapshot of the facts the risk score depends on
#[derive(Debug, Clone, Copy)]
pub struct RiskInput {
    /// The session carries a known source IP
    pub ip_known: bool,
    /// Local hour of day of the request (0-23)
    pub hour_of_day: u32,
    /// Any requested privilege is flagged high-risk
    pub requests_high_risk: bool,
    /// Age of the requesting session
    pub session_age: Duration,
}

/// Compute the escalation risk score in [0, 1].
pub fn escalation_risk(input: RiskInput) -> f64 {
    let mut risk = 0.0;

    if !input.ip_known {
        risk += WEIGHT_UNKNOWN_IP;
    }
    if input.hour_of_day < BUSINESS_HOURS_START || input.hour_of_day > BUSINESS_HOURS_END {
        risk += WEIGHT_OUTSIDE_BUSINESS_HOURS;
    }
    if input.requests_high_risk {
        risk += WEIGHT_HIGH_RISK_PRIVILEGE;
    }
    if input.session_age < NEW_SESSION_THRESHOLD {
        risk += WEIGHT_NEW_SESSION;
    }

    risk.min(1.0)
}
