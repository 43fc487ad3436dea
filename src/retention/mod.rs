//! Retention scheduling and purge execution with legal-hold override
//!
//! Policies describe how long each data category lives; purge jobs carry
//! that decision out through a pluggable [`PurgeExecutor`]. Legal holds veto
//! purges, and the veto is re-checked at execution time, not at scheduling
//! time: a hold created after a job was scheduled still forces the job to
//! `Skipped`.

mod policy;

pub use policy::{default_policies, policy_templates, PolicyTemplate, PurgeMethod, RetentionPolicy};

use crate::audit::{emit, AuditDetail, AuditEvent, AuditSink};
use crate::config::RetentionConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Predicate identifying the records a job or hold applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSelector {
    /// Data category the selector targets
    pub data_category: String,
    /// Only records created before this instant, when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
}

impl DataSelector {
    /// Selector over an entire data category
    pub fn category(data_category: impl Into<String>) -> Self {
        Self {
            data_category: data_category.into(),
            created_before: None,
        }
    }
}

/// Purge job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Scheduled, not yet executed
    Pending,
    /// Currently executing
    Running,
    /// Executed successfully
    Completed,
    /// Vetoed by an active legal hold at execution time
    Skipped,
    /// Execution failed
    Failed,
    /// Withdrawn before execution
    Cancelled,
}

impl JobStatus {
    /// Whether the job can no longer change state
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A scheduled or executed data purge operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeJob {
    /// Job identifier
    pub id: String,
    /// Policy the job executes
    pub policy_id: String,
    /// Records the job applies to
    pub selector: DataSelector,
    /// When the job becomes due
    pub scheduled_at: DateTime<Utc>,
    /// Current status
    pub status: JobStatus,
    /// Records identified for purging
    pub records_found: u64,
    /// Records actually purged (always 0 for dry runs)
    pub records_purged: u64,
    /// Failure or skip explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Preview mode: identify records without deleting
    pub dry_run: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the job reached a terminal status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A legal requirement that vetoes purging matching records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalHold {
    /// Hold identifier
    pub id: String,
    /// Short name
    pub name: String,
    /// What the hold protects and why
    pub description: String,
    /// Records the hold protects
    pub selector: DataSelector,
    /// User who created the hold
    pub created_by: String,
    /// Legal reason for the hold
    pub reason: String,
    /// Optional expiry; absent means indefinite
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the hold is currently active
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl LegalHold {
    /// Whether the hold is active and unexpired at `now`
    pub fn is_in_force(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map(|t| now <= t).unwrap_or(true)
    }

    /// Whether the hold protects records matched by `selector`
    pub fn covers(&self, selector: &DataSelector) -> bool {
        self.selector.data_category == selector.data_category
    }
}

/// Result of a successful purge execution
#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeOutcome {
    /// Records identified by the selector
    pub records_found: u64,
    /// Records actually purged
    pub records_purged: u64,
}

/// Error returned by a purge executor
#[derive(Debug, thiserror::Error)]
#[error("purge execution failed: {0}")]
pub struct ExecutorError(pub String);

/// Carries out purges against the surrounding system's datastore.
///
/// The scheduler owns the decision of *whether* and *when* to purge; the
/// executor owns *how*. Dry runs must identify records without deleting
/// anything.
pub trait PurgeExecutor: Send + Sync {
    /// Purge (or, for dry runs, count) the records matched by `selector`
    /// using the policy's purge method.
    fn purge(
        &self,
        policy: &RetentionPolicy,
        selector: &DataSelector,
        dry_run: bool,
    ) -> std::result::Result<PurgeOutcome, ExecutorError>;
}

/// Executor that purges nothing, for wiring the scheduler without a
/// datastore backend.
#[derive(Debug, Default, Clone)]
pub struct NoopExecutor;

impl PurgeExecutor for NoopExecutor {
    fn purge(
        &self,
        _policy: &RetentionPolicy,
        _selector: &DataSelector,
        _dry_run: bool,
    ) -> std::result::Result<PurgeOutcome, ExecutorError> {
        Ok(PurgeOutcome::default())
    }
}

/// Retention metrics for operational visibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionMetrics {
    /// Registered policies
    pub active_policies: usize,
    /// Jobs awaiting execution
    pub pending_jobs: usize,
    /// Jobs currently executing
    pub running_jobs: usize,
    /// Jobs that completed successfully
    pub completed_jobs: usize,
    /// Jobs vetoed by a legal hold
    pub skipped_jobs: usize,
    /// Jobs that failed
    pub failed_jobs: usize,
    /// Jobs withdrawn before execution
    pub cancelled_jobs: usize,
    /// Legal holds currently in force
    pub active_holds: usize,
}

struct RetentionState {
    policies: HashMap<String, RetentionPolicy>,
    jobs: HashMap<String, PurgeJob>,
    holds: HashMap<String, LegalHold>,
}

/// Retention policy scheduler
pub struct RetentionScheduler {
    state: RwLock<RetentionState>,
    config: RetentionConfig,
    executor: Arc<dyn PurgeExecutor>,
    sink: Arc<dyn AuditSink>,
}

impl RetentionScheduler {
    /// Create a scheduler. Installs the standard policy set when configured
    /// to.
    pub fn new(
        config: RetentionConfig,
        executor: Arc<dyn PurgeExecutor>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let mut policies = HashMap::new();
        if config.install_default_policies {
            for policy in default_policies() {
                policies.insert(policy.id.clone(), policy);
            }
        }

        Self {
            state: RwLock::new(RetentionState {
                policies,
                jobs: HashMap::new(),
                holds: HashMap::new(),
            }),
            config,
            executor,
            sink,
        }
    }

    /// Spawn the periodic job-processing tick. Runs for the lifetime of the
    /// scheduler.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = self.clone();
        let interval = self.config.tick_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let scheduled = scheduler.schedule_automatic_purges().await;
                if scheduled > 0 {
                    tracing::debug!(scheduled, "Automatic purge jobs scheduled");
                }
                let processed = scheduler.process_due_jobs().await;
                if processed > 0 {
                    tracing::debug!(processed, "Due purge jobs processed");
                }
            }
        })
    }

    /// Create a purge job for every automated-purge policy, targeting
    /// records past their retention period. A policy that already has a
    /// non-terminal job is skipped, so repeated ticks do not pile up
    /// duplicates. Returns the number of jobs scheduled.
    pub async fn schedule_automatic_purges(&self) -> usize {
        let now = Utc::now();
        let due: Vec<(String, DataSelector)> = {
            let state = self.state.read().await;
            state
                .policies
                .values()
                .filter(|p| p.automated_purge)
                .filter(|p| {
                    !state
                        .jobs
                        .values()
                        .any(|j| j.policy_id == p.id && !j.status.is_terminal())
                })
                .map(|p| {
                    let cutoff =
                        now - ChronoDuration::seconds(p.retention_period_secs as i64);
                    (
                        p.id.clone(),
                        DataSelector {
                            data_category: p.data_category.clone(),
                            created_before: Some(cutoff),
                        },
                    )
                })
                .collect()
        };

        let mut scheduled = 0;
        for (policy_id, selector) in due {
            match self.schedule_purge_job(&policy_id, selector, now, false).await {
                Ok(_) => scheduled += 1,
                Err(e) => {
                    tracing::warn!(policy_id = %policy_id, error = %e, "Automatic purge scheduling failed");
                }
            }
        }
        scheduled
    }

    /// Register a retention policy. All validation violations are reported
    /// together.
    pub async fn add_policy(&self, mut policy: RetentionPolicy) -> Result<()> {
        let violations = policy.validate();
        if !violations.is_empty() {
            return Err(Error::Validation(violations));
        }

        let now = Utc::now();
        policy.created_at = now;
        policy.updated_at = now;
        let policy_id = policy.id.clone();
        {
            let mut state = self.state.write().await;
            state.policies.insert(policy_id.clone(), policy);
        }

        emit(
            self.sink.as_ref(),
            &AuditEvent::new(
                "system",
                "retention_policy",
                AuditDetail::Retention {
                    policy_id,
                    event_type: "policy_added".to_string(),
                },
            ),
        );
        Ok(())
    }

    /// Snapshot of a policy, if registered
    pub async fn policy(&self, policy_id: &str) -> Option<RetentionPolicy> {
        self.state.read().await.policies.get(policy_id).cloned()
    }

    /// Schedule a purge job under an existing policy. The job stays
    /// `Pending` until its scheduled time passes and a processing tick picks
    /// it up.
    pub async fn schedule_purge_job(
        &self,
        policy_id: &str,
        selector: DataSelector,
        scheduled_at: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<PurgeJob> {
        let job = {
            let mut state = self.state.write().await;
            if !state.policies.contains_key(policy_id) {
                return Err(Error::PolicyNotFound(policy_id.to_string()));
            }

            let job = PurgeJob {
                id: Uuid::new_v4().to_string(),
                policy_id: policy_id.to_string(),
                selector,
                scheduled_at,
                status: JobStatus::Pending,
                records_found: 0,
                records_purged: 0,
                error_message: None,
                dry_run,
                created_at: Utc::now(),
                completed_at: None,
            };
            state.jobs.insert(job.id.clone(), job.clone());
            job
        };

        emit(
            self.sink.as_ref(),
            &AuditEvent::new(
                "system",
                "retention_policy",
                AuditDetail::Retention {
                    policy_id: policy_id.to_string(),
                    event_type: "job_scheduled".to_string(),
                },
            ),
        );
        Ok(job)
    }

    /// Withdraw a pending purge job. Jobs that have started executing are
    /// terminal and cannot be withdrawn.
    pub async fn cancel_purge_job(&self, job_id: &str) -> Result<()> {
        let policy_id = {
            let mut state = self.state.write().await;
            let job = state
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
            if job.status != JobStatus::Pending {
                return Err(Error::JobAlreadyTerminal {
                    id: job_id.to_string(),
                    status: job.status.to_string(),
                });
            }
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
            job.policy_id.clone()
        };

        emit(
            self.sink.as_ref(),
            &AuditEvent::new(
                "system",
                "purge_job",
                AuditDetail::PurgeJob {
                    job_id: job_id.to_string(),
                    policy_id,
                    status: JobStatus::Cancelled.to_string(),
                    dry_run: false,
                },
            ),
        );
        Ok(())
    }

    /// Register a legal hold. The hold takes effect immediately, including
    /// for jobs scheduled before it was created.
    pub async fn create_legal_hold(&self, mut hold: LegalHold) -> Result<()> {
        let now = Utc::now();
        hold.created_at = now;
        hold.updated_at = now;
        hold.is_active = true;
        let (hold_id, actor) = (hold.id.clone(), hold.created_by.clone());
        {
            let mut state = self.state.write().await;
            state.holds.insert(hold_id.clone(), hold);
        }

        emit(
            self.sink.as_ref(),
            &AuditEvent::new(
                actor,
                "legal_hold",
                AuditDetail::LegalHold {
                    hold_id,
                    action: "created".to_string(),
                },
            ),
        );
        Ok(())
    }

    /// Release a legal hold, allowing purges of its records again
    pub async fn release_legal_hold(&self, hold_id: &str) -> Result<()> {
        {
            let mut state = self.state.write().await;
            let hold = state
                .holds
                .get_mut(hold_id)
                .ok_or_else(|| Error::HoldNotFound(hold_id.to_string()))?;
            hold.is_active = false;
            hold.updated_at = Utc::now();
        }

        emit(
            self.sink.as_ref(),
            &AuditEvent::new(
                "system",
                "legal_hold",
                AuditDetail::LegalHold {
                    hold_id: hold_id.to_string(),
                    action: "released".to_string(),
                },
            ),
        );
        Ok(())
    }

    /// Execute every pending job whose scheduled time has passed. Returns
    /// the number of jobs that reached a terminal status.
    ///
    /// Legal holds are checked here, at execution time, so a hold created
    /// after a job was scheduled still vetoes it. The executor runs outside
    /// the lock; only status bookkeeping happens under it.
    pub async fn process_due_jobs(&self) -> usize {
        let now = Utc::now();

        // Claim due jobs: mark them Running under one exclusive lock.
        let claimed: Vec<(PurgeJob, RetentionPolicy, bool)> = {
            let mut state = self.state.write().await;
            let due: Vec<String> = state
                .jobs
                .values()
                .filter(|j| j.status == JobStatus::Pending && now > j.scheduled_at)
                .map(|j| j.id.clone())
                .collect();

            let mut claimed = Vec::with_capacity(due.len());
            for id in due {
                let held = {
                    let job = match state.jobs.get(&id) {
                        Some(j) => j,
                        None => continue,
                    };
                    state
                        .holds
                        .values()
                        .any(|h| h.is_in_force(now) && h.covers(&job.selector))
                };
                let policy = match state.jobs.get(&id).and_then(|j| {
                    state.policies.get(&j.policy_id).cloned()
                }) {
                    Some(p) => p,
                    None => continue,
                };
                if let Some(job) = state.jobs.get_mut(&id) {
                    job.status = JobStatus::Running;
                    claimed.push((job.clone(), policy, held));
                }
            }
            claimed
        };

        let mut finished = 0;
        for (job, policy, held) in claimed {
            let (status, outcome, message) = if held {
                (
                    JobStatus::Skipped,
                    PurgeOutcome::default(),
                    Some("purge vetoed by active legal hold".to_string()),
                )
            } else {
                match self.executor.purge(&policy, &job.selector, job.dry_run) {
                    Ok(mut outcome) => {
                        if job.dry_run {
                            outcome.records_purged = 0;
                        }
                        (JobStatus::Completed, outcome, None)
                    }
                    Err(e) => (JobStatus::Failed, PurgeOutcome::default(), Some(e.to_string())),
                }
            };

            {
                let mut state = self.state.write().await;
                if let Some(live) = state.jobs.get_mut(&job.id) {
                    live.status = status;
                    live.records_found = outcome.records_found;
                    live.records_purged = outcome.records_purged;
                    live.error_message = message.clone();
                    live.completed_at = Some(Utc::now());
                }
            }

            let mut event = AuditEvent::new(
                "system",
                "purge_job",
                AuditDetail::PurgeJob {
                    job_id: job.id.clone(),
                    policy_id: job.policy_id.clone(),
                    status: status.to_string(),
                    dry_run: job.dry_run,
                },
            );
            if status != JobStatus::Completed {
                if let Some(msg) = message {
                    event = event.failed(msg);
                }
            }
            emit(self.sink.as_ref(), &event);
            finished += 1;
        }
        finished
    }

    /// Snapshot of a job, if it exists
    pub async fn job(&self, job_id: &str) -> Option<PurgeJob> {
        self.state.read().await.jobs.get(job_id).cloned()
    }

    /// Snapshot of all jobs
    pub async fn jobs(&self) -> Vec<PurgeJob> {
        self.state.read().await.jobs.values().cloned().collect()
    }

    /// Retention metrics snapshot
    pub async fn metrics(&self) -> RetentionMetrics {
        let state = self.state.read().await;
        let now = Utc::now();
        let mut metrics = RetentionMetrics {
            active_policies: state.policies.len(),
            pending_jobs: 0,
            running_jobs: 0,
            completed_jobs: 0,
            skipped_jobs: 0,
            failed_jobs: 0,
            cancelled_jobs: 0,
            active_holds: state.holds.values().filter(|h| h.is_in_force(now)).count(),
        };
        for job in state.jobs.values() {
            match job.status {
                JobStatus::Pending => metrics.pending_jobs += 1,
                JobStatus::Running => metrics.running_jobs += 1,
                JobStatus::Completed => metrics.completed_jobs += 1,
                JobStatus::Skipped => metrics.skipped_jobs += 1,
                JobStatus::Failed => metrics.failed_jobs += 1,
                JobStatus::Cancelled => metrics.cancelled_jobs += 1,
            }
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingExecutor {
        records: u64,
        calls: AtomicU64,
    }

    impl CountingExecutor {
        fn new(records: u64) -> Arc<Self> {
            Arc::new(Self {
                records,
                calls: AtomicU64::new(0),
            })
        }
    }

    impl PurgeExecutor for CountingExecutor {
        fn purge(
            &self,
            _policy: &RetentionPolicy,
            _selector: &DataSelector,
            dry_run: bool,
        ) -> std::result::Result<PurgeOutcome, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PurgeOutcome {
                records_found: self.records,
                records_purged: if dry_run { 0 } else { self.records },
            })
        }
    }

    struct FailingExecutor;

    impl PurgeExecutor for FailingExecutor {
        fn purge(
            &self,
            _policy: &RetentionPolicy,
            _selector: &DataSelector,
            _dry_run: bool,
        ) -> std::result::Result<PurgeOutcome, ExecutorError> {
            Err(ExecutorError("datastore unavailable".to_string()))
        }
    }

    fn scheduler_with(
        executor: Arc<dyn PurgeExecutor>,
    ) -> (Arc<RetentionScheduler>, Arc<MemorySink>) {
        let sink = MemorySink::shared();
        let config = RetentionConfig {
            tick_interval_secs: 3600,
            install_default_policies: true,
        };
        (
            Arc::new(RetentionScheduler::new(config, executor, sink.clone())),
            sink,
        )
    }

    fn hold_on(category: &str, id: &str) -> LegalHold {
        LegalHold {
            id: id.to_string(),
            name: "litigation hold".to_string(),
            description: String::new(),
            selector: DataSelector::category(category),
            created_by: "legal-team".to_string(),
            reason: "pending litigation".to_string(),
            expires_at: None,
            is_active: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_invalid_policy_reports_all_violations() {
        let (scheduler, _) = scheduler_with(Arc::new(NoopExecutor));
        let mut policy = default_policies().remove(0);
        policy.id = String::new();
        policy.legal_basis = String::new();

        let err = scheduler.add_policy(policy).await.unwrap_err();
        match err {
            Error::Validation(violations) => assert!(violations.len() >= 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_default_policies_installed() {
        let (scheduler, _) = scheduler_with(Arc::new(NoopExecutor));
        assert!(scheduler.policy("personal-data-standard").await.is_some());
        assert_eq!(scheduler.metrics().await.active_policies, 5);
    }

    #[tokio::test]
    async fn test_job_executes_when_due() {
        let executor = CountingExecutor::new(42);
        let (scheduler, sink) = scheduler_with(executor.clone());

        let job = scheduler
            .schedule_purge_job(
                "log-data-standard",
                DataSelector::category("log"),
                Utc::now() - ChronoDuration::seconds(1),
                false,
            )
            .await
            .unwrap();

        assert_eq!(scheduler.process_due_jobs().await, 1);
        let done = scheduler.job(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.records_found, 42);
        assert_eq!(done.records_purged, 42);
        assert!(done.completed_at.is_some());
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

        let events = sink.events_for("purge_job");
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
    }

    #[tokio::test]
    async fn test_future_job_not_picked_up() {
        let (scheduler, _) = scheduler_with(Arc::new(NoopExecutor));
        scheduler
            .schedule_purge_job(
                "log-data-standard",
                DataSelector::category("log"),
                Utc::now() + ChronoDuration::hours(1),
                false,
            )
            .await
            .unwrap();
        assert_eq!(scheduler.process_due_jobs().await, 0);
        assert_eq!(scheduler.metrics().await.pending_jobs, 1);
    }

    #[tokio::test]
    async fn test_hold_created_after_scheduling_skips_job() {
        let executor = CountingExecutor::new(10);
        let (scheduler, sink) = scheduler_with(executor.clone());

        let job = scheduler
            .schedule_purge_job(
                "personal-data-standard",
                DataSelector::category("personal"),
                Utc::now() - ChronoDuration::seconds(1),
                false,
            )
            .await
            .unwrap();

        // Hold arrives after the job was scheduled; it must still veto.
        scheduler
            .create_legal_hold(hold_on("personal", "hold-1"))
            .await
            .unwrap();

        assert_eq!(scheduler.process_due_jobs().await, 1);
        let done = scheduler.job(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Skipped);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);

        let events = sink.events_for("purge_job");
        assert!(!events[0].success);
    }

    #[tokio::test]
    async fn test_hold_on_other_category_does_not_veto() {
        let (scheduler, _) = scheduler_with(CountingExecutor::new(5));
        let job = scheduler
            .schedule_purge_job(
                "log-data-standard",
                DataSelector::category("log"),
                Utc::now() - ChronoDuration::seconds(1),
                false,
            )
            .await
            .unwrap();
        scheduler
            .create_legal_hold(hold_on("personal", "hold-1"))
            .await
            .unwrap();

        scheduler.process_due_jobs().await;
        assert_eq!(
            scheduler.job(&job.id).await.unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_released_hold_allows_purge() {
        let (scheduler, _) = scheduler_with(CountingExecutor::new(5));
        scheduler
            .create_legal_hold(hold_on("log", "hold-1"))
            .await
            .unwrap();
        scheduler.release_legal_hold("hold-1").await.unwrap();

        let job = scheduler
            .schedule_purge_job(
                "log-data-standard",
                DataSelector::category("log"),
                Utc::now() - ChronoDuration::seconds(1),
                false,
            )
            .await
            .unwrap();
        scheduler.process_due_jobs().await;
        assert_eq!(
            scheduler.job(&job.id).await.unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_expired_hold_ignored() {
        let (scheduler, _) = scheduler_with(CountingExecutor::new(5));
        let mut hold = hold_on("log", "hold-1");
        hold.expires_at = Some(Utc::now() - ChronoDuration::hours(1));
        scheduler.create_legal_hold(hold).await.unwrap();

        let job = scheduler
            .schedule_purge_job(
                "log-data-standard",
                DataSelector::category("log"),
                Utc::now() - ChronoDuration::seconds(1),
                false,
            )
            .await
            .unwrap();
        scheduler.process_due_jobs().await;
        assert_eq!(
            scheduler.job(&job.id).await.unwrap().status,
            JobStatus::Completed
        );
        assert_eq!(scheduler.metrics().await.active_holds, 0);
    }

    #[tokio::test]
    async fn test_dry_run_purges_nothing() {
        let (scheduler, _) = scheduler_with(CountingExecutor::new(1250));
        let job = scheduler
            .schedule_purge_job(
                "personal-data-standard",
                DataSelector::category("personal"),
                Utc::now() - ChronoDuration::seconds(1),
                true,
            )
            .await
            .unwrap();
        scheduler.process_due_jobs().await;

        let done = scheduler.job(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.records_found, 1250);
        assert_eq!(done.records_purged, 0);
    }

    #[tokio::test]
    async fn test_executor_failure_marks_job_failed() {
        let (scheduler, sink) = scheduler_with(Arc::new(FailingExecutor));
        let job = scheduler
            .schedule_purge_job(
                "log-data-standard",
                DataSelector::category("log"),
                Utc::now() - ChronoDuration::seconds(1),
                false,
            )
            .await
            .unwrap();
        scheduler.process_due_jobs().await;

        let done = scheduler.job(&job.id).await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert!(done
            .error_message
            .as_deref()
            .unwrap()
            .contains("datastore unavailable"));
        assert!(!sink.events_for("purge_job")[0].success);
    }

    #[tokio::test]
    async fn test_cancel_before_execution() {
        let (scheduler, _) = scheduler_with(CountingExecutor::new(5));
        let job = scheduler
            .schedule_purge_job(
                "log-data-standard",
                DataSelector::category("log"),
                Utc::now() - ChronoDuration::seconds(1),
                false,
            )
            .await
            .unwrap();
        scheduler.cancel_purge_job(&job.id).await.unwrap();

        assert_eq!(scheduler.process_due_jobs().await, 0);
        assert_eq!(
            scheduler.job(&job.id).await.unwrap().status,
            JobStatus::Cancelled
        );

        // Terminal jobs cannot be cancelled again.
        let err = scheduler.cancel_purge_job(&job.id).await.unwrap_err();
        assert!(matches!(err, Error::JobAlreadyTerminal { .. }));
    }

    #[tokio::test]
    async fn test_unknown_policy_rejected() {
        let (scheduler, _) = scheduler_with(Arc::new(NoopExecutor));
        let err = scheduler
            .schedule_purge_job("nope", DataSelector::category("log"), Utc::now(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PolicyNotFound(_)));
    }

    #[tokio::test]
    async fn test_automatic_purges_for_automated_policies() {
        let (scheduler, _) = scheduler_with(CountingExecutor::new(5));

        // marketing-data-standard requires manual review and is skipped.
        assert_eq!(scheduler.schedule_automatic_purges().await, 4);
        assert_eq!(scheduler.metrics().await.pending_jobs, 4);

        // Policies with a job still pending are not rescheduled.
        assert_eq!(scheduler.schedule_automatic_purges().await, 0);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(scheduler.process_due_jobs().await, 4);
        assert_eq!(scheduler.metrics().await.completed_jobs, 4);

        // Terminal jobs free the policy for the next cycle.
        assert_eq!(scheduler.schedule_automatic_purges().await, 4);
    }

    #[tokio::test]
    async fn test_automatic_purge_selector_targets_expired_records() {
        let (scheduler, _) = scheduler_with(Arc::new(NoopExecutor));
        scheduler.schedule_automatic_purges().await;

        let jobs = scheduler.jobs().await;
        let log_job = jobs
            .iter()
            .find(|j| j.policy_id == "log-data-standard")
            .unwrap();
        assert_eq!(log_job.selector.data_category, "log");
        // Cutoff lies one retention period in the past.
        let cutoff = log_job.selector.created_before.unwrap();
        assert!(cutoff < Utc::now() - ChronoDuration::days(89));
        assert!(!log_job.dry_run);
    }

    #[tokio::test]
    async fn test_metrics_track_job_statuses() {
        let (scheduler, _) = scheduler_with(CountingExecutor::new(5));
        scheduler
            .create_legal_hold(hold_on("personal", "hold-1"))
            .await
            .unwrap();

        scheduler
            .schedule_purge_job(
                "personal-data-standard",
                DataSelector::category("personal"),
                Utc::now() - ChronoDuration::seconds(1),
                false,
            )
            .await
            .unwrap();
        scheduler
            .schedule_purge_job(
                "log-data-standard",
                DataSelector::category("log"),
                Utc::now() - ChronoDuration::seconds(1),
                false,
            )
            .await
            .unwrap();
        scheduler.process_due_jobs().await;

        let metrics = scheduler.metrics().await;
        assert_eq!(metrics.completed_jobs, 1);
        assert_eq!(metrics.skipped_jobs, 1);
        assert_eq!(metrics.active_holds, 1);
    }
}
