//! Cryptographic key lifecycle management
//!
//! Owns every key used for pseudonymization and walks each one through the
//! `Active → Rotating → Archived → Revoked` lifecycle. Key material never
//! leaves this module: the pseudonymization engine reads keys through
//! crate-internal closure accessors that run under the read lock, and
//! material is overwritten with zeros before a key reaches `Revoked`.
//! A revoked version can no longer be resolved, which is the crypto-shredding
//! erasure guarantee.
//!
//! Lifecycle transitions are driven by a single min-heap of pending
//! transitions keyed by fire time, processed on the rotation tick, so
//! resource usage stays bounded regardless of how many keys have rotated.

use crate::audit::{emit, AuditDetail, AuditEvent, AuditSink};
use crate::config::KeyManagerConfig;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::Zeroize;

/// Salt length per key, in bytes
pub const SALT_SIZE: usize = 16;

/// Lifecycle status of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// The single key currently used for new pseudonymization
    Active,
    /// Demoted by rotation, still readable, awaiting archival
    Rotating,
    /// Readable for de-pseudonymization of old data only
    Archived,
    /// Material wiped; the version can no longer be resolved
    Revoked,
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Rotating => write!(f, "rotating"),
            Self::Archived => write!(f, "archived"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// A managed cryptographic key.
///
/// Fields are crate-private; nothing outside [`KeyManager`] holds one.
pub(crate) struct CryptoKey {
    version: u32,
    material: Vec<u8>,
    salt: [u8; SALT_SIZE],
    algorithm: &'static str,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: KeyStatus,
}

impl CryptoKey {
    /// Numeric key version
    pub(crate) fn version(&self) -> u32 {
        self.version
    }

    /// Raw key bytes (read-only, under the manager's lock)
    pub(crate) fn material(&self) -> &[u8] {
        &self.material
    }

    /// Per-key salt
    pub(crate) fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Algorithm tag ("AES-256-GCM")
    pub(crate) fn algorithm(&self) -> &'static str {
        self.algorithm
    }

    /// Current lifecycle status
    pub(crate) fn status(&self) -> KeyStatus {
        self.status
    }

    fn wipe(&mut self) {
        self.material.zeroize();
        self.status = KeyStatus::Revoked;
    }
}

impl Drop for CryptoKey {
    fn drop(&mut self) {
        self.material.zeroize();
    }
}

/// Target of a scheduled lifecycle transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TransitionTarget {
    Archive,
    Destroy,
}

/// A delayed lifecycle transition, ordered by fire time for the min-heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingTransition {
    fire_at: DateTime<Utc>,
    version: u32,
    target: TransitionTarget,
}

/// Non-secret metadata about a managed key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Numeric key version
    pub version: u32,
    /// Algorithm tag
    pub algorithm: String,
    /// Lifecycle status
    pub status: KeyStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Scheduled rotation deadline
    pub expires_at: DateTime<Utc>,
}

/// Key metrics for operational visibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMetrics {
    /// Keys in the active table (Active + Rotating)
    pub active_keys: usize,
    /// Keys in the archived table
    pub archived_keys: usize,
    /// Total keys generated since startup
    pub total_generated: u32,
    /// Timestamp of the most recent successful rotation
    pub last_rotation: Option<DateTime<Utc>>,
}

struct KeyTable {
    /// Active and rotating keys by version
    active: HashMap<u32, CryptoKey>,
    /// Archived keys by version
    archived: HashMap<u32, CryptoKey>,
    /// Pending transitions, earliest fire time first
    transitions: BinaryHeap<Reverse<PendingTransition>>,
    next_version: u32,
    total_generated: u32,
    last_rotation: Option<DateTime<Utc>>,
}

/// Manages the cryptographic key lifecycle
pub struct KeyManager {
    table: RwLock<KeyTable>,
    config: KeyManagerConfig,
    sink: Arc<dyn AuditSink>,
}

impl KeyManager {
    /// Create a key manager and generate the initial `Active` key.
    pub fn new(config: KeyManagerConfig, sink: Arc<dyn AuditSink>) -> Result<Self> {
        let mut table = KeyTable {
            active: HashMap::new(),
            archived: HashMap::new(),
            transitions: BinaryHeap::new(),
            next_version: 1,
            total_generated: 0,
            last_rotation: None,
        };

        let key = generate_key(&config, &mut table)?;
        let version = key.version;
        table.active.insert(version, key);

        tracing::info!(version, "Generated initial pseudonymization key");

        Ok(Self {
            table: RwLock::new(table),
            config,
            sink,
        })
    }

    /// Spawn the background rotation task: rotates on the configured
    /// interval and processes due lifecycle transitions on every tick.
    /// Runs for the lifetime of the manager.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        let interval = self.config.rotation_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the initial key
            // is not rotated at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = manager.rotate_with_type("scheduled").await {
                    // Retried at the next tick, never inline.
                    tracing::warn!(error = %e, "Scheduled key rotation failed");
                }
                manager.process_due_transitions().await;
            }
        })
    }

    /// Version of the single `Active` key
    pub async fn active_version(&self) -> Result<u32> {
        let table = self.table.read().await;
        table
            .active
            .values()
            .find(|k| k.status == KeyStatus::Active)
            .map(|k| k.version)
            .ok_or(Error::NoActiveKey)
    }

    /// Lifecycle status of a key version. Fails with [`Error::KeyNotFound`]
    /// once the version has been securely destroyed.
    pub async fn key_status(&self, version: u32) -> Result<KeyStatus> {
        self.with_key(version, |k| k.status()).await
    }

    /// Non-secret metadata for a key version
    pub async fn key_info(&self, version: u32) -> Result<KeyInfo> {
        self.with_key(version, |k| KeyInfo {
            version: k.version,
            algorithm: k.algorithm.to_string(),
            status: k.status,
            created_at: k.created_at,
            expires_at: k.expires_at,
        })
        .await
    }

    /// Run `f` against the active key under the read lock.
    pub(crate) async fn with_active_key<R>(&self, f: impl FnOnce(&CryptoKey) -> R) -> Result<R> {
        let table = self.table.read().await;
        let key = table
            .active
            .values()
            .find(|k| k.status == KeyStatus::Active)
            .ok_or(Error::NoActiveKey)?;
        Ok(f(key))
    }

    /// Run `f` against a key resolved by version, across the active and
    /// archived sets, under the read lock.
    pub(crate) async fn with_key<R>(
        &self,
        version: u32,
        f: impl FnOnce(&CryptoKey) -> R,
    ) -> Result<R> {
        let table = self.table.read().await;
        let key = table
            .active
            .get(&version)
            .or_else(|| table.archived.get(&version))
            .ok_or(Error::KeyNotFound(version))?;
        Ok(f(key))
    }

    /// Rotate keys manually: generate a new `Active` key, demote the
    /// previous one to `Rotating`, and schedule its archival and eventual
    /// secure destruction. Serialized under the exclusive lock, so two
    /// concurrent rotations can never both leave a second active key.
    pub async fn rotate_keys(&self) -> Result<u32> {
        self.rotate_with_type("manual").await
    }

    async fn rotate_with_type(&self, rotation_type: &str) -> Result<u32> {
        let now = Utc::now();
        let grace = chrono_duration(self.config.grace_period());

        let outcome = {
            let mut table = self.table.write().await;

            let old_version = table
                .active
                .values()
                .find(|k| k.status == KeyStatus::Active)
                .map(|k| k.version);

            match generate_key(&self.config, &mut table) {
                Ok(new_key) => {
                    let new_version = new_key.version;
                    if let Some(old) = old_version {
                        if let Some(key) = table.active.get_mut(&old) {
                            key.status = KeyStatus::Rotating;
                        }
                        table.transitions.push(Reverse(PendingTransition {
                            fire_at: now + grace,
                            version: old,
                            target: TransitionTarget::Archive,
                        }));
                    }
                    table.active.insert(new_version, new_key);
                    table.last_rotation = Some(now);
                    Ok((old_version, new_version))
                }
                Err(e) => Err((old_version, e)),
            }
        };

        // Audit outside the critical section; the sink must not extend
        // lock hold times.
        match outcome {
            Ok((old_version, new_version)) => {
                emit(
                    self.sink.as_ref(),
                    &AuditEvent::new(
                        "system",
                        "key_rotation",
                        AuditDetail::KeyRotation {
                            old_version,
                            new_version: Some(new_version),
                            rotation_type: rotation_type.to_string(),
                        },
                    ),
                );
                tracing::info!(
                    old_version = ?old_version,
                    new_version,
                    rotation_type,
                    "Key rotation completed"
                );
                Ok(new_version)
            }
            Err((old_version, e)) => {
                emit(
                    self.sink.as_ref(),
                    &AuditEvent::new(
                        "system",
                        "key_rotation",
                        AuditDetail::KeyRotation {
                            old_version,
                            new_version: None,
                            rotation_type: rotation_type.to_string(),
                        },
                    )
                    .failed(e.to_string()),
                );
                Err(e)
            }
        }
    }

    /// Apply every pending lifecycle transition whose fire time has passed:
    /// `Rotating` keys move to `Archived`, and archived keys past their
    /// retention are wiped and dropped (`Revoked`).
    pub async fn process_due_transitions(&self) {
        let now = Utc::now();
        let retention = chrono_duration(self.config.archive_retention());
        let mut applied: Vec<(u32, KeyStatus)> = Vec::new();

        {
            let mut table = self.table.write().await;
            while let Some(Reverse(next)) = table.transitions.peek().copied() {
                if next.fire_at > now {
                    break;
                }
                table.transitions.pop();

                match next.target {
                    TransitionTarget::Archive => {
                        if let Some(mut key) = table.active.remove(&next.version) {
                            key.status = KeyStatus::Archived;
                            table.archived.insert(next.version, key);
                            table.transitions.push(Reverse(PendingTransition {
                                fire_at: now + retention,
                                version: next.version,
                                target: TransitionTarget::Destroy,
                            }));
                            applied.push((next.version, KeyStatus::Archived));
                        }
                    }
                    TransitionTarget::Destroy => {
                        // Wiped under the exclusive lock so no reader can
                        // observe partially-zeroed material.
                        if let Some(mut key) = table.archived.remove(&next.version) {
                            key.wipe();
                            applied.push((next.version, KeyStatus::Revoked));
                        }
                    }
                }
            }
        }

        for (version, status) in applied {
            emit(
                self.sink.as_ref(),
                &AuditEvent::new(
                    "system",
                    "key_transition",
                    AuditDetail::KeyTransition {
                        version,
                        status: status.to_string(),
                    },
                ),
            );
            tracing::debug!(version, status = %status, "Key lifecycle transition");
        }
    }

    /// Key management metrics
    pub async fn metrics(&self) -> KeyMetrics {
        let table = self.table.read().await;
        KeyMetrics {
            active_keys: table.active.len(),
            archived_keys: table.archived.len(),
            total_generated: table.total_generated,
            last_rotation: table.last_rotation,
        }
    }
}

/// Generate a fresh key from the OS entropy source.
fn generate_key(config: &KeyManagerConfig, table: &mut KeyTable) -> Result<CryptoKey> {
    let mut material = vec![0u8; config.key_size];
    OsRng
        .try_fill_bytes(&mut material)
        .map_err(|e| Error::Crypto(format!("entropy source failed: {}", e)))?;

    let mut salt = [0u8; SALT_SIZE];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| Error::Crypto(format!("entropy source failed: {}", e)))?;

    let version = table.next_version;
    table.next_version += 1;
    table.total_generated += 1;

    let now = Utc::now();
    Ok(CryptoKey {
        version,
        material,
        salt,
        algorithm: "AES-256-GCM",
        created_at: now,
        expires_at: now + chrono_duration(config.rotation_interval()),
        status: KeyStatus::Active,
    })
}

fn chrono_duration(d: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;

    fn fast_config() -> KeyManagerConfig {
        KeyManagerConfig {
            key_size: 32,
            rotation_interval_secs: 3600,
            grace_period_secs: 0,
            archive_retention_secs: 0,
        }
    }

    fn manager(config: KeyManagerConfig) -> (Arc<KeyManager>, Arc<MemorySink>) {
        let sink = MemorySink::shared();
        let km = KeyManager::new(config, sink.clone()).unwrap();
        (Arc::new(km), sink)
    }

    #[tokio::test]
    async fn test_initial_key_is_active() {
        let (km, _) = manager(fast_config());
        let version = km.active_version().await.unwrap();
        assert_eq!(version, 1);
        assert_eq!(km.key_status(1).await.unwrap(), KeyStatus::Active);
    }

    #[tokio::test]
    async fn test_rotation_demotes_previous_active() {
        let (km, sink) = manager(fast_config());
        let new_version = km.rotate_keys().await.unwrap();
        assert_eq!(new_version, 2);

        assert_eq!(km.key_status(1).await.unwrap(), KeyStatus::Rotating);
        assert_eq!(km.key_status(2).await.unwrap(), KeyStatus::Active);
        assert_eq!(km.active_version().await.unwrap(), 2);

        let rotations = sink.events_for("key_rotation");
        assert_eq!(rotations.len(), 1);
        assert!(rotations[0].success);
    }

    #[tokio::test]
    async fn test_exactly_one_active_key_across_rotations() {
        let (km, _) = manager(fast_config());
        for _ in 0..5 {
            km.rotate_keys().await.unwrap();
            let table = km.table.read().await;
            let active_count = table
                .active
                .values()
                .filter(|k| k.status == KeyStatus::Active)
                .count();
            assert_eq!(active_count, 1);
        }
    }

    #[tokio::test]
    async fn test_concurrent_rotations_keep_single_active() {
        let (km, _) = manager(fast_config());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let km = km.clone();
            handles.push(tokio::spawn(async move { km.rotate_keys().await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let table = km.table.read().await;
        let active_count = table
            .active
            .values()
            .filter(|k| k.status == KeyStatus::Active)
            .count();
        assert_eq!(active_count, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_archive_then_destroy() {
        let (km, sink) = manager(fast_config());
        km.rotate_keys().await.unwrap();

        // Zero grace period: archive fires on the first pass.
        km.process_due_transitions().await;
        assert_eq!(km.key_status(1).await.unwrap(), KeyStatus::Archived);

        // Zero archive retention: destruction fires on the next pass.
        km.process_due_transitions().await;
        let err = km.key_status(1).await.unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(1)));

        let transitions = sink.events_for("key_transition");
        assert_eq!(transitions.len(), 2);
    }

    #[tokio::test]
    async fn test_archived_key_still_resolvable() {
        let mut config = fast_config();
        config.archive_retention_secs = 3600;
        let (km, _) = manager(config);
        km.rotate_keys().await.unwrap();
        km.process_due_transitions().await;

        assert_eq!(km.key_status(1).await.unwrap(), KeyStatus::Archived);
        let salt_len = km.with_key(1, |k| k.salt().len()).await.unwrap();
        assert_eq!(salt_len, SALT_SIZE);
    }

    #[tokio::test]
    async fn test_metrics() {
        let (km, _) = manager(fast_config());
        km.rotate_keys().await.unwrap();
        let metrics = km.metrics().await;
        assert_eq!(metrics.total_generated, 2);
        assert_eq!(metrics.active_keys, 2); // one Active, one Rotating
        assert!(metrics.last_rotation.is_some());
    }

    #[tokio::test]
    async fn test_key_info_exposes_no_material() {
        let (km, _) = manager(fast_config());
        let info = km.key_info(1).await.unwrap();
        assert_eq!(info.version, 1);
        assert_eq!(info.algorithm, "AES-256-GCM");
        assert!(info.expires_at > info.created_at);
        // Serialized form carries metadata only.
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("material"));
    }

    #[tokio::test]
    async fn test_key_material_has_expected_size() {
        let (km, _) = manager(fast_config());
        let len = km.with_active_key(|k| k.material().len()).await.unwrap();
        assert_eq!(len, 32);
        let algo = km.with_active_key(|k| k.algorithm()).await.unwrap();
        assert_eq!(algo, "AES-256-GCM");
    }
}
