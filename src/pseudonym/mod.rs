//! Pseudonymization engine
//!
//! Converts personal values to and from pseudonymized form using keys owned
//! by the [`KeyManager`]. Four algorithm families with distinct
//! reversibility contracts:
//!
//! - [`PseudoAlgorithm::OneWayHash`] — salted derivation, never reversible
//! - [`PseudoAlgorithm::ReversibleEncryption`] — AES-256-GCM, reversible
//!   until the producing key is revoked (crypto-shredding)
//! - [`PseudoAlgorithm::FormatPreserving`] — shape-preserving masking,
//!   one-way by design (no reverse lookup table is kept)
//! - [`PseudoAlgorithm::Tokenization`] — random token; reversal needs an
//!   external token vault, which is not wired in
//!
//! Every call emits an audit event before returning, including on failure.

pub mod transforms;

use crate::audit::{emit, AuditDetail, AuditEvent, AuditSink};
use crate::error::{Error, Result};
use crate::keys::KeyManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Pseudonymization algorithm family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PseudoAlgorithm {
    /// Irreversible salted key-derivation hash
    OneWayHash,
    /// Authenticated symmetric encryption, reversible while the key lives
    ReversibleEncryption,
    /// Shape-preserving masking, one-way by design
    FormatPreserving,
    /// Random token; reversal requires an external vault
    Tokenization,
}

impl std::fmt::Display for PseudoAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneWayHash => write!(f, "one_way_hash"),
            Self::ReversibleEncryption => write!(f, "reversible_encryption"),
            Self::FormatPreserving => write!(f, "format_preserving"),
            Self::Tokenization => write!(f, "tokenization"),
        }
    }
}

/// An immutable pseudonymized value with its provenance metadata.
///
/// References the producing key by numeric version only; whether the value
/// can ever be reversed is determined by the algorithm and by that key's
/// current lifecycle status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PseudonymizedData {
    /// Unique identifier
    pub id: String,
    /// The opaque pseudonymized output
    pub value: String,
    /// Algorithm family that produced the value
    pub algorithm: PseudoAlgorithm,
    /// Version of the key that produced the value
    pub key_version: u32,
    /// Salted hash for equality search without decryption
    pub lookup_hash: String,
    /// Declared data type ("email", "ip_address", ...)
    pub data_type: String,
    /// Processing purpose
    pub purpose: String,
    /// GDPR legal basis
    pub legal_basis: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Engine metrics for compliance monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Total pseudonymize calls (success or failure)
    pub pseudonymize_calls: u64,
    /// Total de-pseudonymize calls (success or failure)
    pub depseudonymize_calls: u64,
    /// Successful pseudonymizations per algorithm
    pub algorithm_distribution: HashMap<String, u64>,
}

#[derive(Default)]
struct Counters {
    pseudonymize_calls: u64,
    depseudonymize_calls: u64,
    per_algorithm: HashMap<PseudoAlgorithm, u64>,
}

/// Pseudonymization engine backed by the key manager
pub struct PseudonymizationEngine {
    keys: Arc<KeyManager>,
    sink: Arc<dyn AuditSink>,
    default_algorithm: PseudoAlgorithm,
    counters: RwLock<Counters>,
}

impl PseudonymizationEngine {
    /// Create an engine over an existing key manager.
    pub fn new(
        keys: Arc<KeyManager>,
        sink: Arc<dyn AuditSink>,
        default_algorithm: PseudoAlgorithm,
    ) -> Self {
        Self {
            keys,
            sink,
            default_algorithm,
            counters: RwLock::new(Counters::default()),
        }
    }

    /// Pseudonymize with the engine's default algorithm.
    pub async fn pseudonymize(
        &self,
        value: &str,
        data_type: &str,
        purpose: &str,
        legal_basis: &str,
    ) -> Result<PseudonymizedData> {
        self.pseudonymize_with(self.default_algorithm, value, data_type, purpose, legal_basis)
            .await
    }

    /// Pseudonymize a value with an explicit algorithm family.
    ///
    /// Format-preserving masking falls back to reversible encryption for
    /// value shapes without a masking rule; the returned record carries the
    /// algorithm actually applied.
    pub async fn pseudonymize_with(
        &self,
        algorithm: PseudoAlgorithm,
        value: &str,
        data_type: &str,
        purpose: &str,
        legal_basis: &str,
    ) -> Result<PseudonymizedData> {
        self.counters.write().await.pseudonymize_calls += 1;

        let outcome = self.apply(algorithm, value).await;

        match outcome {
            Ok((applied, pseudo_value, lookup, key_version)) => {
                self.emit_pseudo_event(
                    "pseudonymize",
                    applied,
                    data_type,
                    purpose,
                    legal_basis,
                    Some(key_version),
                    None,
                );
                *self
                    .counters
                    .write()
                    .await
                    .per_algorithm
                    .entry(applied)
                    .or_insert(0) += 1;

                Ok(PseudonymizedData {
                    id: Uuid::new_v4().to_string(),
                    value: pseudo_value,
                    algorithm: applied,
                    key_version,
                    lookup_hash: lookup,
                    data_type: data_type.to_string(),
                    purpose: purpose.to_string(),
                    legal_basis: legal_basis.to_string(),
                    created_at: Utc::now(),
                })
            }
            Err(e) => {
                self.emit_pseudo_event(
                    "pseudonymize",
                    algorithm,
                    data_type,
                    purpose,
                    legal_basis,
                    None,
                    Some(&e),
                );
                Err(e)
            }
        }
    }

    /// Recover the original value.
    ///
    /// Only reversible encryption has an inverse; every other family fails
    /// deterministically per its contract. Once the producing key has been
    /// revoked, the failure is [`Error::KeyNotFound`] — the intended
    /// permanent crypto-shredding outcome.
    pub async fn depseudonymize(
        &self,
        data: &PseudonymizedData,
        purpose: &str,
        legal_basis: &str,
    ) -> Result<String> {
        self.counters.write().await.depseudonymize_calls += 1;

        let outcome = match data.algorithm {
            PseudoAlgorithm::OneWayHash => Err(Error::NotReversible("one-way hash")),
            PseudoAlgorithm::FormatPreserving => {
                Err(Error::NotReversible("format-preserving transform"))
            }
            PseudoAlgorithm::Tokenization => Err(Error::VaultUnavailable),
            PseudoAlgorithm::ReversibleEncryption => {
                // Decrypt inside the accessor closure; key material never
                // leaves the key manager's read lock.
                match self
                    .keys
                    .with_key(data.key_version, |k| {
                        transforms::decrypt_value(k.material(), &data.value)
                    })
                    .await
                {
                    Ok(inner) => inner,
                    Err(e) => Err(e),
                }
            }
        };

        match outcome {
            Ok(plaintext) => {
                self.emit_pseudo_event(
                    "depseudonymize",
                    data.algorithm,
                    &data.data_type,
                    purpose,
                    legal_basis,
                    Some(data.key_version),
                    None,
                );
                Ok(plaintext)
            }
            Err(e) => {
                self.emit_pseudo_event(
                    "depseudonymize",
                    data.algorithm,
                    &data.data_type,
                    purpose,
                    legal_basis,
                    Some(data.key_version),
                    Some(&e),
                );
                Err(e)
            }
        }
    }

    /// Rotate the underlying keys. Previously pseudonymized reversible data
    /// stays readable until its key is fully revoked.
    pub async fn rotate_keys(&self) -> Result<u32> {
        self.keys.rotate_keys().await
    }

    /// Engine metrics snapshot
    pub async fn metrics(&self) -> EngineMetrics {
        let counters = self.counters.read().await;
        EngineMetrics {
            pseudonymize_calls: counters.pseudonymize_calls,
            depseudonymize_calls: counters.depseudonymize_calls,
            algorithm_distribution: counters
                .per_algorithm
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    /// Apply a forward transform under the active key.
    /// Returns (algorithm actually applied, value, lookup hash, key version).
    async fn apply(
        &self,
        algorithm: PseudoAlgorithm,
        value: &str,
    ) -> Result<(PseudoAlgorithm, String, String, u32)> {
        self.keys
            .with_active_key(|key| {
                let version = key.version();
                let salt = key.salt();
                match algorithm {
                    PseudoAlgorithm::OneWayHash => {
                        let hashed = transforms::one_way_hash(value, salt)?;
                        // The derived value doubles as the lookup hash.
                        Ok((algorithm, hashed.clone(), hashed, version))
                    }
                    PseudoAlgorithm::ReversibleEncryption => {
                        let ciphertext = transforms::encrypt_value(key.material(), value)?;
                        let lookup = transforms::lookup_hash(value, salt);
                        Ok((algorithm, ciphertext, lookup, version))
                    }
                    PseudoAlgorithm::FormatPreserving => {
                        match transforms::format_preserving(value, salt) {
                            Some(masked) => {
                                let lookup = transforms::lookup_hash(value, salt);
                                Ok((algorithm, masked, lookup, version))
                            }
                            None => {
                                let ciphertext =
                                    transforms::encrypt_value(key.material(), value)?;
                                let lookup = transforms::lookup_hash(value, salt);
                                Ok((
                                    PseudoAlgorithm::ReversibleEncryption,
                                    ciphertext,
                                    lookup,
                                    version,
                                ))
                            }
                        }
                    }
                    PseudoAlgorithm::Tokenization => {
                        let token = transforms::random_token()?;
                        let lookup = transforms::lookup_hash(value, salt);
                        Ok((algorithm, token, lookup, version))
                    }
                }
            })
            .await?
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_pseudo_event(
        &self,
        direction: &str,
        algorithm: PseudoAlgorithm,
        data_type: &str,
        purpose: &str,
        legal_basis: &str,
        key_version: Option<u32>,
        error: Option<&Error>,
    ) {
        let mut event = AuditEvent::new(
            "system",
            direction,
            AuditDetail::Pseudonymization {
                direction: direction.to_string(),
                algorithm: algorithm.to_string(),
                data_type: data_type.to_string(),
                purpose: purpose.to_string(),
                legal_basis: legal_basis.to_string(),
                key_version,
            },
        );
        if let Some(e) = error {
            event = event.failed(e.to_string());
        }
        emit(self.sink.as_ref(), &event);
    }
}
