//! DataGuard - GDPR data-protection compliance core
//!
//! DataGuard implements the privacy-by-design core of a data-protection
//! platform: personal data is never stored, accessed, or purged except
//! through an auditable, policy-checked path.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Surrounding system (API/CLI)                 │
//! └───────┬──────────────────┬──────────────────────┬───────────────┘
//!         │                  │                      │
//! ┌───────▼────────┐ ┌───────▼─────────┐ ┌──────────▼─────────────┐
//! │    Access      │ │ Pseudonymization│ │  Retention Scheduler   │
//! │   Controller   │ │     Engine      │ │  - policy validation   │
//! │  - sessions    │ │  - 4 algorithm  │ │  - purge jobs          │
//! │  - RBAC        │ │    families     │ │  - legal-hold veto     │
//! │  - escalation  │ │  - reversibility│ └──────────┬─────────────┘
//! │    risk        │ │    contracts    │            │
//! └───────┬────────┘ └───────┬─────────┘            │
//!         │          ┌───────▼─────────┐            │
//!         │          │   Key Manager   │            │
//!         │          │  - lifecycle    │            │
//!         │          │  - rotation     │            │
//!         │          │  - crypto-shred │            │
//!         │          └───────┬─────────┘            │
//!         │                  │                      │
//! ┌───────▼──────────────────▼──────────────────────▼───────────────┐
//! │            Audit sink (externally supplied, synchronous)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key lifecycle and crypto-shredding
//!
//! Encryption keys age through `Active → Rotating → Archived → Revoked`.
//! Archived keys still decrypt data they protected; once a key is revoked
//! its material is zeroed and every record it protected becomes permanently
//! unreadable. Erasure of the key is erasure of the data (GDPR Article 17
//! by crypto-shredding).
//!
//! ## Modules
//!
//! - [`keys`]: Encryption key lifecycle, rotation and secure destruction
//! - [`pseudonym`]: Pseudonymization engine with reversibility contracts
//! - [`rbac`]: Access control, sessions and escalation risk scoring
//! - [`retention`]: Retention policies, purge jobs and legal holds
//! - [`audit`]: Audit sink contract and structured event types
//! - [`config`]: Configuration management

pub mod audit;
pub mod config;
pub mod error;
pub mod keys;
pub mod pseudonym;
pub mod rbac;
pub mod retention;

pub use config::DataGuardConfig;
pub use error::{Error, Result};
