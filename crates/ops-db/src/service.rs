//! Service layer orchestrating audited database mutations.
//!
//! `OpsService` wraps `OpsDb` (raw database access). All repo methods are
//! implemented as `impl OpsService`.

use ops_config::{AuditConfig, OpsConfig};
use ops_core::identity::ActorContext;

use crate::OpsDb;
use crate::error::{DatabaseError, ServiceError};

/// Orchestrates database mutations with audit capture.
///
/// Every mutation method follows this protocol:
/// 1. Load current state
/// 2. Authorize (pure policy, explicit actor context)
/// 3. Validate foreign references that are actually changing
/// 4. Stage entities on a change set
/// 5. Commit: one transaction carrying business rows and their audit rows
pub struct OpsService {
    db: OpsDb,
    audit: AuditConfig,
}

impl OpsService {
    /// Create a new service wrapping a local database, with default audit
    /// settings.
    ///
    /// # Arguments
    ///
    /// * `db_path` — Path to the libSQL database file, or `":memory:"` for tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new_local(db_path: &str) -> Result<Self, DatabaseError> {
        let db = OpsDb::open_local(db_path).await?;
        Ok(Self {
            db,
            audit: AuditConfig::default(),
        })
    }

    /// Create a service from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the configured database cannot be opened.
    pub async fn from_config(config: &OpsConfig) -> Result<Self, DatabaseError> {
        let db = OpsDb::open_local(&config.database.path).await?;
        Ok(Self {
            db,
            audit: config.audit.clone(),
        })
    }

    /// Create from an existing `OpsDb` (for testing).
    #[must_use]
    pub fn from_db(db: OpsDb) -> Self {
        Self {
            db,
            audit: AuditConfig::default(),
        }
    }

    /// Configured fallback for audit feed queries that pass no limit.
    #[must_use]
    pub fn default_feed_limit(&self) -> i64 {
        i64::from(self.audit.default_feed_limit)
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &OpsDb {
        &self.db
    }
}

/// Gate an admin-only surface. Non-admin actors get the same signal as a
/// missing target.
pub(crate) fn require_admin(actor: &ActorContext) -> Result<(), ServiceError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::NotFoundOrUnauthorized)
    }
}

/// Gate any authenticated surface; returns the acting user's ID.
pub(crate) fn require_authenticated(actor: &ActorContext) -> Result<&str, ServiceError> {
    actor
        .user_id
        .as_deref()
        .ok_or(ServiceError::NotFoundOrUnauthorized)
}
