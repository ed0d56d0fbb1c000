//! # ops-db
//!
//! libSQL persistence and audited mutation services for Opsboard.
//!
//! Handles all relational state: users, roles, projects, tasks, and the
//! append-only audit trail. Every mutation flows through a staged change set
//! whose commit derives audit rows inside the same transaction (see
//! [`service::OpsService`] and the `session` module).
//!
//! Uses the `libsql` crate (C `SQLite` fork, v0.9.29) — provides foreign key
//! enforcement, transactions, and a stable API.

pub mod error;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod service;
mod session;

#[cfg(test)]
mod test_support;

use error::DatabaseError;
use libsql::Builder;

/// Central database handle for all Opsboard state operations.
///
/// Wraps a libSQL database and connection. Provides ID generation; all
/// higher-level operations live on [`service::OpsService`].
pub struct OpsDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl OpsDb {
    /// Open a local-only database at the given path.
    ///
    /// Runs migrations automatically on first open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Enable foreign keys (must be per-connection in SQLite); the task
        // cascade and set-null behaviors depend on it.
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("PRAGMA foreign_keys: {e}")))?;

        let ops_db = Self { db, conn };
        ops_db.run_migrations().await?;
        Ok(ops_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }

    /// Generate a prefixed ID via libSQL. Returns e.g., `"tsk-a3f8b2c1"`.
    ///
    /// Uses `randomblob(4)` in SQL to produce 8-char hex, then prepends the prefix.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or returns no rows.
    pub async fn generate_id(&self, prefix: &str) -> Result<String, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT '{prefix}-' || lower(hex(randomblob(4)))"),
                (),
            )
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        Ok(row.get::<String>(0)?)
    }
}
