//! Audit trail queries. Admin only; the trail itself is written exclusively
//! by the commit path in `session`.

use ops_core::entities::AuditEntry;
use ops_core::identity::ActorContext;

use crate::error::{DatabaseError, ServiceError};
use crate::helpers::{get_opt_string, parse_datetime, parse_enum};
use crate::service::{OpsService, require_admin};

const SELECT_COLS: &str = "id, entity_id, entity_type, property_name, old_value, new_value, \
                           changed_by_user_id, change_timestamp, change_type";

pub(crate) fn row_to_entry(row: &libsql::Row) -> Result<AuditEntry, DatabaseError> {
    Ok(AuditEntry {
        id: row.get::<String>(0)?,
        entity_id: row.get::<String>(1)?,
        entity_type: parse_enum(&row.get::<String>(2)?)?,
        property_name: row.get::<String>(3)?,
        old_value: get_opt_string(row, 4)?,
        new_value: get_opt_string(row, 5)?,
        // The sentinel is an empty string, so this column reads as a plain
        // String rather than through get_opt_string.
        changed_by_user_id: row.get::<String>(6)?,
        change_timestamp: parse_datetime(&row.get::<String>(7)?)?,
        change_type: parse_enum(&row.get::<String>(8)?)?,
    })
}

impl OpsService {
    /// Change history of one entity, newest first, at most `count` entries.
    /// Admin only.
    ///
    /// An unknown entity ID yields an empty history, not an error; the trail
    /// outlives the entities it describes.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for non-admin actors; `Validation` for a
    /// non-positive count.
    pub async fn entity_audit_history(
        &self,
        actor: &ActorContext,
        entity_id: &str,
        count: Option<i64>,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        require_admin(actor)?;
        let count = self.resolve_count(count)?;
        self.query_entries(
            &format!(
                "SELECT {SELECT_COLS} FROM audit_entries
                 WHERE entity_id = ?1 ORDER BY change_timestamp DESC, rowid DESC LIMIT ?2"
            ),
            libsql::params![entity_id, count],
        )
        .await
    }

    /// Changes a given user made, newest first, at most `count` entries.
    /// Admin only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for non-admin actors; `Validation` for a
    /// non-positive count.
    pub async fn actor_audit_history(
        &self,
        actor: &ActorContext,
        user_id: &str,
        count: Option<i64>,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        require_admin(actor)?;
        let count = self.resolve_count(count)?;
        self.query_entries(
            &format!(
                "SELECT {SELECT_COLS} FROM audit_entries
                 WHERE changed_by_user_id = ?1 ORDER BY change_timestamp DESC, rowid DESC LIMIT ?2"
            ),
            libsql::params![user_id, count],
        )
        .await
    }

    /// The most recent changes across the whole system, newest first.
    /// Admin only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for non-admin actors; `Validation` for a
    /// non-positive count.
    pub async fn latest_audit_entries(
        &self,
        actor: &ActorContext,
        count: Option<i64>,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        require_admin(actor)?;
        let count = self.resolve_count(count)?;
        self.query_entries(
            &format!(
                "SELECT {SELECT_COLS} FROM audit_entries
                 ORDER BY change_timestamp DESC, rowid DESC LIMIT ?1"
            ),
            libsql::params![count],
        )
        .await
    }

    /// `None` falls back to the configured feed limit; a non-positive count
    /// is a caller error, not an empty result.
    fn resolve_count(&self, count: Option<i64>) -> Result<i64, ServiceError> {
        let count = count.unwrap_or_else(|| self.default_feed_limit());
        if count <= 0 {
            return Err(ServiceError::Validation(
                "count must be positive".to_string(),
            ));
        }
        Ok(count)
    }

    async fn query_entries(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        let mut rows = self.db().conn().query(sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await.map_err(DatabaseError::from)? {
            entries.push(row_to_entry(&row)?);
        }
        Ok(entries)
    }
}
