use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{ChangeType, EntityType};

/// An append-only audit trail entry recording one field-level change.
///
/// Never mutated or deleted after creation. Created exclusively by the change
/// session's commit path, never through any other write.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: String,
    pub entity_id: String,
    pub entity_type: EntityType,
    /// Changed field name, or `"Entity"` for whole-entity create/delete rows.
    pub property_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    /// Acting user, or the empty-string sentinel when unauthenticated.
    pub changed_by_user_id: String,
    /// Commit time; every entry from one commit shares the same timestamp.
    pub change_timestamp: DateTime<Utc>,
    pub change_type: ChangeType,
}
