//! Audit capture: pending changes in, audit records out.
//!
//! A pure transformation with no knowledge of why a change occurred. The
//! commit path in `ops-db` stages the produced records into the same
//! transaction as the business rows, so either both persist or neither does.
//!
//! Per commit there is exactly one timestamp and one actor; actor resolution
//! degrades to the sentinel rather than failing.

use chrono::{DateTime, Utc};

use crate::change::{PendingChange, PendingKind};
use crate::enums::{ChangeType, EntityType};
use crate::identity::ActorContext;

/// Property name used for whole-entity create/delete summary rows.
pub const ENTITY_SUMMARY_PROPERTY: &str = "Entity";

/// An audit row awaiting insertion; the ID is assigned at insert time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub property_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by_user_id: String,
    pub change_timestamp: DateTime<Utc>,
    pub change_type: ChangeType,
}

/// Derive the audit trail for one commit.
///
/// - `Added`: one summary row (`"Entity"`, new value `"Created"`) plus one row
///   per audited field with a NULL old value.
/// - `Modified`: one row per field that actually changed; a no-op
///   modification produces nothing.
/// - `Deleted`: exactly one summary row; fields are not enumerated.
/// - Kinds that are not audited are skipped entirely.
#[must_use]
pub fn capture_audit_records(
    pending: &[PendingChange],
    actor: &ActorContext,
    at: DateTime<Utc>,
) -> Vec<AuditRecord> {
    let changed_by = actor.audit_user_id();
    let mut records = Vec::new();

    for change in pending {
        if !change.entity_type.is_audited() {
            continue;
        }
        let record = |property_name: String,
                      old_value: Option<String>,
                      new_value: Option<String>,
                      change_type: ChangeType| AuditRecord {
            entity_id: change.entity_id.clone(),
            entity_type: change.entity_type,
            property_name,
            old_value,
            new_value,
            changed_by_user_id: changed_by.clone(),
            change_timestamp: at,
            change_type,
        };

        match &change.kind {
            PendingKind::Added { fields } => {
                records.push(record(
                    ENTITY_SUMMARY_PROPERTY.to_string(),
                    None,
                    Some("Created".to_string()),
                    ChangeType::Created,
                ));
                for field in fields {
                    records.push(record(
                        field.name.to_string(),
                        None,
                        field.value.clone(),
                        ChangeType::Created,
                    ));
                }
            }
            PendingKind::Modified { changes } => {
                for field in changes {
                    records.push(record(
                        field.name.to_string(),
                        field.old_value.clone(),
                        field.new_value.clone(),
                        ChangeType::Updated,
                    ));
                }
            }
            PendingKind::Deleted => {
                records.push(record(
                    ENTITY_SUMMARY_PROPERTY.to_string(),
                    Some(format!("{} (ID: {})", change.entity_type, change.entity_id)),
                    None,
                    ChangeType::Deleted,
                ));
            }
        }
    }

    records
}
