//! Change-set staging and field-level diffing.
//!
//! This is the pure half of the persistence session: entities are staged as
//! added, modified (with a before snapshot), or deleted, and
//! [`ChangeSet::pending_changes`] derives what actually differs. The commit
//! half (SQL execution inside one transaction) lives in `ops-db`.
//!
//! Tracked entities form a closed tagged union; everything downstream pattern
//! matches on [`EntityType`] rather than inspecting runtime types.

use crate::entities::{Project, Task, User, UserRole};
use crate::enums::EntityType;
use crate::errors::CoreError;

/// Any entity a change session can stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedEntity {
    Task(Task),
    Project(Project),
    User(User),
    UserRole(UserRole),
}

impl TrackedEntity {
    #[must_use]
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Task(t) => &t.id,
            Self::Project(p) => &p.id,
            Self::User(u) => &u.id,
            Self::UserRole(ur) => &ur.id,
        }
    }

    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::Task(_) => EntityType::Task,
            Self::Project(_) => EntityType::Project,
            Self::User(_) => EntityType::User,
            Self::UserRole(_) => EntityType::UserRole,
        }
    }

    /// The audited fields of this entity, in a fixed order, as textual
    /// snapshots. Internal bookkeeping (`id`, timestamps, `password_hash`)
    /// is excluded. Non-audited kinds expose no fields.
    #[must_use]
    pub fn audit_fields(&self) -> Vec<FieldValue> {
        match self {
            Self::Task(t) => vec![
                FieldValue::new("title", Some(t.title.clone())),
                FieldValue::new("description", t.description.clone()),
                FieldValue::new("due_date", Some(t.due_date.to_rfc3339())),
                FieldValue::new("status", Some(t.status.as_str().to_string())),
                FieldValue::new("project_id", Some(t.project_id.clone())),
                FieldValue::new("user_id", t.user_id.clone()),
            ],
            Self::Project(p) => vec![
                FieldValue::new("name", Some(p.name.clone())),
                FieldValue::new("description", p.description.clone()),
            ],
            Self::User(u) => vec![
                FieldValue::new("email", Some(u.email.clone())),
                FieldValue::new("name", u.name.clone()),
                FieldValue::new("status", Some(u.status.as_str().to_string())),
            ],
            Self::UserRole(_) => Vec::new(),
        }
    }
}

/// One named field and its textual snapshot (`None` = NULL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub name: &'static str,
    pub value: Option<String>,
}

impl FieldValue {
    #[must_use]
    pub const fn new(name: &'static str, value: Option<String>) -> Self {
        Self { name, value }
    }
}

/// A field whose value differs between the before and after snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub name: &'static str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// How an entity was staged.
#[derive(Debug, Clone)]
pub enum StagedOp {
    Added,
    Modified { before: Box<TrackedEntity> },
    Deleted,
}

/// One staged entity and its operation. For `Modified`, `entity` is the
/// requested after-state and `op` carries the before snapshot.
#[derive(Debug, Clone)]
pub struct StagedChange {
    pub entity: TrackedEntity,
    pub op: StagedOp,
}

/// The staging surface of one unit of work.
///
/// Owns its entities until the session commits or is dropped. Staging order
/// is preserved through commit.
#[derive(Debug, Default)]
pub struct ChangeSet {
    staged: Vec<StagedChange>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn stage_added(&mut self, entity: TrackedEntity) {
        self.staged.push(StagedChange {
            entity,
            op: StagedOp::Added,
        });
    }

    /// Stage a modification. `before` and `after` must be snapshots of the
    /// same entity.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EntityMismatch` if the snapshots disagree on kind
    /// or identity.
    pub fn stage_modified(
        &mut self,
        before: TrackedEntity,
        after: TrackedEntity,
    ) -> Result<(), CoreError> {
        if before.entity_type() != after.entity_type() || before.entity_id() != after.entity_id() {
            return Err(CoreError::EntityMismatch {
                expected: format!("{} {}", before.entity_type(), before.entity_id()),
                found: format!("{} {}", after.entity_type(), after.entity_id()),
            });
        }
        self.staged.push(StagedChange {
            entity: after,
            op: StagedOp::Modified {
                before: Box::new(before),
            },
        });
        Ok(())
    }

    pub fn stage_deleted(&mut self, entity: TrackedEntity) {
        self.staged.push(StagedChange {
            entity,
            op: StagedOp::Deleted,
        });
    }

    #[must_use]
    pub fn staged(&self) -> &[StagedChange] {
        &self.staged
    }

    #[must_use]
    pub fn into_staged(self) -> Vec<StagedChange> {
        self.staged
    }

    /// Derive what each staged entity actually changes.
    ///
    /// For `Modified` entries only fields whose values differ are reported;
    /// a modification where nothing differs yields an empty change list.
    #[must_use]
    pub fn pending_changes(&self) -> Vec<PendingChange> {
        self.staged
            .iter()
            .map(|staged| {
                let kind = match &staged.op {
                    StagedOp::Added => PendingKind::Added {
                        fields: staged.entity.audit_fields(),
                    },
                    StagedOp::Modified { before } => PendingKind::Modified {
                        changes: diff_fields(before, &staged.entity),
                    },
                    StagedOp::Deleted => PendingKind::Deleted,
                };
                PendingChange {
                    entity_id: staged.entity.entity_id().to_string(),
                    entity_type: staged.entity.entity_type(),
                    kind,
                }
            })
            .collect()
    }
}

/// One staged entity's derived change, ready for audit capture.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub kind: PendingKind,
}

#[derive(Debug, Clone)]
pub enum PendingKind {
    Added { fields: Vec<FieldValue> },
    Modified { changes: Vec<FieldChange> },
    Deleted,
}

/// Field-level diff of two snapshots of the same entity. Both expose the same
/// field list in the same order, enforced by `stage_modified`.
fn diff_fields(before: &TrackedEntity, after: &TrackedEntity) -> Vec<FieldChange> {
    before
        .audit_fields()
        .into_iter()
        .zip(after.audit_fields())
        .filter(|(old, new)| old.value != new.value)
        .map(|(old, new)| FieldChange {
            name: new.name,
            old_value: old.value,
            new_value: new.value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::TaskStatus;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            id: "tsk-1".into(),
            title: "Write report".into(),
            description: Some("Quarterly".into()),
            due_date: now,
            status: TaskStatus::InProgress,
            project_id: "prj-1".into(),
            user_id: Some("usr-1".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn modified_reports_only_differing_fields() {
        let before = sample_task();
        let mut after = before.clone();
        after.status = TaskStatus::Completed;
        after.user_id = Some("usr-2".into());
        after.updated_at = Utc::now(); // bookkeeping, not audited

        let mut set = ChangeSet::new();
        set.stage_modified(
            TrackedEntity::Task(before),
            TrackedEntity::Task(after),
        )
        .unwrap();

        let pending = set.pending_changes();
        assert_eq!(pending.len(), 1);
        let PendingKind::Modified { changes } = &pending[0].kind else {
            panic!("expected modified");
        };
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].name, "status");
        assert_eq!(changes[0].old_value.as_deref(), Some("in_progress"));
        assert_eq!(changes[0].new_value.as_deref(), Some("completed"));
        assert_eq!(changes[1].name, "user_id");
        assert_eq!(changes[1].old_value.as_deref(), Some("usr-1"));
        assert_eq!(changes[1].new_value.as_deref(), Some("usr-2"));
    }

    #[test]
    fn identical_snapshots_diff_to_nothing() {
        let task = sample_task();
        let mut set = ChangeSet::new();
        set.stage_modified(
            TrackedEntity::Task(task.clone()),
            TrackedEntity::Task(task),
        )
        .unwrap();

        let pending = set.pending_changes();
        let PendingKind::Modified { changes } = &pending[0].kind else {
            panic!("expected modified");
        };
        assert!(changes.is_empty());
    }

    #[test]
    fn null_to_value_is_a_change() {
        let before = sample_task();
        let mut after = before.clone();
        after.description = None;

        let mut set = ChangeSet::new();
        set.stage_modified(
            TrackedEntity::Task(before),
            TrackedEntity::Task(after),
        )
        .unwrap();

        let pending = set.pending_changes();
        let PendingKind::Modified { changes } = &pending[0].kind else {
            panic!("expected modified");
        };
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "description");
        assert_eq!(changes[0].old_value.as_deref(), Some("Quarterly"));
        assert_eq!(changes[0].new_value, None);
    }

    #[test]
    fn mismatched_snapshots_are_rejected() {
        let a = sample_task();
        let mut b = a.clone();
        b.id = "tsk-2".into();

        let mut set = ChangeSet::new();
        let result = set.stage_modified(TrackedEntity::Task(a), TrackedEntity::Task(b));
        assert!(matches!(result, Err(CoreError::EntityMismatch { .. })));
        assert!(set.is_empty());
    }

    #[test]
    fn user_role_exposes_no_audit_fields() {
        let ur = UserRole {
            id: "url-1".into(),
            user_id: "usr-1".into(),
            role_id: "rol-1".into(),
            assigned_at: Utc::now(),
        };
        assert!(TrackedEntity::UserRole(ur).audit_fields().is_empty());
    }

    #[test]
    fn password_hash_is_not_an_audited_field() {
        let user = User {
            id: "usr-1".into(),
            email: "a@b.c".into(),
            password_hash: "$2b$secret".into(),
            name: None,
            status: crate::enums::UserStatus::Active,
        };
        let fields = TrackedEntity::User(user).audit_fields();
        assert!(fields.iter().all(|f| f.name != "password_hash"));
        assert!(
            fields
                .iter()
                .all(|f| f.value.as_deref() != Some("$2b$secret"))
        );
    }
}
