//! Commit path for staged change sets.
//!
//! Takes a [`ChangeSet`], derives its audit records, and applies business
//! rows and audit rows inside one libSQL transaction. Either everything
//! persists or nothing does; a failed statement rolls the whole commit back,
//! including every audit row derived for it.

use chrono::{DateTime, Utc};
use libsql::Transaction;
use tracing::debug;

use ops_core::capture::{AuditRecord, capture_audit_records};
use ops_core::change::{ChangeSet, StagedChange, StagedOp, TrackedEntity};
use ops_core::identity::ActorContext;

use crate::error::{DatabaseError, ServiceError};
use crate::service::OpsService;

impl OpsService {
    /// Commit a staged change set as one transaction.
    ///
    /// Derives audit records from the pending changes (one timestamp, one
    /// actor for the whole commit), then applies every staged row and every
    /// audit row. Returns the commit timestamp.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if a guarded UPDATE or DELETE matched no row
    ///   (the snapshot went stale under a concurrent writer).
    /// - `Validation` if a uniqueness constraint fired inside the commit.
    /// - `Internal` for any other persistence failure.
    pub(crate) async fn commit_changes(
        &self,
        changes: ChangeSet,
        actor: &ActorContext,
    ) -> Result<DateTime<Utc>, ServiceError> {
        let now = Utc::now();
        if changes.is_empty() {
            return Ok(now);
        }

        let records = capture_audit_records(&changes.pending_changes(), actor, now);
        let staged = changes.into_staged();
        debug!(
            staged = staged.len(),
            audit_rows = records.len(),
            actor = %actor.audit_user_id(),
            "committing change set"
        );

        let tx = self.db().conn().transaction().await?;
        let applied = apply_commit(&tx, &staged, &records).await;
        match applied {
            Ok(()) => {
                tx.commit().await?;
                Ok(now)
            }
            Err(err) => {
                // Drop would roll back too; do it explicitly so a rollback
                // failure is at least not silent.
                if let Err(rb) = tx.rollback().await {
                    debug!(error = %rb, "rollback after failed commit also failed");
                }
                Err(err)
            }
        }
    }
}

async fn apply_commit(
    tx: &Transaction,
    staged: &[StagedChange],
    records: &[AuditRecord],
) -> Result<(), ServiceError> {
    for change in staged {
        apply_staged(tx, change).await?;
    }
    for record in records {
        insert_audit_record(tx, record).await?;
    }
    Ok(())
}

/// Apply one staged entity operation. Guarded UPDATEs and all DELETEs must
/// touch exactly one row; zero rows means the snapshot is stale.
async fn apply_staged(tx: &Transaction, change: &StagedChange) -> Result<(), ServiceError> {
    let affected = match (&change.entity, &change.op) {
        (TrackedEntity::Task(task), StagedOp::Added) => {
            exec(
                tx,
                "INSERT INTO tasks (id, title, description, due_date, status, project_id, user_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                libsql::params![
                    task.id.clone(),
                    task.title.clone(),
                    task.description.clone(),
                    task.due_date.to_rfc3339(),
                    task.status.as_str(),
                    task.project_id.clone(),
                    task.user_id.clone(),
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .await?
        }
        (TrackedEntity::Task(task), StagedOp::Modified { before }) => {
            let TrackedEntity::Task(before) = before.as_ref() else {
                return Err(mismatch("task", before));
            };
            exec(
                tx,
                "UPDATE tasks
                 SET title = ?1, description = ?2, due_date = ?3, status = ?4,
                     project_id = ?5, user_id = ?6, updated_at = ?7
                 WHERE id = ?8 AND updated_at = ?9",
                libsql::params![
                    task.title.clone(),
                    task.description.clone(),
                    task.due_date.to_rfc3339(),
                    task.status.as_str(),
                    task.project_id.clone(),
                    task.user_id.clone(),
                    task.updated_at.to_rfc3339(),
                    task.id.clone(),
                    before.updated_at.to_rfc3339(),
                ],
            )
            .await?
        }
        (TrackedEntity::Task(task), StagedOp::Deleted) => {
            exec(
                tx,
                "DELETE FROM tasks WHERE id = ?1",
                libsql::params![task.id.clone()],
            )
            .await?
        }
        (TrackedEntity::Project(project), StagedOp::Added) => {
            exec(
                tx,
                "INSERT INTO projects (id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                libsql::params![
                    project.id.clone(),
                    project.name.clone(),
                    project.description.clone(),
                    project.created_at.to_rfc3339(),
                    project.updated_at.to_rfc3339(),
                ],
            )
            .await?
        }
        (TrackedEntity::Project(project), StagedOp::Modified { before }) => {
            let TrackedEntity::Project(before) = before.as_ref() else {
                return Err(mismatch("project", before));
            };
            exec(
                tx,
                "UPDATE projects
                 SET name = ?1, description = ?2, updated_at = ?3
                 WHERE id = ?4 AND updated_at = ?5",
                libsql::params![
                    project.name.clone(),
                    project.description.clone(),
                    project.updated_at.to_rfc3339(),
                    project.id.clone(),
                    before.updated_at.to_rfc3339(),
                ],
            )
            .await?
        }
        (TrackedEntity::Project(project), StagedOp::Deleted) => {
            exec(
                tx,
                "DELETE FROM projects WHERE id = ?1",
                libsql::params![project.id.clone()],
            )
            .await?
        }
        (TrackedEntity::User(user), StagedOp::Added) => {
            exec(
                tx,
                "INSERT INTO users (id, email, password_hash, name, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                libsql::params![
                    user.id.clone(),
                    user.email.clone(),
                    user.password_hash.clone(),
                    user.name.clone(),
                    user.status.as_str(),
                ],
            )
            .await?
        }
        (TrackedEntity::User(user), StagedOp::Modified { .. }) => {
            exec(
                tx,
                "UPDATE users SET email = ?1, password_hash = ?2, name = ?3, status = ?4
                 WHERE id = ?5",
                libsql::params![
                    user.email.clone(),
                    user.password_hash.clone(),
                    user.name.clone(),
                    user.status.as_str(),
                    user.id.clone(),
                ],
            )
            .await?
        }
        (TrackedEntity::User(user), StagedOp::Deleted) => {
            exec(
                tx,
                "DELETE FROM users WHERE id = ?1",
                libsql::params![user.id.clone()],
            )
            .await?
        }
        (TrackedEntity::UserRole(ur), StagedOp::Added) => {
            exec(
                tx,
                "INSERT INTO user_roles (id, user_id, role_id, assigned_at)
                 VALUES (?1, ?2, ?3, ?4)",
                libsql::params![
                    ur.id.clone(),
                    ur.user_id.clone(),
                    ur.role_id.clone(),
                    ur.assigned_at.to_rfc3339(),
                ],
            )
            .await?
        }
        (TrackedEntity::UserRole(_), StagedOp::Modified { .. }) => {
            return Err(ServiceError::Internal(DatabaseError::InvalidState(
                "role assignments are immutable; stage a delete and an add".to_string(),
            )));
        }
        (TrackedEntity::UserRole(ur), StagedOp::Deleted) => {
            exec(
                tx,
                "DELETE FROM user_roles WHERE id = ?1",
                libsql::params![ur.id.clone()],
            )
            .await?
        }
    };

    if affected == 0 {
        return Err(ServiceError::ConcurrencyConflict);
    }
    Ok(())
}

async fn insert_audit_record(tx: &Transaction, record: &AuditRecord) -> Result<(), ServiceError> {
    exec(
        tx,
        "INSERT INTO audit_entries
             (id, entity_id, entity_type, property_name, old_value, new_value,
              changed_by_user_id, change_timestamp, change_type)
         VALUES ('aud-' || lower(hex(randomblob(4))), ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        libsql::params![
            record.entity_id.clone(),
            record.entity_type.as_str(),
            record.property_name.clone(),
            record.old_value.clone(),
            record.new_value.clone(),
            record.changed_by_user_id.clone(),
            record.change_timestamp.to_rfc3339(),
            record.change_type.as_str(),
        ],
    )
    .await?;
    Ok(())
}

/// Execute one statement, translating constraint violations into typed
/// outcomes. libSQL surfaces SQLite constraint failures only through the
/// error message, so this matches on it the same way the retry logic in
/// sqlite itself recommends.
async fn exec(
    tx: &Transaction,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<u64, ServiceError> {
    match tx.execute(sql, params).await {
        Ok(affected) => Ok(affected),
        Err(err) => {
            let msg = err.to_string();
            if msg.contains("UNIQUE constraint failed") {
                Err(ServiceError::Validation(format!(
                    "uniqueness violated: {msg}"
                )))
            } else {
                Err(ServiceError::Internal(DatabaseError::LibSql(err)))
            }
        }
    }
}

fn mismatch(expected: &str, found: &TrackedEntity) -> ServiceError {
    ServiceError::Internal(DatabaseError::InvalidState(format!(
        "before snapshot is not a {expected}: {:?}",
        found.entity_type()
    )))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use ops_core::change::{ChangeSet, TrackedEntity};
    use ops_core::entities::Task;
    use ops_core::enums::{ActorRole, TaskStatus};
    use ops_core::identity::ActorContext;
    use pretty_assertions::assert_eq;

    use crate::error::ServiceError;
    use crate::test_support::{audit_row_count, test_service};

    fn admin() -> ActorContext {
        ActorContext::authenticated("usr-admin", ActorRole::Admin)
    }

    fn task_row(id: &str, project_id: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.into(),
            title: "Write report".into(),
            description: None,
            due_date: now,
            status: TaskStatus::NotStarted,
            project_id: project_id.into(),
            user_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn empty_change_set_commits_as_noop() {
        let service = test_service().await;
        service
            .commit_changes(ChangeSet::new(), &admin())
            .await
            .unwrap();
        assert_eq!(audit_row_count(&service).await, 0);
    }

    #[tokio::test]
    async fn failed_business_row_rolls_back_audit_rows() {
        let service = test_service().await;

        // Task referencing a project that does not exist: the INSERT fails
        // on the foreign key, so the derived audit rows must not survive.
        let mut changes = ChangeSet::new();
        changes.stage_added(TrackedEntity::Task(task_row("tsk-1", "prj-missing")));

        let result = service.commit_changes(changes, &admin()).await;
        assert!(result.is_err());
        assert_eq!(audit_row_count(&service).await, 0);
    }

    #[tokio::test]
    async fn stale_snapshot_update_is_a_concurrency_conflict() {
        let service = test_service().await;
        service
            .db()
            .conn()
            .execute(
                "INSERT INTO projects (id, name, created_at, updated_at)
                 VALUES ('prj-1', 'Apollo', '2026-01-01T00:00:00+00:00', '2026-01-01T00:00:00+00:00')",
                (),
            )
            .await
            .unwrap();

        let before = task_row("tsk-1", "prj-1");
        let mut changes = ChangeSet::new();
        changes.stage_added(TrackedEntity::Task(before.clone()));
        service.commit_changes(changes, &admin()).await.unwrap();

        // Someone else bumps updated_at behind our snapshot's back.
        service
            .db()
            .conn()
            .execute(
                "UPDATE tasks SET updated_at = '2030-01-01T00:00:00+00:00' WHERE id = 'tsk-1'",
                (),
            )
            .await
            .unwrap();

        let mut after = before.clone();
        after.status = TaskStatus::InProgress;
        after.updated_at = Utc::now();
        let mut changes = ChangeSet::new();
        changes
            .stage_modified(TrackedEntity::Task(before), TrackedEntity::Task(after))
            .unwrap();

        let result = service.commit_changes(changes, &admin()).await;
        assert!(matches!(result, Err(ServiceError::ConcurrencyConflict)));
    }

    #[tokio::test]
    async fn unique_violation_surfaces_as_validation() {
        let service = test_service().await;

        let mut changes = ChangeSet::new();
        changes.stage_added(TrackedEntity::User(ops_core::entities::User {
            id: "usr-1".into(),
            email: "a@b.c".into(),
            password_hash: "h".into(),
            name: None,
            status: ops_core::enums::UserStatus::Active,
        }));
        service.commit_changes(changes, &admin()).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.stage_added(TrackedEntity::User(ops_core::entities::User {
            id: "usr-2".into(),
            email: "a@b.c".into(),
            password_hash: "h".into(),
            name: None,
            status: ops_core::enums::UserStatus::Active,
        }));
        let result = service.commit_changes(changes, &admin()).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }
}
