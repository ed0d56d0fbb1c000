//! Task operations: load, authorize, validate references, stage, commit.
//!
//! Authorization is decided by the pure policy in ops-core; this module only
//! loads state, feeds the policy, and collapses `Deny`/`NotFound` into one
//! external outcome so callers cannot probe which task IDs exist. The real
//! reason is logged before it is collapsed.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ops_core::change::{ChangeSet, TrackedEntity};
use ops_core::entities::Task;
use ops_core::enums::TaskStatus;
use ops_core::identity::ActorContext;
use ops_core::ids::PREFIX_TASK;
use ops_core::policy::{PolicyDecision, TaskAction, evaluate_task_create, evaluate_task_mutation};
use ops_core::updates::TaskUpdate;

use crate::error::{DatabaseError, ServiceError};
use crate::helpers::{get_opt_string, parse_datetime, parse_enum};
use crate::service::{OpsService, require_admin, require_authenticated};

const SELECT_COLS: &str =
    "id, title, description, due_date, status, project_id, user_id, created_at, updated_at";

pub(crate) fn row_to_task(row: &libsql::Row) -> Result<Task, DatabaseError> {
    Ok(Task {
        id: row.get::<String>(0)?,
        title: row.get::<String>(1)?,
        description: get_opt_string(row, 2)?,
        due_date: parse_datetime(&row.get::<String>(3)?)?,
        status: parse_enum(&row.get::<String>(4)?)?,
        project_id: row.get::<String>(5)?,
        user_id: get_opt_string(row, 6)?,
        created_at: parse_datetime(&row.get::<String>(7)?)?,
        updated_at: parse_datetime(&row.get::<String>(8)?)?,
    })
}

/// Input for creating a task. The task is assigned to its creator.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: DateTime<Utc>,
    pub project_id: String,
    /// `None` means the task starts as [`TaskStatus::NotStarted`].
    pub status: Option<TaskStatus>,
}

/// Optional filters for task listings. Empty matches everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub project_id: Option<String>,
}

impl OpsService {
    /// Create a task, self-assigned to the acting user.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for anonymous actors; `Validation` for an
    /// empty title; `ReferenceNotFound("project")` when the target project
    /// does not exist.
    pub async fn create_task(
        &self,
        actor: &ActorContext,
        new: NewTask,
    ) -> Result<Task, ServiceError> {
        if let PolicyDecision::Deny(reason) = evaluate_task_create(actor) {
            warn!(reason = %reason, "task create refused");
            return Err(ServiceError::NotFoundOrUnauthorized);
        }
        if new.title.trim().is_empty() {
            return Err(ServiceError::Validation(
                "task title must not be empty".to_string(),
            ));
        }
        if !self.project_exists(&new.project_id).await? {
            return Err(ServiceError::ReferenceNotFound("project"));
        }

        let now = Utc::now();
        let task = Task {
            id: self.db().generate_id(PREFIX_TASK).await?,
            title: new.title,
            description: new.description,
            due_date: new.due_date,
            status: new.status.unwrap_or(TaskStatus::NotStarted),
            project_id: new.project_id,
            user_id: actor.user_id.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut changes = ChangeSet::new();
        changes.stage_added(TrackedEntity::Task(task.clone()));
        self.commit_changes(changes, actor).await?;

        info!(task_id = %task.id, project_id = %task.project_id, "task created");
        Ok(task)
    }

    /// Fetch a task. Admin or current assignee only; everyone else sees the
    /// same outcome as a missing task.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when absent or not visible to the actor.
    pub async fn get_task(&self, actor: &ActorContext, task_id: &str) -> Result<Task, ServiceError> {
        let current = self.find_task(task_id).await?;
        self.authorize(actor, TaskAction::Read, current.as_ref(), &TaskUpdate::default())?;
        current.ok_or(ServiceError::NotFoundOrUnauthorized)
    }

    /// List the acting user's assigned tasks, optionally filtered by status
    /// and project. Ordered by due date.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when the actor is anonymous.
    pub async fn list_my_tasks(
        &self,
        actor: &ActorContext,
        filter: TaskFilter,
    ) -> Result<Vec<Task>, ServiceError> {
        let user_id = require_authenticated(actor)?.to_string();
        self.list_assigned_tasks(&user_id, &filter).await
    }

    /// List another user's assigned tasks. Admin only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for non-admin actors or an unknown user.
    pub async fn list_tasks_for_assignee(
        &self,
        actor: &ActorContext,
        user_id: &str,
        filter: TaskFilter,
    ) -> Result<Vec<Task>, ServiceError> {
        require_admin(actor)?;
        if !self.user_exists(user_id).await? {
            return Err(ServiceError::NotFoundOrUnauthorized);
        }
        self.list_assigned_tasks(user_id, &filter).await
    }

    /// Apply requested changes to a task.
    ///
    /// Pipeline: load, authorize (including the reassignment gate), validate
    /// only the references the update actually changes, stage, commit.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when absent or denied;
    /// `ReferenceNotFound("project")` / `ReferenceNotFound("assignee")` for a
    /// changed reference that does not exist; `ConcurrencyConflict` when the
    /// loaded snapshot went stale before commit.
    pub async fn update_task(
        &self,
        actor: &ActorContext,
        task_id: &str,
        update: TaskUpdate,
    ) -> Result<Task, ServiceError> {
        let current = self.find_task(task_id).await?;
        self.authorize(actor, TaskAction::Update, current.as_ref(), &update)?;
        let before = current.ok_or(ServiceError::NotFoundOrUnauthorized)?;

        if let Some(project_id) = update.project_id.as_deref()
            && update.changes_project(&before)
            && !self.project_exists(project_id).await?
        {
            return Err(ServiceError::ReferenceNotFound("project"));
        }
        if update.reassigns(&before)
            && let Some(Some(assignee)) = &update.user_id
            && !self.user_exists(assignee).await?
        {
            return Err(ServiceError::ReferenceNotFound("assignee"));
        }

        let mut after = update.apply_to(&before);
        after.updated_at = Utc::now();

        let mut changes = ChangeSet::new();
        changes.stage_modified(
            TrackedEntity::Task(before),
            TrackedEntity::Task(after.clone()),
        )?;
        self.commit_changes(changes, actor).await?;

        info!(task_id, "task updated");
        Ok(after)
    }

    /// Delete a task. Admin or current assignee only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when absent or denied.
    pub async fn delete_task(
        &self,
        actor: &ActorContext,
        task_id: &str,
    ) -> Result<(), ServiceError> {
        let current = self.find_task(task_id).await?;
        self.authorize(actor, TaskAction::Delete, current.as_ref(), &TaskUpdate::default())?;
        let task = current.ok_or(ServiceError::NotFoundOrUnauthorized)?;

        let mut changes = ChangeSet::new();
        changes.stage_deleted(TrackedEntity::Task(task));
        self.commit_changes(changes, actor).await?;

        info!(task_id, "task deleted");
        Ok(())
    }

    /// Evaluate the policy and collapse `Deny` and `NotFound` into the merged
    /// external outcome. The denial reason is logged here, and only here.
    fn authorize(
        &self,
        actor: &ActorContext,
        action: TaskAction,
        current: Option<&Task>,
        requested: &TaskUpdate,
    ) -> Result<(), ServiceError> {
        match evaluate_task_mutation(actor, action, current, requested) {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny(reason) => {
                warn!(
                    ?action,
                    actor = %actor.audit_user_id(),
                    reason = %reason,
                    "task access denied"
                );
                Err(ServiceError::NotFoundOrUnauthorized)
            }
            PolicyDecision::NotFound => Err(ServiceError::NotFoundOrUnauthorized),
        }
    }

    async fn list_assigned_tasks(
        &self,
        user_id: &str,
        filter: &TaskFilter,
    ) -> Result<Vec<Task>, ServiceError> {
        let mut sql = format!("SELECT {SELECT_COLS} FROM tasks WHERE user_id = ?1");
        let mut params: Vec<libsql::Value> = vec![user_id.into()];
        if let Some(status) = filter.status {
            params.push(status.as_str().into());
            sql.push_str(&format!(" AND status = ?{}", params.len()));
        }
        if let Some(project_id) = &filter.project_id {
            params.push(project_id.as_str().into());
            sql.push_str(&format!(" AND project_id = ?{}", params.len()));
        }
        sql.push_str(" ORDER BY due_date");

        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await.map_err(DatabaseError::from)? {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    pub(crate) async fn find_task(&self, task_id: &str) -> Result<Option<Task>, ServiceError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM tasks WHERE id = ?1"),
                [task_id],
            )
            .await?;
        match rows.next().await.map_err(DatabaseError::from)? {
            Some(row) => Ok(Some(row_to_task(&row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        audit_row_count, audit_rows_for, seed_admin, seed_member, seed_project, test_service,
    };
    use ops_core::updates::TaskUpdateBuilder;
    use pretty_assertions::assert_eq;

    fn new_task(project_id: &str, title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: Some("write it up".to_string()),
            due_date: Utc::now(),
            project_id: project_id.to_string(),
            status: None,
        }
    }

    #[tokio::test]
    async fn create_self_assigns_and_audits_every_field() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let member = seed_member(&service, "me@example.com").await;
        let project_id = seed_project(&service, &admin, "Apollo").await;

        let task = service
            .create_task(&member, new_task(&project_id, "Write report"))
            .await
            .unwrap();
        assert!(task.id.starts_with("tsk-"));
        assert_eq!(task.status, TaskStatus::NotStarted);
        assert_eq!(task.user_id, member.user_id);

        // summary + title, description, due_date, status, project_id, user_id
        let rows = audit_rows_for(&service, &task.id).await;
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].0, "Entity");
        assert_eq!(rows[0].2.as_deref(), Some("Created"));
        assert!(rows.iter().all(|(_, old, _, ty)| old.is_none() && ty == "created"));
    }

    #[tokio::test]
    async fn create_validates_title_and_project() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let member = seed_member(&service, "me@example.com").await;
        let project_id = seed_project(&service, &admin, "Apollo").await;

        let result = service.create_task(&member, new_task(&project_id, " ")).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));

        let result = service
            .create_task(&member, new_task("prj-missing", "Write report"))
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::ReferenceNotFound("project"))
        ));

        let result = service
            .create_task(&ActorContext::anonymous(), new_task(&project_id, "Write"))
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::NotFoundOrUnauthorized)
        ));
    }

    #[tokio::test]
    async fn status_change_audits_exactly_one_row() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let member = seed_member(&service, "me@example.com").await;
        let project_id = seed_project(&service, &admin, "Apollo").await;
        let task = service
            .create_task(&member, new_task(&project_id, "Write report"))
            .await
            .unwrap();
        let baseline = audit_row_count(&service).await;

        let update = TaskUpdateBuilder::new()
            .status(TaskStatus::InProgress)
            .build();
        let updated = service.update_task(&member, &task.id, update).await.unwrap();
        assert_eq!(updated.status, TaskStatus::InProgress);

        assert_eq!(audit_row_count(&service).await, baseline + 1);
        let rows = audit_rows_for(&service, &task.id).await;
        let last = rows.last().unwrap();
        assert_eq!(last.0, "status");
        assert_eq!(last.1.as_deref(), Some("not_started"));
        assert_eq!(last.2.as_deref(), Some("in_progress"));
        assert_eq!(last.3, "updated");
    }

    #[tokio::test]
    async fn noop_update_leaves_no_audit_trace() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let member = seed_member(&service, "me@example.com").await;
        let project_id = seed_project(&service, &admin, "Apollo").await;
        let task = service
            .create_task(&member, new_task(&project_id, "Write report"))
            .await
            .unwrap();
        let baseline = audit_row_count(&service).await;

        // Re-stating the current title changes nothing.
        let update = TaskUpdateBuilder::new().title("Write report").build();
        service.update_task(&member, &task.id, update).await.unwrap();

        assert_eq!(audit_row_count(&service).await, baseline);
    }

    #[tokio::test]
    async fn delete_audits_one_summary_row() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let member = seed_member(&service, "me@example.com").await;
        let project_id = seed_project(&service, &admin, "Apollo").await;
        let task = service
            .create_task(&member, new_task(&project_id, "Write report"))
            .await
            .unwrap();
        let baseline = audit_row_count(&service).await;

        service.delete_task(&member, &task.id).await.unwrap();
        assert!(service.find_task(&task.id).await.unwrap().is_none());

        assert_eq!(audit_row_count(&service).await, baseline + 1);
        let rows = audit_rows_for(&service, &task.id).await;
        let last = rows.last().unwrap();
        assert_eq!(last.0, "Entity");
        assert_eq!(
            last.1.as_deref(),
            Some(format!("task (ID: {})", task.id).as_str())
        );
        assert_eq!(last.3, "deleted");
    }

    #[tokio::test]
    async fn strangers_cannot_tell_denied_from_missing() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let owner = seed_member(&service, "owner@example.com").await;
        let stranger = seed_member(&service, "stranger@example.com").await;
        let project_id = seed_project(&service, &admin, "Apollo").await;
        let task = service
            .create_task(&owner, new_task(&project_id, "Write report"))
            .await
            .unwrap();

        let on_existing = service.get_task(&stranger, &task.id).await;
        let on_missing = service.get_task(&stranger, "tsk-missing").await;
        assert!(matches!(
            on_existing,
            Err(ServiceError::NotFoundOrUnauthorized)
        ));
        assert!(matches!(
            on_missing,
            Err(ServiceError::NotFoundOrUnauthorized)
        ));

        let update = TaskUpdateBuilder::new()
            .status(TaskStatus::Completed)
            .build();
        assert!(matches!(
            service.update_task(&stranger, &task.id, update).await,
            Err(ServiceError::NotFoundOrUnauthorized)
        ));
        assert!(matches!(
            service.delete_task(&stranger, &task.id).await,
            Err(ServiceError::NotFoundOrUnauthorized)
        ));
    }

    #[tokio::test]
    async fn only_admins_reassign() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let owner = seed_member(&service, "owner@example.com").await;
        let other = seed_member(&service, "other@example.com").await;
        let other_id = other.user_id.clone().unwrap();
        let project_id = seed_project(&service, &admin, "Apollo").await;
        let task = service
            .create_task(&owner, new_task(&project_id, "Write report"))
            .await
            .unwrap();

        // Even the assignee may not hand their own task to someone else.
        let update = TaskUpdateBuilder::new()
            .user_id(Some(other_id.clone()))
            .build();
        assert!(matches!(
            service.update_task(&owner, &task.id, update.clone()).await,
            Err(ServiceError::NotFoundOrUnauthorized)
        ));

        let updated = service.update_task(&admin, &task.id, update).await.unwrap();
        assert_eq!(updated.user_id.as_deref(), Some(other_id.as_str()));
    }

    #[tokio::test]
    async fn reassigning_to_a_ghost_is_a_reference_error() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let project_id = seed_project(&service, &admin, "Apollo").await;
        let task = service
            .create_task(&admin, new_task(&project_id, "Write report"))
            .await
            .unwrap();

        let update = TaskUpdateBuilder::new()
            .user_id(Some("usr-ghost".to_string()))
            .build();
        assert!(matches!(
            service.update_task(&admin, &task.id, update).await,
            Err(ServiceError::ReferenceNotFound("assignee"))
        ));

        let update = TaskUpdateBuilder::new().project_id("prj-ghost").build();
        assert!(matches!(
            service.update_task(&admin, &task.id, update).await,
            Err(ServiceError::ReferenceNotFound("project"))
        ));
    }

    #[tokio::test]
    async fn unassigning_needs_no_assignee_lookup() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let project_id = seed_project(&service, &admin, "Apollo").await;
        let task = service
            .create_task(&admin, new_task(&project_id, "Write report"))
            .await
            .unwrap();

        let update = TaskUpdateBuilder::new().user_id(None).build();
        let updated = service.update_task(&admin, &task.id, update).await.unwrap();
        assert_eq!(updated.user_id, None);
    }

    #[tokio::test]
    async fn listings_filter_by_status_and_project() {
        let service = test_service().await;
        let admin = seed_admin(&service, "admin@example.com").await;
        let member = seed_member(&service, "me@example.com").await;
        let member_id = member.user_id.clone().unwrap();
        let apollo = seed_project(&service, &admin, "Apollo").await;
        let artemis = seed_project(&service, &admin, "Artemis").await;

        let t1 = service
            .create_task(&member, new_task(&apollo, "One"))
            .await
            .unwrap();
        service
            .create_task(&member, new_task(&artemis, "Two"))
            .await
            .unwrap();
        service
            .update_task(
                &member,
                &t1.id,
                TaskUpdateBuilder::new().status(TaskStatus::Completed).build(),
            )
            .await
            .unwrap();

        let all = service
            .list_my_tasks(&member, TaskFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let completed = service
            .list_my_tasks(
                &member,
                TaskFilter {
                    status: Some(TaskStatus::Completed),
                    project_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, t1.id);

        let in_artemis = service
            .list_my_tasks(
                &member,
                TaskFilter {
                    status: None,
                    project_id: Some(artemis.clone()),
                },
            )
            .await
            .unwrap();
        assert_eq!(in_artemis.len(), 1);

        // Admin view of someone else's plate.
        assert!(matches!(
            service
                .list_tasks_for_assignee(&member, &member_id, TaskFilter::default())
                .await,
            Err(ServiceError::NotFoundOrUnauthorized)
        ));
        let theirs = service
            .list_tasks_for_assignee(&admin, &member_id, TaskFilter::default())
            .await
            .unwrap();
        assert_eq!(theirs.len(), 2);
    }
}
