//! Update builder types for entity mutations.
//!
//! Each builder produces an update struct with `Option` fields; only `Some`
//! fields are applied. Double-`Option` fields distinguish "leave unchanged"
//! (outer `None`) from "set to NULL" (inner `None`). The policy evaluator
//! reads `TaskUpdate` directly to decide whether a reassignment is requested.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entities::Task;
use crate::enums::TaskStatus;

/// Requested changes to a task. Fields left `None` are not touched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Option<String>>,
}

impl TaskUpdate {
    /// Whether this update would move the task to a different project.
    #[must_use]
    pub fn changes_project(&self, current: &Task) -> bool {
        self.project_id
            .as_deref()
            .is_some_and(|p| p != current.project_id)
    }

    /// Whether this update would change the assignee. Re-stating the current
    /// assignee is not a reassignment.
    #[must_use]
    pub fn reassigns(&self, current: &Task) -> bool {
        self.user_id
            .as_ref()
            .is_some_and(|u| u.as_deref() != current.user_id.as_deref())
    }

    /// Apply the requested changes to a copy of `current`, leaving untouched
    /// fields as they were. `updated_at` is set by the mutation service.
    #[must_use]
    pub fn apply_to(&self, current: &Task) -> Task {
        let mut task = current.clone();
        if let Some(ref title) = self.title {
            task.title = title.clone();
        }
        if let Some(ref description) = self.description {
            task.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(ref project_id) = self.project_id {
            task.project_id = project_id.clone();
        }
        if let Some(ref user_id) = self.user_id {
            task.user_id = user_id.clone();
        }
        task
    }
}

pub struct TaskUpdateBuilder(TaskUpdate);

impl TaskUpdateBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self(TaskUpdate::default())
    }

    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.0.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: Option<String>) -> Self {
        self.0.description = Some(description);
        self
    }

    #[must_use]
    pub fn due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.0.due_date = Some(due_date);
        self
    }

    #[must_use]
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.0.status = Some(status);
        self
    }

    #[must_use]
    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.0.project_id = Some(project_id.into());
        self
    }

    #[must_use]
    pub fn user_id(mut self, user_id: Option<String>) -> Self {
        self.0.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn build(self) -> TaskUpdate {
        self.0
    }
}

impl Default for TaskUpdateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Requested changes to a project.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
}

/// Requested changes to a user profile (admin or self-service).
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_task() -> Task {
        let now = Utc::now();
        Task {
            id: "tsk-1".into(),
            title: "Ship it".into(),
            description: None,
            due_date: now,
            status: TaskStatus::InProgress,
            project_id: "prj-1".into(),
            user_id: Some("usr-1".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn restating_assignee_is_not_a_reassignment() {
        let task = sample_task();
        let update = TaskUpdateBuilder::new()
            .user_id(Some("usr-1".into()))
            .build();
        assert!(!update.reassigns(&task));

        let update = TaskUpdateBuilder::new()
            .user_id(Some("usr-2".into()))
            .build();
        assert!(update.reassigns(&task));

        let update = TaskUpdateBuilder::new().user_id(None).build();
        assert!(update.reassigns(&task), "unassigning is a reassignment");
    }

    #[test]
    fn apply_to_touches_only_requested_fields() {
        let task = sample_task();
        let update = TaskUpdateBuilder::new()
            .status(TaskStatus::Completed)
            .build();
        let applied = update.apply_to(&task);
        assert_eq!(applied.status, TaskStatus::Completed);
        assert_eq!(applied.title, task.title);
        assert_eq!(applied.project_id, task.project_id);
        assert_eq!(applied.user_id, task.user_id);
    }
}
