//! Project operations. Mutations are admin-only; reads are open to any
//! authenticated actor.

use chrono::Utc;
use tracing::info;

use ops_core::change::{ChangeSet, TrackedEntity};
use ops_core::entities::Project;
use ops_core::identity::ActorContext;
use ops_core::ids::PREFIX_PROJECT;
use ops_core::updates::ProjectUpdate;

use crate::error::{DatabaseError, ServiceError};
use crate::helpers::{get_opt_string, parse_datetime};
use crate::service::{OpsService, require_admin, require_authenticated};

const SELECT_COLS: &str = "id, name, description, created_at, updated_at";

pub(crate) fn row_to_project(row: &libsql::Row) -> Result<Project, DatabaseError> {
    Ok(Project {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
        description: get_opt_string(row, 2)?,
        created_at: parse_datetime(&row.get::<String>(3)?)?,
        updated_at: parse_datetime(&row.get::<String>(4)?)?,
    })
}

/// Input for creating a project.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
}

impl OpsService {
    /// Create a project. Admin only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for non-admin actors; `Validation` for an
    /// empty name.
    pub async fn create_project(
        &self,
        actor: &ActorContext,
        new: NewProject,
    ) -> Result<Project, ServiceError> {
        require_admin(actor)?;
        if new.name.trim().is_empty() {
            return Err(ServiceError::Validation(
                "project name must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let project = Project {
            id: self.db().generate_id(PREFIX_PROJECT).await?,
            name: new.name,
            description: new.description,
            created_at: now,
            updated_at: now,
        };

        let mut changes = ChangeSet::new();
        changes.stage_added(TrackedEntity::Project(project.clone()));
        self.commit_changes(changes, actor).await?;

        info!(project_id = %project.id, "project created");
        Ok(project)
    }

    /// Fetch a project. Any authenticated actor.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when absent or the actor is anonymous.
    pub async fn get_project(
        &self,
        actor: &ActorContext,
        project_id: &str,
    ) -> Result<Project, ServiceError> {
        require_authenticated(actor)?;
        self.find_project(project_id)
            .await?
            .ok_or(ServiceError::NotFoundOrUnauthorized)
    }

    /// List all projects, alphabetically. Any authenticated actor.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when the actor is anonymous.
    pub async fn list_projects(&self, actor: &ActorContext) -> Result<Vec<Project>, ServiceError> {
        require_authenticated(actor)?;
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM projects ORDER BY name"),
                (),
            )
            .await?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next().await.map_err(DatabaseError::from)? {
            projects.push(row_to_project(&row)?);
        }
        Ok(projects)
    }

    /// Update a project's name or description. Admin only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when absent or not admin; `Validation` for an
    /// empty name; `ConcurrencyConflict` if the snapshot went stale.
    pub async fn update_project(
        &self,
        actor: &ActorContext,
        project_id: &str,
        update: ProjectUpdate,
    ) -> Result<Project, ServiceError> {
        require_admin(actor)?;
        let before = self
            .find_project(project_id)
            .await?
            .ok_or(ServiceError::NotFoundOrUnauthorized)?;

        if let Some(name) = &update.name
            && name.trim().is_empty()
        {
            return Err(ServiceError::Validation(
                "project name must not be empty".to_string(),
            ));
        }

        let mut after = before.clone();
        if let Some(name) = update.name {
            after.name = name;
        }
        if let Some(description) = update.description {
            after.description = description;
        }
        after.updated_at = Utc::now();

        let mut changes = ChangeSet::new();
        changes.stage_modified(
            TrackedEntity::Project(before),
            TrackedEntity::Project(after.clone()),
        )?;
        self.commit_changes(changes, actor).await?;
        Ok(after)
    }

    /// Delete a project and, via the schema, every task in it. Admin only.
    ///
    /// The audit trail records the project deletion; cascaded task rows are
    /// removed by the database and are not individually audited.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when absent or the actor is not an admin.
    pub async fn delete_project(
        &self,
        actor: &ActorContext,
        project_id: &str,
    ) -> Result<(), ServiceError> {
        require_admin(actor)?;
        let project = self
            .find_project(project_id)
            .await?
            .ok_or(ServiceError::NotFoundOrUnauthorized)?;

        let mut changes = ChangeSet::new();
        changes.stage_deleted(TrackedEntity::Project(project));
        self.commit_changes(changes, actor).await?;

        info!(project_id, "project deleted");
        Ok(())
    }

    pub(crate) async fn find_project(
        &self,
        project_id: &str,
    ) -> Result<Option<Project>, ServiceError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM projects WHERE id = ?1"),
                [project_id],
            )
            .await?;
        match rows.next().await.map_err(DatabaseError::from)? {
            Some(row) => Ok(Some(row_to_project(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn project_exists(&self, project_id: &str) -> Result<bool, ServiceError> {
        let mut rows = self
            .db()
            .conn()
            .query("SELECT 1 FROM projects WHERE id = ?1", [project_id])
            .await?;
        Ok(rows.next().await.map_err(DatabaseError::from)?.is_some())
    }
}
