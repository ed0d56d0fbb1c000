//! Role management. Admin only, end to end.
//!
//! Role assignments are join rows, not audited entities: granting or
//! revoking a role leaves no audit trail, matching the audit scope of the
//! rest of the system.

use chrono::Utc;
use tracing::info;

use ops_core::change::{ChangeSet, TrackedEntity};
use ops_core::entities::{Role, UserRole};
use ops_core::enums::ActorRole;
use ops_core::identity::ActorContext;
use ops_core::ids::PREFIX_USER_ROLE;

use crate::error::{DatabaseError, ServiceError};
use crate::helpers::parse_datetime;
use crate::service::{OpsService, require_admin};

fn row_to_role(row: &libsql::Row) -> Result<Role, DatabaseError> {
    Ok(Role {
        id: row.get::<String>(0)?,
        name: row.get::<String>(1)?,
    })
}

impl OpsService {
    /// List all roles. Admin only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for non-admin actors.
    pub async fn list_roles(&self, actor: &ActorContext) -> Result<Vec<Role>, ServiceError> {
        require_admin(actor)?;
        let mut rows = self
            .db()
            .conn()
            .query("SELECT id, name FROM roles ORDER BY name", ())
            .await?;
        let mut roles = Vec::new();
        while let Some(row) = rows.next().await.map_err(DatabaseError::from)? {
            roles.push(row_to_role(&row)?);
        }
        Ok(roles)
    }

    /// List the roles assigned to a user. Admin only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for non-admin actors;
    /// `ReferenceNotFound("user")` for an unknown user.
    pub async fn roles_for_user(
        &self,
        actor: &ActorContext,
        user_id: &str,
    ) -> Result<Vec<Role>, ServiceError> {
        require_admin(actor)?;
        if !self.user_exists(user_id).await? {
            return Err(ServiceError::ReferenceNotFound("user"));
        }
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT r.id, r.name FROM roles r
                 JOIN user_roles ur ON ur.role_id = r.id
                 WHERE ur.user_id = ?1 ORDER BY r.name",
                [user_id],
            )
            .await?;
        let mut roles = Vec::new();
        while let Some(row) = rows.next().await.map_err(DatabaseError::from)? {
            roles.push(row_to_role(&row)?);
        }
        Ok(roles)
    }

    /// Grant a role to a user, by role name. Admin only.
    ///
    /// # Errors
    ///
    /// `ReferenceNotFound("user")` / `ReferenceNotFound("role")` for unknown
    /// targets; `Validation` when the user already holds the role.
    pub async fn assign_role(
        &self,
        actor: &ActorContext,
        user_id: &str,
        role_name: &str,
    ) -> Result<UserRole, ServiceError> {
        require_admin(actor)?;
        if !self.user_exists(user_id).await? {
            return Err(ServiceError::ReferenceNotFound("user"));
        }
        let role = self
            .find_role_by_name(role_name)
            .await?
            .ok_or(ServiceError::ReferenceNotFound("role"))?;

        let assignment = UserRole {
            id: self.db().generate_id(PREFIX_USER_ROLE).await?,
            user_id: user_id.to_string(),
            role_id: role.id,
            assigned_at: Utc::now(),
        };

        let mut changes = ChangeSet::new();
        changes.stage_added(TrackedEntity::UserRole(assignment.clone()));
        self.commit_changes(changes, actor).await?;

        info!(user_id, role = role_name, "role granted");
        Ok(assignment)
    }

    /// Revoke a role from a user, by role name. Admin only.
    ///
    /// # Errors
    ///
    /// `ReferenceNotFound` for unknown targets; `Validation` when the user
    /// does not hold the role.
    pub async fn remove_role(
        &self,
        actor: &ActorContext,
        user_id: &str,
        role_name: &str,
    ) -> Result<(), ServiceError> {
        require_admin(actor)?;
        if !self.user_exists(user_id).await? {
            return Err(ServiceError::ReferenceNotFound("user"));
        }
        let role = self
            .find_role_by_name(role_name)
            .await?
            .ok_or(ServiceError::ReferenceNotFound("role"))?;

        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT id, user_id, role_id, assigned_at FROM user_roles
                 WHERE user_id = ?1 AND role_id = ?2",
                [user_id, role.id.as_str()],
            )
            .await?;
        let Some(row) = rows.next().await.map_err(DatabaseError::from)? else {
            return Err(ServiceError::Validation(format!(
                "role '{role_name}' is not assigned"
            )));
        };
        let assignment = UserRole {
            id: row.get::<String>(0)?,
            user_id: row.get::<String>(1)?,
            role_id: row.get::<String>(2)?,
            assigned_at: parse_datetime(&row.get::<String>(3)?)?,
        };

        let mut changes = ChangeSet::new();
        changes.stage_deleted(TrackedEntity::UserRole(assignment));
        self.commit_changes(changes, actor).await?;

        info!(user_id, role = role_name, "role revoked");
        Ok(())
    }

    /// Resolve a stored user into an [`ActorContext`] from their role
    /// assignments. This is the bridge an authenticating caller uses after
    /// verifying credentials; any assignment to a role named `Admin` grants
    /// the admin role, everything else is a member.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for an unknown user.
    pub async fn resolve_actor(&self, user_id: &str) -> Result<ActorContext, ServiceError> {
        if !self.user_exists(user_id).await? {
            return Err(ServiceError::NotFoundOrUnauthorized);
        }
        let mut rows = self
            .db()
            .conn()
            .query(
                "SELECT r.name FROM roles r
                 JOIN user_roles ur ON ur.role_id = r.id
                 WHERE ur.user_id = ?1",
                [user_id],
            )
            .await?;
        let mut role = ActorRole::Member;
        while let Some(row) = rows.next().await.map_err(DatabaseError::from)? {
            let name = row.get::<String>(0)?;
            if ActorRole::from_role_name(&name) == ActorRole::Admin {
                role = ActorRole::Admin;
            }
        }
        Ok(ActorContext::authenticated(user_id, role))
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, ServiceError> {
        let mut rows = self
            .db()
            .conn()
            .query("SELECT id, name FROM roles WHERE name = ?1", [name])
            .await?;
        match rows.next().await.map_err(DatabaseError::from)? {
            Some(row) => Ok(Some(row_to_role(&row)?)),
            None => Ok(None),
        }
    }
}
