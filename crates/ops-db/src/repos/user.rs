//! User account operations.
//!
//! Registration is open (no authenticated actor required); everything that
//! touches someone else's account is admin-only, and profile edits are
//! admin-or-self. Account rows carry the password hash but it is never an
//! audited field.

use tracing::{info, warn};

use ops_core::change::{ChangeSet, TrackedEntity};
use ops_core::entities::User;
use ops_core::enums::UserStatus;
use ops_core::identity::ActorContext;
use ops_core::ids::PREFIX_USER;
use ops_core::updates::UserProfileUpdate;

use crate::error::{DatabaseError, ServiceError};
use crate::helpers::{get_opt_string, parse_enum};
use crate::service::{OpsService, require_admin};

const SELECT_COLS: &str = "id, email, password_hash, name, status";

pub(crate) fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    Ok(User {
        id: row.get::<String>(0)?,
        email: row.get::<String>(1)?,
        password_hash: row.get::<String>(2)?,
        name: get_opt_string(row, 3)?,
        status: parse_enum(&row.get::<String>(4)?)?,
    })
}

/// Input for registering a user. The caller hashes the password; this layer
/// never sees plaintext.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
}

impl OpsService {
    /// Register a user account. Open to unauthenticated callers; the audit
    /// trail records the sentinel actor in that case.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed email, an empty password hash, or an
    /// email already in use.
    pub async fn create_user(
        &self,
        actor: &ActorContext,
        new: NewUser,
    ) -> Result<User, ServiceError> {
        if !new.email.contains('@') {
            return Err(ServiceError::Validation(
                "email must contain '@'".to_string(),
            ));
        }
        if new.password_hash.trim().is_empty() {
            return Err(ServiceError::Validation(
                "password hash must not be empty".to_string(),
            ));
        }

        let user = User {
            id: self.db().generate_id(PREFIX_USER).await?,
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            status: UserStatus::Active,
        };

        let mut changes = ChangeSet::new();
        changes.stage_added(TrackedEntity::User(user.clone()));
        self.commit_changes(changes, actor).await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Fetch a user account. Admin or the account owner only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when the user is absent or the actor may not
    /// see it.
    pub async fn get_user(
        &self,
        actor: &ActorContext,
        user_id: &str,
    ) -> Result<User, ServiceError> {
        if !actor.is_admin() && !actor.is_user(user_id) {
            return Err(ServiceError::NotFoundOrUnauthorized);
        }
        self.find_user(user_id)
            .await?
            .ok_or(ServiceError::NotFoundOrUnauthorized)
    }

    /// List all user accounts. Admin only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` for non-admin actors.
    pub async fn list_users(&self, actor: &ActorContext) -> Result<Vec<User>, ServiceError> {
        require_admin(actor)?;
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM users ORDER BY email"),
                (),
            )
            .await?;
        let mut users = Vec::new();
        while let Some(row) = rows.next().await.map_err(DatabaseError::from)? {
            users.push(row_to_user(&row)?);
        }
        Ok(users)
    }

    /// Update a user's profile (name, email). Admin or the account owner.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when absent or not permitted; `Validation`
    /// for a malformed or already-taken email.
    pub async fn update_user_profile(
        &self,
        actor: &ActorContext,
        user_id: &str,
        update: UserProfileUpdate,
    ) -> Result<User, ServiceError> {
        if !actor.is_admin() && !actor.is_user(user_id) {
            warn!(user_id, "profile update refused: not owner or admin");
            return Err(ServiceError::NotFoundOrUnauthorized);
        }
        let before = self
            .find_user(user_id)
            .await?
            .ok_or(ServiceError::NotFoundOrUnauthorized)?;

        if let Some(email) = &update.email
            && !email.contains('@')
        {
            return Err(ServiceError::Validation(
                "email must contain '@'".to_string(),
            ));
        }

        let mut after = before.clone();
        if let Some(name) = update.name {
            after.name = Some(name);
        }
        if let Some(email) = update.email {
            after.email = email;
        }

        let mut changes = ChangeSet::new();
        changes.stage_modified(
            TrackedEntity::User(before),
            TrackedEntity::User(after.clone()),
        )?;
        self.commit_changes(changes, actor).await?;
        Ok(after)
    }

    /// Set a user's account status (activate, deactivate, suspend). Admin only.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when absent or the actor is not an admin.
    pub async fn update_user_status(
        &self,
        actor: &ActorContext,
        user_id: &str,
        status: UserStatus,
    ) -> Result<User, ServiceError> {
        require_admin(actor)?;
        let before = self
            .find_user(user_id)
            .await?
            .ok_or(ServiceError::NotFoundOrUnauthorized)?;

        let mut after = before.clone();
        after.status = status;

        let mut changes = ChangeSet::new();
        changes.stage_modified(
            TrackedEntity::User(before),
            TrackedEntity::User(after.clone()),
        )?;
        self.commit_changes(changes, actor).await?;

        info!(user_id, status = status.as_str(), "user status changed");
        Ok(after)
    }

    /// Delete a user account. Admin only. Their role assignments go with
    /// them; their tasks stay and become unassigned.
    ///
    /// # Errors
    ///
    /// `NotFoundOrUnauthorized` when absent or the actor is not an admin.
    pub async fn delete_user(
        &self,
        actor: &ActorContext,
        user_id: &str,
    ) -> Result<(), ServiceError> {
        require_admin(actor)?;
        let user = self
            .find_user(user_id)
            .await?
            .ok_or(ServiceError::NotFoundOrUnauthorized)?;

        let mut changes = ChangeSet::new();
        changes.stage_deleted(TrackedEntity::User(user));
        self.commit_changes(changes, actor).await?;

        info!(user_id, "user deleted");
        Ok(())
    }

    pub(crate) async fn find_user(&self, user_id: &str) -> Result<Option<User>, ServiceError> {
        let mut rows = self
            .db()
            .conn()
            .query(
                &format!("SELECT {SELECT_COLS} FROM users WHERE id = ?1"),
                [user_id],
            )
            .await?;
        match rows.next().await.map_err(DatabaseError::from)? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn user_exists(&self, user_id: &str) -> Result<bool, ServiceError> {
        let mut rows = self
            .db()
            .conn()
            .query("SELECT 1 FROM users WHERE id = ?1", [user_id])
            .await?;
        Ok(rows.next().await.map_err(DatabaseError::from)?.is_some())
    }
}
