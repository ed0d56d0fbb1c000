//! Shared fixtures for ops-db tests.

use ops_core::enums::ActorRole;
use ops_core::identity::ActorContext;

use crate::repos::project::NewProject;
use crate::repos::user::NewUser;
use crate::service::OpsService;

/// Fresh in-memory service with migrations applied.
pub(crate) async fn test_service() -> OpsService {
    OpsService::new_local(":memory:").await.unwrap()
}

/// Register a user row and return an admin actor for it.
///
/// The admin role here is the actor's resolved role, the way an HTTP layer
/// would present it; the `user_roles` row is only needed by role-management
/// tests, which create it themselves.
pub(crate) async fn seed_admin(service: &OpsService, email: &str) -> ActorContext {
    let user = service
        .create_user(
            &ActorContext::anonymous(),
            NewUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                name: None,
            },
        )
        .await
        .unwrap();
    ActorContext::authenticated(user.id, ActorRole::Admin)
}

/// Register a user row and return a member actor for it.
pub(crate) async fn seed_member(service: &OpsService, email: &str) -> ActorContext {
    let user = service
        .create_user(
            &ActorContext::anonymous(),
            NewUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                name: None,
            },
        )
        .await
        .unwrap();
    ActorContext::authenticated(user.id, ActorRole::Member)
}

/// Create a project as the given admin and return its ID.
pub(crate) async fn seed_project(
    service: &OpsService,
    admin: &ActorContext,
    name: &str,
) -> String {
    service
        .create_project(
            admin,
            NewProject {
                name: name.to_string(),
                description: None,
            },
        )
        .await
        .unwrap()
        .id
}

/// Total number of audit rows in the store.
pub(crate) async fn audit_row_count(service: &OpsService) -> i64 {
    let mut rows = service
        .db()
        .conn()
        .query("SELECT COUNT(*) FROM audit_entries", ())
        .await
        .unwrap();
    rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
}

/// Audit rows for one entity, oldest first, as
/// `(property_name, old_value, new_value, change_type)`.
pub(crate) async fn audit_rows_for(
    service: &OpsService,
    entity_id: &str,
) -> Vec<(String, Option<String>, Option<String>, String)> {
    let mut rows = service
        .db()
        .conn()
        .query(
            "SELECT property_name, old_value, new_value, change_type
             FROM audit_entries WHERE entity_id = ?1 ORDER BY rowid",
            [entity_id],
        )
        .await
        .unwrap();
    let mut out = Vec::new();
    while let Some(row) = rows.next().await.unwrap() {
        out.push((
            row.get::<String>(0).unwrap(),
            row.get::<Option<String>>(1).unwrap(),
            row.get::<Option<String>>(2).unwrap(),
            row.get::<String>(3).unwrap(),
        ));
    }
    out
}
