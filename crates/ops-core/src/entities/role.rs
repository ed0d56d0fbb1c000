use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named role (`"Admin"`, `"User"`). Roles are seeded by migration and
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Role {
    pub id: String,
    pub name: String,
}

/// Many-to-many association between a user and a role.
///
/// A `(user_id, role_id)` pair is unique; duplicate assignment is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct UserRole {
    pub id: String,
    pub user_id: String,
    pub role_id: String,
    pub assigned_at: DateTime<Utc>,
}
