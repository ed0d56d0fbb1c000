use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::UserStatus;

/// A user account. Deleting a user unassigns their tasks, never deletes them.
///
/// `password_hash` is produced by the out-of-scope identity layer and is an
/// internal field: it never appears in audit rows.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct User {
    pub id: String,
    /// Unique across all users.
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub status: UserStatus,
}
