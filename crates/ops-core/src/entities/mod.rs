//! Entity structs for all Opsboard domain objects.
//!
//! Each entity maps to a table in the libSQL database. All structs derive
//! `Serialize`, `Deserialize`, and `JsonSchema` for JSON roundtrip and schema
//! validation. Entities are plain records; mutation goes through the change
//! session in [`crate::change`].

mod audit;
mod project;
mod role;
mod task;
mod user;

pub use audit::AuditEntry;
pub use project::Project;
pub use role::{Role, UserRole};
pub use task::Task;
pub use user::User;
