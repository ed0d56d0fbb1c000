//! Pure task authorization policy.
//!
//! A stateless decision over the actor, the action, the task's current state,
//! and the requested changes. No persistence, no transport: reference
//! existence (does the target project or assignee exist) is validated by the
//! mutation service after an `Allow`, because it needs a lookup.
//!
//! Callers collapse `Deny` and `NotFound` into one external outcome so a
//! denied caller cannot probe which task IDs exist.

use crate::entities::Task;
use crate::identity::ActorContext;
use crate::updates::TaskUpdate;
use std::fmt;

/// What the actor is attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Read,
    Update,
    Delete,
}

/// Why a mutation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Actor is neither an admin nor the task's current assignee.
    NotAuthorized,
    /// Changing the assignee requires the admin role.
    ReassignRequiresAdmin,
    /// No authenticated actor.
    NotAuthenticated,
}

impl DenyReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotAuthorized => "not authorized",
            Self::ReassignRequiresAdmin => "only admins may reassign",
            Self::NotAuthenticated => "not authenticated",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tri-state policy outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(DenyReason),
    /// The task does not exist. Externally indistinguishable from `Deny`.
    NotFound,
}

impl PolicyDecision {
    #[must_use]
    pub const fn is_allow(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Evaluate a mutation (or read) against an existing task.
///
/// For `Read` and `Delete`, pass an empty [`TaskUpdate`].
#[must_use]
pub fn evaluate_task_mutation(
    actor: &ActorContext,
    action: TaskAction,
    current: Option<&Task>,
    requested: &TaskUpdate,
) -> PolicyDecision {
    let _ = action; // admin-or-assignee applies uniformly to read/update/delete
    let Some(task) = current else {
        return PolicyDecision::NotFound;
    };

    let is_assignee = task.user_id.as_deref().is_some_and(|u| actor.is_user(u));
    if !actor.is_admin() && !is_assignee {
        return PolicyDecision::Deny(DenyReason::NotAuthorized);
    }

    if requested.reassigns(task) && !actor.is_admin() {
        return PolicyDecision::Deny(DenyReason::ReassignRequiresAdmin);
    }

    PolicyDecision::Allow
}

/// Evaluate task creation. Any authenticated actor may create a task; it is
/// self-assigned by the mutation service. Project existence is validated by
/// the service.
#[must_use]
pub fn evaluate_task_create(actor: &ActorContext) -> PolicyDecision {
    if actor.user_id.is_none() {
        return PolicyDecision::Deny(DenyReason::NotAuthenticated);
    }
    PolicyDecision::Allow
}
