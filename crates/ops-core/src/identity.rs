//! Explicit actor context.
//!
//! Every service operation takes the acting user as an argument; nothing in
//! Opsboard reads the current actor from ambient or thread-local state. The
//! caller (an out-of-scope HTTP layer) resolves the context from its request
//! before invoking a service.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::ActorRole;

/// Sentinel recorded in audit rows when no authenticated actor is available.
pub const ANONYMOUS_ACTOR: &str = "";

/// The acting user for one logical operation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ActorContext {
    /// `None` when the caller could not resolve an authenticated user.
    pub user_id: Option<String>,
    pub role: ActorRole,
}

impl ActorContext {
    #[must_use]
    pub fn authenticated(user_id: impl Into<String>, role: ActorRole) -> Self {
        Self {
            user_id: Some(user_id.into()),
            role,
        }
    }

    /// An unauthenticated context. Mutations under this context are refused by
    /// policy, but audit capture tolerates it via the sentinel actor.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            user_id: None,
            role: ActorRole::Member,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// Whether this actor is the given user.
    #[must_use]
    pub fn is_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }

    /// Actor ID as recorded in audit rows. Falls back to the sentinel rather
    /// than failing: auditing must never block a legitimate mutation.
    #[must_use]
    pub fn audit_user_id(&self) -> String {
        self.user_id
            .clone()
            .unwrap_or_else(|| ANONYMOUS_ACTOR.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_actor_uses_sentinel() {
        let actor = ActorContext::anonymous();
        assert_eq!(actor.audit_user_id(), ANONYMOUS_ACTOR);
        assert!(!actor.is_admin());
        assert!(!actor.is_user("usr-1"));
    }

    #[test]
    fn authenticated_actor_matches_self() {
        let actor = ActorContext::authenticated("usr-1", ActorRole::Member);
        assert!(actor.is_user("usr-1"));
        assert!(!actor.is_user("usr-2"));
        assert_eq!(actor.audit_user_id(), "usr-1");
    }
}
