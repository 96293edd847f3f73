//! Caller identity as resolved by the transport layer.

use serde::{Deserialize, Serialize};

use super::SYSTEM_ACTOR;

/// The authenticated caller of an operation.
///
/// Machine tokens carry no user id; such callers are recorded as
/// [`SYSTEM_ACTOR`] in audit fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub user_id: Option<String>,
    pub is_admin: bool,
}

impl AuthUser {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_admin: false,
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_admin: true,
        }
    }

    /// A machine caller with administrative rights and no user id.
    pub fn machine() -> Self {
        Self {
            user_id: None,
            is_admin: true,
        }
    }

    /// Id written to `createdBy`/`updatedBy`.
    pub fn actor_id(&self) -> String {
        self.user_id.clone().unwrap_or_else(|| SYSTEM_ACTOR.to_string())
    }

    /// Whether the caller is the given member identifier.
    pub fn is(&self, member_id: &str) -> bool {
        self.user_id.as_deref() == Some(member_id)
    }
}
