//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user known to the group store.
///
/// Users are never created explicitly: they appear the first time a
/// membership references them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    #[serde(rename = "universalUID")]
    pub universal_uid: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: Uuid, universal_uid: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            id,
            universal_uid: universal_uid.into(),
            created_by: created_by.into(),
            created_at: Utc::now(),
        }
    }
}

/// How a member identifier resolves to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    /// The identifier is a store id.
    Id(Uuid),
    /// The identifier is a legacy universal UID.
    UniversalUid(String),
}

impl UserLookup {
    /// Ids in the store's UUID format are looked up by id, anything else
    /// is treated as a universal UID.
    pub fn parse(identifier: &str) -> Self {
        match Uuid::parse_str(identifier) {
            Ok(id) => Self::Id(id),
            Err(_) => Self::UniversalUid(identifier.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_identifiers_resolve_by_id() {
        let id = Uuid::new_v4();
        assert_eq!(UserLookup::parse(&id.to_string()), UserLookup::Id(id));
    }

    #[test]
    fn legacy_identifiers_resolve_by_universal_uid() {
        assert_eq!(
            UserLookup::parse("40159127"),
            UserLookup::UniversalUid("40159127".into())
        );
    }
}
