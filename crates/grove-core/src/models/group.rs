//! Group domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    #[default]
    Active,
    Inactive,
}

impl GroupStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(format!("unknown group status: {other}")),
        }
    }
}

/// A named, organization-scoped container of users and other groups.
///
/// Group names are unique across the whole store, compared
/// case-insensitively. `old_id` is the identifier the group had in the
/// legacy system; several read paths treat its presence as a marker for
/// "real" groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub old_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub organization_id: String,
    pub domain: String,
    pub sso_id: String,
    pub private_group: bool,
    pub self_register: bool,
    pub status: GroupStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// Builds a new group from creation input. Unset string attributes
    /// default to empty strings and the creator is also the first updater.
    pub fn new(input: CreateGroup, created_by: impl Into<String>) -> Self {
        let created_by = created_by.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            old_id: None,
            name: input.name,
            description: input.description,
            organization_id: input.organization_id.unwrap_or_default(),
            domain: input.domain.unwrap_or_default(),
            sso_id: input.sso_id.unwrap_or_default(),
            private_group: input.private_group,
            self_register: input.self_register,
            status: input.status,
            updated_by: Some(created_by.clone()),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces every mutable attribute, keeping id and creation audit.
    pub fn apply_update(&mut self, input: UpdateGroup, updated_by: impl Into<String>) {
        let UpdateGroup { group, old_id } = input;
        self.old_id = normalize_old_id(old_id);
        self.name = group.name;
        self.description = group.description;
        self.organization_id = group.organization_id.unwrap_or_default();
        self.domain = group.domain.unwrap_or_default();
        self.sso_id = group.sso_id.unwrap_or_default();
        self.private_group = group.private_group;
        self.self_register = group.self_register;
        self.status = group.status;
        self.touch(updated_by);
    }

    pub fn touch(&mut self, updated_by: impl Into<String>) {
        self.updated_by = Some(updated_by.into());
        self.updated_at = Utc::now();
    }

    pub fn is_active(&self) -> bool {
        self.status == GroupStatus::Active
    }

    /// Active and carrying a legacy id. Only such groups take part in
    /// member-count aggregation and membership reverse lookups.
    pub fn is_tracked(&self) -> bool {
        self.is_active() && self.old_id.is_some()
    }

    /// Lower-cased name used for uniqueness checks.
    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }
}

/// Canonical form of a group name for case-insensitive comparison.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Normalizes an optional legacy id: empty strings mean "no legacy id".
pub fn normalize_old_id(old_id: Option<String>) -> Option<String> {
    old_id.filter(|id| !id.is_empty())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroup {
    pub name: String,
    pub description: Option<String>,
    pub organization_id: Option<String>,
    pub domain: Option<String>,
    pub sso_id: Option<String>,
    #[serde(default)]
    pub private_group: bool,
    #[serde(default)]
    pub self_register: bool,
    #[serde(default)]
    pub status: GroupStatus,
}

/// Full replacement of a group's mutable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroup {
    #[serde(flatten)]
    pub group: CreateGroup,
    pub old_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchGroup {
    pub old_id: String,
}

/// A group created together with its initial user members.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkCreateGroup {
    #[serde(flatten)]
    pub group: CreateGroup,
    /// User ids or universal UIDs.
    #[serde(default)]
    pub members: Vec<String>,
}

/// Identifies a group either by store id or by legacy id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Id(Uuid),
    OldId(String),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::OldId(old_id) => write!(f, "{old_id}"),
        }
    }
}

/// Group attributes a caller may project in single-group reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupField {
    Id,
    CreatedAt,
    CreatedBy,
    UpdatedAt,
    UpdatedBy,
    Name,
    Description,
    PrivateGroup,
    SelfRegister,
    Domain,
    OrganizationId,
    OldId,
}

impl GroupField {
    pub const ALL: [GroupField; 12] = [
        Self::Id,
        Self::CreatedAt,
        Self::CreatedBy,
        Self::UpdatedAt,
        Self::UpdatedBy,
        Self::Name,
        Self::Description,
        Self::PrivateGroup,
        Self::SelfRegister,
        Self::Domain,
        Self::OrganizationId,
        Self::OldId,
    ];

    /// Serialized key of the field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CreatedAt => "createdAt",
            Self::CreatedBy => "createdBy",
            Self::UpdatedAt => "updatedAt",
            Self::UpdatedBy => "updatedBy",
            Self::Name => "name",
            Self::Description => "description",
            Self::PrivateGroup => "privateGroup",
            Self::SelfRegister => "selfRegister",
            Self::Domain => "domain",
            Self::OrganizationId => "organizationId",
            Self::OldId => "oldId",
        }
    }
}

impl FromStr for GroupField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("unknown group field: {s}"))
    }
}
