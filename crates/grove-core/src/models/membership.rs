//! Membership edges between groups and their members.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GroveError, GroveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    User,
    Group,
}

impl MembershipType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
        }
    }
}

impl FromStr for MembershipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            other => Err(format!("unknown membership type: {other}")),
        }
    }
}

/// The target of a membership edge.
///
/// User members keep the identifier they were added with (a store id or a
/// legacy universal UID); group members always reference a group id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    tag = "membershipType",
    content = "memberId",
    rename_all = "lowercase"
)]
pub enum MemberRef {
    User(String),
    Group(Uuid),
}

impl MemberRef {
    pub fn membership_type(&self) -> MembershipType {
        match self {
            Self::User(_) => MembershipType::User,
            Self::Group(_) => MembershipType::Group,
        }
    }

    /// The member id as stored.
    pub fn id(&self) -> String {
        match self {
            Self::User(id) => id.clone(),
            Self::Group(id) => id.to_string(),
        }
    }

    pub fn as_group(&self) -> Option<Uuid> {
        match self {
            Self::Group(id) => Some(*id),
            Self::User(_) => None,
        }
    }

    /// Rebuilds a member reference from its stored columns.
    pub fn from_parts(membership_type: MembershipType, member_id: &str) -> Result<Self, String> {
        match membership_type {
            MembershipType::User => Ok(Self::User(member_id.to_string())),
            MembershipType::Group => Uuid::parse_str(member_id)
                .map(Self::Group)
                .map_err(|e| format!("invalid group member id {member_id}: {e}")),
        }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.membership_type().as_str(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupRole {
    #[serde(rename = "groupManager")]
    GroupManager,
    #[serde(rename = "groupAdmin")]
    GroupAdmin,
}

impl GroupRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GroupManager => "groupManager",
            Self::GroupAdmin => "groupAdmin",
        }
    }
}

impl FromStr for GroupRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "groupManager" => Ok(Self::GroupManager),
            "groupAdmin" => Ok(Self::GroupAdmin),
            other => Err(format!("unknown group role: {other}")),
        }
    }
}

/// One role held by a user member, with its audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGrant {
    pub role: GroupRole,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A directed edge from a group to one of its members.
///
/// `roles` is `None` rather than an empty list once the last role is
/// removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: Uuid,
    pub group_id: Uuid,
    #[serde(flatten)]
    pub member: MemberRef,
    pub roles: Option<Vec<RoleGrant>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(group_id: Uuid, member: MemberRef, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            group_id,
            member,
            roles: None,
            created_by,
            created_at: now,
            updated_by: None,
            updated_at: now,
        }
    }

    pub fn has_role(&self, role: GroupRole) -> bool {
        self.roles
            .as_deref()
            .is_some_and(|roles| roles.iter().any(|grant| grant.role == role))
    }

    pub fn has_any_role(&self, roles: &[GroupRole]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    /// Appends `grant` unless the role is already held.
    pub fn grant(&mut self, grant: RoleGrant) -> GroveResult<()> {
        if self.has_role(grant.role) {
            return Err(GroveError::conflict(format!(
                "The group role: {} of the member: {} is already in the group: {}",
                grant.role.as_str(),
                self.member.id(),
                self.group_id
            )));
        }
        self.roles.get_or_insert_with(Vec::new).push(grant);
        Ok(())
    }

    /// Removes `role`; the list becomes `None` once empty.
    pub fn revoke(&mut self, role: GroupRole) -> GroveResult<()> {
        if !self.has_role(role) {
            return Err(GroveError::bad_request(format!(
                "Not found Group Role: {} of Member: {} in the Group {}",
                role.as_str(),
                self.member.id(),
                self.group_id
            )));
        }
        if let Some(roles) = self.roles.as_mut() {
            roles.retain(|grant| grant.role != role);
        }
        self.roles = self.roles.take().filter(|r| !r.is_empty());
        Ok(())
    }
}

/// Request to add one member to a group. At least one of `member_id` and
/// `universal_uid` must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMember {
    pub member_id: Option<String>,
    #[serde(rename = "universalUID")]
    pub universal_uid: Option<String>,
    pub membership_type: Option<MembershipType>,
}

impl AddMember {
    pub fn user(member_id: impl Into<String>) -> Self {
        Self {
            member_id: Some(member_id.into()),
            universal_uid: None,
            membership_type: Some(MembershipType::User),
        }
    }

    pub fn group(group_id: Uuid) -> Self {
        Self {
            member_id: Some(group_id.to_string()),
            universal_uid: None,
            membership_type: Some(MembershipType::Group),
        }
    }
}

/// Result of a successful add, enriched with denormalized group data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberAdded {
    #[serde(flatten)]
    pub membership: Membership,
    pub old_id: Option<String>,
    pub name: String,
    #[serde(rename = "universalUID")]
    pub universal_uid: Option<String>,
    pub member_old_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRemoved {
    pub group_id: Uuid,
    pub name: String,
    pub old_id: Option<String>,
    pub member_id: String,
    #[serde(rename = "universalUID")]
    pub universal_uid: Option<String>,
    pub member_old_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkStatus {
    Success,
    Failed,
}

/// Outcome of one item in a bulk membership operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkMemberStatus {
    pub member_id: String,
    pub status: BulkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkMembershipResult {
    pub group_id: Uuid,
    pub members: Vec<BulkMemberStatus>,
}

impl BulkMembershipResult {
    pub fn succeeded(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.status == BulkStatus::Success)
            .count()
    }
}

/// A membership as listed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: Uuid,
    pub group_id: Uuid,
    pub group_name: String,
    #[serde(flatten)]
    pub member: MemberRef,
    #[serde(rename = "universalUID")]
    pub universal_uid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    pub id: Uuid,
    pub user_id: String,
    pub group_id: Uuid,
    pub role: GroupRole,
}

/// One role of a user, flattened across memberships.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserGroupRole {
    pub group_id: Uuid,
    pub role: GroupRole,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
