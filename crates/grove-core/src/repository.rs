//! Repository trait definitions for data access abstraction.
//!
//! Repositories are read-only. Every write goes through
//! [`Store::commit`] as a [`UnitOfWork`], so that multi-step mutations are
//! applied all-or-nothing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GroveResult;
use crate::models::group::{Group, GroupKey, GroupStatus};
use crate::models::membership::{Membership, MembershipType};
use crate::models::user::User;
use crate::unit_of_work::UnitOfWork;

/// Page-based pagination for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// 1-based page number.
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1) * self.per_page
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

/// A page of results plus the total number of matching rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}

impl<T> PaginatedResult<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total: u64) -> Self {
        Self {
            data,
            page: pagination.page,
            per_page: pagination.per_page,
            total,
        }
    }

    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.per_page.max(1))
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            data: self.data.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

/// Group search filter. `None` fields do not constrain the result.
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    /// Restrict to these group ids.
    pub ids: Option<Vec<Uuid>>,
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    pub old_id: Option<String>,
    /// Case-insensitive equality.
    pub sso_id: Option<String>,
    /// Case-insensitive equality.
    pub organization_id: Option<String>,
    pub self_register: Option<bool>,
    pub private_group: Option<bool>,
    pub status: Option<GroupStatus>,
}

/// A `group`-type membership seen as a parent→child edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupEdge {
    pub parent: Uuid,
    pub child: Uuid,
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

pub trait GroupRepository: Send + Sync {
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = GroveResult<Group>> + Send;
    fn get_by_old_id(&self, old_id: &str) -> impl Future<Output = GroveResult<Group>> + Send;

    fn get(&self, key: &GroupKey) -> impl Future<Output = GroveResult<Group>> + Send {
        async move {
            match key {
                GroupKey::Id(id) => self.get_by_id(*id).await,
                GroupKey::OldId(old_id) => self.get_by_old_id(old_id).await,
            }
        }
    }

    /// Case-insensitive exact name lookup.
    fn find_by_name(&self, name: &str) -> impl Future<Output = GroveResult<Option<Group>>> + Send;
    /// Fetches the listed groups; missing ids are skipped.
    fn get_many(&self, ids: &[Uuid]) -> impl Future<Output = GroveResult<Vec<Group>>> + Send;
    /// Paginated search ordered by legacy id, descending.
    fn search(
        &self,
        filter: &GroupFilter,
        pagination: Pagination,
    ) -> impl Future<Output = GroveResult<PaginatedResult<Group>>> + Send;
    /// Direct sub-groups, read through the mirrored sub-group relation.
    fn sub_groups(&self, id: Uuid) -> impl Future<Output = GroveResult<Vec<Group>>> + Send;
    /// Direct parent groups, read through the mirrored sub-group relation.
    fn parent_groups(&self, id: Uuid) -> impl Future<Output = GroveResult<Vec<Group>>> + Send;
    /// Ids of active groups carrying a legacy id, optionally restricted to
    /// one organization.
    fn tracked_ids(
        &self,
        organization_id: Option<&str>,
    ) -> impl Future<Output = GroveResult<Vec<Uuid>>> + Send;
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn find_by_id(&self, id: Uuid) -> impl Future<Output = GroveResult<Option<User>>> + Send;
    /// First user carrying the universal UID, if any.
    fn find_by_universal_uid(
        &self,
        universal_uid: &str,
    ) -> impl Future<Output = GroveResult<Option<User>>> + Send;
    fn get_many(&self, ids: &[Uuid]) -> impl Future<Output = GroveResult<Vec<User>>> + Send;
    fn ids_by_universal_uid(
        &self,
        universal_uid: &str,
    ) -> impl Future<Output = GroveResult<Vec<Uuid>>> + Send;
}

// ---------------------------------------------------------------------------
// Memberships
// ---------------------------------------------------------------------------

pub trait MembershipRepository: Send + Sync {
    fn find(
        &self,
        group_id: Uuid,
        member_id: &str,
    ) -> impl Future<Output = GroveResult<Option<Membership>>> + Send;
    /// Finds the membership of `member_id` in `group_id` restricted to one
    /// membership type.
    fn find_typed(
        &self,
        group_id: Uuid,
        member_id: &str,
        membership_type: MembershipType,
    ) -> impl Future<Output = GroveResult<Option<Membership>>> + Send {
        async move {
            Ok(self
                .find(group_id, member_id)
                .await?
                .filter(|m| m.member.membership_type() == membership_type))
        }
    }
    fn list_by_group(
        &self,
        group_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = GroveResult<PaginatedResult<Membership>>> + Send;
    fn count_by_group(&self, group_id: Uuid) -> impl Future<Output = GroveResult<u64>> + Send;
    fn list_by_member(
        &self,
        member_id: &str,
    ) -> impl Future<Output = GroveResult<Vec<Membership>>> + Send;
    /// User memberships of `member_id` that carry roles, ordered by group id
    /// descending.
    fn list_with_roles(
        &self,
        member_id: &str,
        pagination: Pagination,
    ) -> impl Future<Output = GroveResult<PaginatedResult<Membership>>> + Send;
    /// Ids of groups where any of `member_ids` is a member of the given type.
    fn group_ids_for_members(
        &self,
        member_ids: &[String],
        membership_type: MembershipType,
    ) -> impl Future<Output = GroveResult<Vec<Uuid>>> + Send;
    /// `group`-type edges whose parent is one of `parents`.
    fn child_edges(
        &self,
        parents: &[Uuid],
    ) -> impl Future<Output = GroveResult<Vec<GroupEdge>>> + Send;
    /// `group`-type edges whose child is one of `children`.
    fn parent_edges(
        &self,
        children: &[Uuid],
    ) -> impl Future<Output = GroveResult<Vec<GroupEdge>>> + Send;
    /// Direct member counts of `group_ids`. When `member_ids` is given only
    /// memberships of those members are counted. Groups without counted
    /// members are omitted.
    fn count_by_groups(
        &self,
        group_ids: &[Uuid],
        member_ids: Option<&[String]>,
    ) -> impl Future<Output = GroveResult<Vec<(Uuid, u64)>>> + Send;
    /// Distinct member ids across all memberships of the given type.
    fn distinct_member_ids(
        &self,
        membership_type: MembershipType,
    ) -> impl Future<Output = GroveResult<Vec<String>>> + Send;
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A complete backing store: the three repositories plus atomic writes.
pub trait Store: Send + Sync + 'static {
    type Groups: GroupRepository;
    type Users: UserRepository;
    type Memberships: MembershipRepository;

    fn groups(&self) -> &Self::Groups;
    fn users(&self) -> &Self::Users;
    fn memberships(&self) -> &Self::Memberships;

    /// Applies every operation of `work` atomically. Unique constraint
    /// violations fail the whole unit with a conflict error.
    fn commit(&self, work: UnitOfWork) -> impl Future<Output = GroveResult<()>> + Send;
}
