//! In-memory implementation of the grove storage traits.
//!
//! Deterministic and test-friendly. A unit of work is applied to a copy of
//! the state under the write lock and swapped in only when every operation
//! succeeded, which gives the same all-or-nothing behaviour as the
//! SurrealDB transaction path.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard};

use grove_core::error::{GroveError, GroveResult};
use grove_core::models::group::{Group, name_key};
use grove_core::models::membership::{MemberRef, Membership, MembershipType};
use grove_core::models::user::User;
use grove_core::repository::{
    GroupEdge, GroupFilter, GroupRepository, MembershipRepository, PaginatedResult, Pagination,
    Store, UserRepository,
};
use grove_core::unit_of_work::{UnitOfWork, WriteOp};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct State {
    groups: HashMap<Uuid, Group>,
    users: HashMap<Uuid, User>,
    /// Insertion ordered.
    memberships: Vec<Membership>,
    /// Mirror of group-type memberships as (parent, child).
    sub_groups: BTreeSet<(Uuid, Uuid)>,
}

impl State {
    fn apply(&mut self, op: WriteOp) -> GroveResult<()> {
        match op {
            WriteOp::InsertGroup(group) => {
                if self.groups.contains_key(&group.id) {
                    return Err(GroveError::conflict(format!("group {} already exists", group.id)));
                }
                self.ensure_name_free(&group)?;
                self.groups.insert(group.id, group);
            }
            WriteOp::UpdateGroup(group) => {
                if !self.groups.contains_key(&group.id) {
                    return Err(GroveError::not_found("group", group.id));
                }
                self.ensure_name_free(&group)?;
                self.groups.insert(group.id, group);
            }
            WriteOp::InsertUser(user) => {
                if self.users.contains_key(&user.id) {
                    return Err(GroveError::conflict(format!("user {} already exists", user.id)));
                }
                self.users.insert(user.id, user);
            }
            WriteOp::InsertMembership(membership) => {
                self.ensure_group(membership.group_id)?;
                if let MemberRef::Group(child) = membership.member {
                    self.ensure_group(child)?;
                }
                let member_id = membership.member.id();
                if self
                    .memberships
                    .iter()
                    .any(|m| m.group_id == membership.group_id && m.member.id() == member_id)
                {
                    return Err(GroveError::conflict("The member is already in the group"));
                }
                if let MemberRef::Group(child) = membership.member {
                    self.sub_groups.insert((membership.group_id, child));
                }
                self.memberships.push(membership);
            }
            WriteOp::DeleteMembership {
                group_id,
                member_id,
            } => {
                self.memberships
                    .retain(|m| !(m.group_id == group_id && m.member.id() == member_id));
                if let Ok(child) = Uuid::parse_str(&member_id) {
                    self.sub_groups.remove(&(group_id, child));
                }
            }
            WriteOp::GrantRole {
                membership_id,
                grant,
                updated_by,
                updated_at,
            } => {
                let membership = self.membership_mut(membership_id)?;
                membership.grant(grant)?;
                membership.updated_by = Some(updated_by);
                membership.updated_at = updated_at;
            }
            WriteOp::RevokeRole {
                membership_id,
                role,
                updated_by,
                updated_at,
            } => {
                let membership = self.membership_mut(membership_id)?;
                membership.revoke(role)?;
                membership.updated_by = Some(updated_by);
                membership.updated_at = updated_at;
            }
            WriteOp::DeleteGroups {
                ids,
                exclusive,
                scope,
            } => {
                let scope: HashSet<Uuid> = scope.into_iter().collect();
                if let Some((parent, child)) = self
                    .sub_groups
                    .iter()
                    .find(|(parent, child)| exclusive.contains(child) && !scope.contains(parent))
                {
                    return Err(GroveError::conflict(format!(
                        "The group {child} gained the parent {parent} during deletion"
                    )));
                }

                let ids: HashSet<Uuid> = ids.into_iter().collect();
                let id_strings: HashSet<String> = ids.iter().map(Uuid::to_string).collect();
                self.memberships.retain(|m| {
                    !ids.contains(&m.group_id) && !id_strings.contains(&m.member.id())
                });
                self.sub_groups
                    .retain(|(parent, child)| !ids.contains(parent) && !ids.contains(child));
                self.groups.retain(|id, _| !ids.contains(id));
            }
        }
        Ok(())
    }

    fn ensure_group(&self, id: Uuid) -> GroveResult<()> {
        if self.groups.contains_key(&id) {
            Ok(())
        } else {
            Err(GroveError::not_found("group", id))
        }
    }

    fn membership_mut(&mut self, id: Uuid) -> GroveResult<&mut Membership> {
        self.memberships
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| GroveError::not_found("group_membership", id))
    }

    fn ensure_name_free(&self, group: &Group) -> GroveResult<()> {
        let key = group.name_key();
        if self
            .groups
            .values()
            .any(|g| g.id != group.id && g.name_key() == key)
        {
            return Err(GroveError::conflict(format!(
                "The group name \"{}\" is already used",
                group.name
            )));
        }
        Ok(())
    }
}

type Shared = Arc<RwLock<State>>;

fn read(state: &Shared) -> GroveResult<RwLockReadGuard<'_, State>> {
    state
        .read()
        .map_err(|_| GroveError::Internal("in-memory store lock poisoned".into()))
}

fn page<T: Clone>(items: Vec<T>, pagination: Pagination) -> PaginatedResult<T> {
    let total = items.len() as u64;
    let data = items
        .into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.limit() as usize)
        .collect();
    PaginatedResult::new(data, pagination, total)
}

fn matches(group: &Group, filter: &GroupFilter) -> bool {
    let eq_ignore_case = |value: &str, expected: &Option<String>| {
        expected
            .as_ref()
            .is_none_or(|e| value.to_lowercase() == e.to_lowercase())
    };

    filter.ids.as_ref().is_none_or(|ids| ids.contains(&group.id))
        && filter
            .name
            .as_ref()
            .is_none_or(|n| group.name_key().contains(&name_key(n)))
        && filter
            .old_id
            .as_ref()
            .is_none_or(|o| group.old_id.as_ref() == Some(o))
        && eq_ignore_case(&group.sso_id, &filter.sso_id)
        && eq_ignore_case(&group.organization_id, &filter.organization_id)
        && filter.self_register.is_none_or(|s| group.self_register == s)
        && filter.private_group.is_none_or(|p| group.private_group == p)
        && filter.status.is_none_or(|s| group.status == s)
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MemoryGroupRepository {
    state: Shared,
}

impl GroupRepository for MemoryGroupRepository {
    async fn get_by_id(&self, id: Uuid) -> GroveResult<Group> {
        read(&self.state)?
            .groups
            .get(&id)
            .cloned()
            .ok_or_else(|| GroveError::not_found("group", id))
    }

    async fn get_by_old_id(&self, old_id: &str) -> GroveResult<Group> {
        read(&self.state)?
            .groups
            .values()
            .find(|g| g.old_id.as_deref() == Some(old_id))
            .cloned()
            .ok_or_else(|| GroveError::not_found("group", old_id))
    }

    async fn find_by_name(&self, name: &str) -> GroveResult<Option<Group>> {
        let key = name_key(name);
        Ok(read(&self.state)?
            .groups
            .values()
            .find(|g| g.name_key() == key)
            .cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> GroveResult<Vec<Group>> {
        let state = read(&self.state)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.groups.get(id).cloned())
            .collect())
    }

    async fn search(
        &self,
        filter: &GroupFilter,
        pagination: Pagination,
    ) -> GroveResult<PaginatedResult<Group>> {
        let state = read(&self.state)?;
        let mut groups: Vec<Group> = state
            .groups
            .values()
            .filter(|g| matches(g, filter))
            .cloned()
            .collect();
        groups.sort_by(|a, b| {
            b.old_id
                .cmp(&a.old_id)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(page(groups, pagination))
    }

    async fn sub_groups(&self, id: Uuid) -> GroveResult<Vec<Group>> {
        let state = read(&self.state)?;
        Ok(state
            .sub_groups
            .iter()
            .filter(|(parent, _)| *parent == id)
            .filter_map(|(_, child)| state.groups.get(child).cloned())
            .collect())
    }

    async fn parent_groups(&self, id: Uuid) -> GroveResult<Vec<Group>> {
        let state = read(&self.state)?;
        Ok(state
            .sub_groups
            .iter()
            .filter(|(_, child)| *child == id)
            .filter_map(|(parent, _)| state.groups.get(parent).cloned())
            .collect())
    }

    async fn tracked_ids(&self, organization_id: Option<&str>) -> GroveResult<Vec<Uuid>> {
        let state = read(&self.state)?;
        let mut ids: Vec<Uuid> = state
            .groups
            .values()
            .filter(|g| g.is_tracked())
            .filter(|g| organization_id.is_none_or(|org| g.organization_id == org))
            .map(|g| g.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Clone)]
pub struct MemoryUserRepository {
    state: Shared,
}

impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> GroveResult<Option<User>> {
        Ok(read(&self.state)?.users.get(&id).cloned())
    }

    async fn find_by_universal_uid(&self, universal_uid: &str) -> GroveResult<Option<User>> {
        Ok(read(&self.state)?
            .users
            .values()
            .filter(|u| u.universal_uid == universal_uid)
            .min_by_key(|u| u.created_at)
            .cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> GroveResult<Vec<User>> {
        let state = read(&self.state)?;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn ids_by_universal_uid(&self, universal_uid: &str) -> GroveResult<Vec<Uuid>> {
        Ok(read(&self.state)?
            .users
            .values()
            .filter(|u| u.universal_uid == universal_uid)
            .map(|u| u.id)
            .collect())
    }
}

#[derive(Clone)]
pub struct MemoryMembershipRepository {
    state: Shared,
}

impl MemoryMembershipRepository {
    fn group_edges(&self, keep: impl Fn(&GroupEdge) -> bool) -> GroveResult<Vec<GroupEdge>> {
        Ok(read(&self.state)?
            .memberships
            .iter()
            .filter_map(|m| {
                m.member.as_group().map(|child| GroupEdge {
                    parent: m.group_id,
                    child,
                })
            })
            .filter(|edge| keep(edge))
            .collect())
    }
}

impl MembershipRepository for MemoryMembershipRepository {
    async fn find(&self, group_id: Uuid, member_id: &str) -> GroveResult<Option<Membership>> {
        Ok(read(&self.state)?
            .memberships
            .iter()
            .find(|m| m.group_id == group_id && m.member.id() == member_id)
            .cloned())
    }

    async fn list_by_group(
        &self,
        group_id: Uuid,
        pagination: Pagination,
    ) -> GroveResult<PaginatedResult<Membership>> {
        let members: Vec<Membership> = read(&self.state)?
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        Ok(page(members, pagination))
    }

    async fn count_by_group(&self, group_id: Uuid) -> GroveResult<u64> {
        Ok(read(&self.state)?
            .memberships
            .iter()
            .filter(|m| m.group_id == group_id)
            .count() as u64)
    }

    async fn list_by_member(&self, member_id: &str) -> GroveResult<Vec<Membership>> {
        Ok(read(&self.state)?
            .memberships
            .iter()
            .filter(|m| m.member.id() == member_id)
            .cloned()
            .collect())
    }

    async fn list_with_roles(
        &self,
        member_id: &str,
        pagination: Pagination,
    ) -> GroveResult<PaginatedResult<Membership>> {
        let mut memberships: Vec<Membership> = read(&self.state)?
            .memberships
            .iter()
            .filter(|m| m.member == MemberRef::User(member_id.to_string()) && m.roles.is_some())
            .cloned()
            .collect();
        memberships.sort_by(|a, b| b.group_id.to_string().cmp(&a.group_id.to_string()));
        Ok(page(memberships, pagination))
    }

    async fn group_ids_for_members(
        &self,
        member_ids: &[String],
        membership_type: MembershipType,
    ) -> GroveResult<Vec<Uuid>> {
        let state = read(&self.state)?;
        let mut seen = HashSet::new();
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.member.membership_type() == membership_type)
            .filter(|m| member_ids.contains(&m.member.id()))
            .map(|m| m.group_id)
            .filter(|id| seen.insert(*id))
            .collect())
    }

    async fn child_edges(&self, parents: &[Uuid]) -> GroveResult<Vec<GroupEdge>> {
        self.group_edges(|edge| parents.contains(&edge.parent))
    }

    async fn parent_edges(&self, children: &[Uuid]) -> GroveResult<Vec<GroupEdge>> {
        self.group_edges(|edge| children.contains(&edge.child))
    }

    async fn count_by_groups(
        &self,
        group_ids: &[Uuid],
        member_ids: Option<&[String]>,
    ) -> GroveResult<Vec<(Uuid, u64)>> {
        let state = read(&self.state)?;
        let mut counts: Vec<(Uuid, u64)> = Vec::new();
        for membership in &state.memberships {
            if !group_ids.contains(&membership.group_id) {
                continue;
            }
            if member_ids.is_some_and(|ids| !ids.contains(&membership.member.id())) {
                continue;
            }
            match counts.iter_mut().find(|(id, _)| *id == membership.group_id) {
                Some((_, total)) => *total += 1,
                None => counts.push((membership.group_id, 1)),
            }
        }
        Ok(counts)
    }

    async fn distinct_member_ids(&self, membership_type: MembershipType) -> GroveResult<Vec<String>> {
        let distinct: BTreeSet<String> = read(&self.state)?
            .memberships
            .iter()
            .filter(|m| m.member.membership_type() == membership_type)
            .map(|m| m.member.id())
            .collect();
        Ok(distinct.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory grove store.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Shared,
    groups: MemoryGroupRepository,
    users: MemoryUserRepository,
    memberships: MemoryMembershipRepository,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        let state = Shared::default();
        Self {
            groups: MemoryGroupRepository {
                state: state.clone(),
            },
            users: MemoryUserRepository {
                state: state.clone(),
            },
            memberships: MemoryMembershipRepository {
                state: state.clone(),
            },
            state,
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of membership rows across all groups.
    pub fn membership_count(&self) -> GroveResult<usize> {
        Ok(read(&self.state)?.memberships.len())
    }

    /// Number of mirrored parent→child sub-group edges.
    pub fn sub_group_edge_count(&self) -> GroveResult<usize> {
        Ok(read(&self.state)?.sub_groups.len())
    }
}

impl Store for InMemoryStore {
    type Groups = MemoryGroupRepository;
    type Users = MemoryUserRepository;
    type Memberships = MemoryMembershipRepository;

    fn groups(&self) -> &Self::Groups {
        &self.groups
    }

    fn users(&self) -> &Self::Users {
        &self.users
    }

    fn memberships(&self) -> &Self::Memberships {
        &self.memberships
    }

    async fn commit(&self, work: UnitOfWork) -> GroveResult<()> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| GroveError::Internal("in-memory store lock poisoned".into()))?;

        let mut next = guard.clone();
        for op in work.into_ops() {
            next.apply(op)?;
        }
        *guard = next;
        Ok(())
    }
}
