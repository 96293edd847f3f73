//! Membership service: adding and removing group members, member listings
//! and reverse lookups from a member to its groups.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use grove_core::error::{GroveError, GroveResult};
use grove_core::models::auth::AuthUser;
use grove_core::models::group::Group;
use grove_core::models::membership::{
    AddMember, BulkMemberStatus, BulkMembershipResult, BulkStatus, GroupMember, MemberAdded,
    MemberRef, MemberRemoved, Membership, MembershipType,
};
use grove_core::repository::{
    GroupRepository, MembershipRepository, PaginatedResult, Pagination, Store, UserRepository,
};
use grove_core::unit_of_work::UnitOfWork;
use tracing::{info, warn};
use uuid::Uuid;

use crate::access::{self, NOT_ALLOWED};
use crate::config::{EventTopics, ServiceConfig};
use crate::events::{EventPublisher, emit};
use crate::hierarchy::{self, Direction, HierarchyEngine};

/// Add/remove/list operations on group memberships.
pub struct MembershipService<S: Store, P: EventPublisher> {
    store: Arc<S>,
    publisher: Arc<P>,
    hierarchy: HierarchyEngine<S>,
    topics: EventTopics,
}

impl<S: Store, P: EventPublisher> MembershipService<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: &ServiceConfig) -> Self {
        Self {
            hierarchy: HierarchyEngine::new(Arc::clone(&store), config.max_depth),
            store,
            publisher,
            topics: config.topics.clone(),
        }
    }

    /// Adds a user or a group to `group_id`.
    pub async fn add_member(
        &self,
        actor: &AuthUser,
        group_id: Uuid,
        input: AddMember,
    ) -> GroveResult<MemberAdded> {
        let Some(member_id) = input.member_id.clone().or_else(|| input.universal_uid.clone()) else {
            return Err(GroveError::bad_request(
                "memberId and universalUID should provide one at least",
            ));
        };
        let Some(membership_type) = input.membership_type else {
            return Err(GroveError::bad_request("membershipType should not be null"));
        };

        let store = self.store.as_ref();
        let group = access::visible_group_by_id(store, group_id, actor.is_admin).await?;

        let self_register = group.self_register
            && membership_type == MembershipType::User
            && actor.is(&member_id);
        if !self_register && !access::can_manage_members(store, group_id, actor).await? {
            return Err(GroveError::forbidden(NOT_ALLOWED));
        }

        let mut work = UnitOfWork::new();
        let mut member_old_id = None;
        let member = match membership_type {
            MembershipType::Group => {
                let child_id = Uuid::parse_str(&member_id)
                    .map_err(|_| GroveError::not_found("group", &member_id))?;
                hierarchy::ensure_not_self(group_id, child_id)?;
                let child = access::visible_group_by_id(store, child_id, actor.is_admin).await?;
                hierarchy::ensure_privacy_inherited(&group, child.private_group)?;
                member_old_id = child.old_id;
                MemberRef::Group(child_id)
            }
            MembershipType::User => {
                access::ensure_user(store, &member_id, actor, &mut work).await?;
                MemberRef::User(member_id.clone())
            }
        };

        if store.memberships().find(group_id, &member.id()).await?.is_some() {
            return Err(GroveError::conflict("The member is already in the group"));
        }

        let membership = Membership::new(group_id, member, actor.actor_id());
        work.insert_membership(membership.clone());
        store.commit(work).await?;

        info!(%group_id, member = %membership.member, "Added group member");

        let added = MemberAdded {
            membership,
            old_id: group.old_id,
            name: group.name,
            universal_uid: input.universal_uid,
            member_old_id,
        };
        emit(self.publisher.as_ref(), &self.topics.member_add, &added).await?;
        Ok(added)
    }

    /// Adds every member independently; one failure never stops the rest.
    pub async fn add_members_bulk(
        &self,
        actor: &AuthUser,
        group_id: Uuid,
        members: Vec<AddMember>,
    ) -> BulkMembershipResult {
        let outcomes = join_all(
            members
                .iter()
                .map(|member| self.add_member(actor, group_id, member.clone())),
        )
        .await;

        let statuses = members
            .iter()
            .zip(outcomes)
            .map(|(member, outcome)| {
                let member_id = member
                    .member_id
                    .clone()
                    .or_else(|| member.universal_uid.clone())
                    .unwrap_or_default();
                bulk_status(group_id, member_id, outcome.map(|_| ()))
            })
            .collect();

        BulkMembershipResult {
            group_id,
            members: statuses,
        }
    }

    /// Removes `member_id` from `group_id`, together with the sub-group edge
    /// when the member is a group.
    pub async fn delete_member(
        &self,
        actor: &AuthUser,
        group_id: Uuid,
        member_id: &str,
        universal_uid: Option<String>,
    ) -> GroveResult<MemberRemoved> {
        let store = self.store.as_ref();
        let group = access::visible_group_by_id(store, group_id, actor.is_admin).await?;

        let self_register = group.self_register && actor.is(member_id);
        if !self_register && !access::can_manage_members(store, group_id, actor).await? {
            return Err(GroveError::forbidden(NOT_ALLOWED));
        }

        let member_old_id = match Uuid::parse_str(member_id) {
            Ok(id) => match store.groups().get_by_id(id).await {
                Ok(member_group) => member_group.old_id,
                Err(GroveError::NotFound { .. }) => None,
                Err(e) => return Err(e),
            },
            Err(_) => None,
        };

        if store.memberships().find(group_id, member_id).await?.is_none() {
            return Err(GroveError::not_found("group membership", member_id));
        }

        let mut work = UnitOfWork::new();
        work.delete_membership(group_id, member_id);
        store.commit(work).await?;

        info!(%group_id, member_id, "Removed group member");

        let removed = MemberRemoved {
            group_id,
            name: group.name,
            old_id: group.old_id,
            member_id: member_id.to_string(),
            universal_uid,
            member_old_id,
        };
        emit(self.publisher.as_ref(), &self.topics.member_delete, &removed).await?;
        Ok(removed)
    }

    pub async fn delete_members_bulk(
        &self,
        actor: &AuthUser,
        group_id: Uuid,
        member_ids: Vec<String>,
    ) -> BulkMembershipResult {
        let outcomes = join_all(
            member_ids
                .iter()
                .map(|member_id| self.delete_member(actor, group_id, member_id, None)),
        )
        .await;

        let statuses = member_ids
            .into_iter()
            .zip(outcomes)
            .map(|(member_id, outcome)| bulk_status(group_id, member_id, outcome.map(|_| ())))
            .collect();

        BulkMembershipResult {
            group_id,
            members: statuses,
        }
    }

    /// Paginated members of a group.
    pub async fn get_group_members(
        &self,
        actor: &AuthUser,
        group_id: Uuid,
        pagination: Pagination,
    ) -> GroveResult<PaginatedResult<GroupMember>> {
        let store = self.store.as_ref();
        let group = self.readable_group(actor, group_id).await?;

        let page = store.memberships().list_by_group(group_id, pagination).await?;
        let user_ids: Vec<Uuid> = page
            .data
            .iter()
            .filter_map(|m| match &m.member {
                MemberRef::User(id) => Uuid::parse_str(id).ok(),
                MemberRef::Group(_) => None,
            })
            .collect();
        let users = store.users().get_many(&user_ids).await?;

        Ok(page.map(|membership| {
            let universal_uid = universal_uid_of(&membership.member, |id| {
                users
                    .iter()
                    .find(|u| u.id == id)
                    .map(|u| u.universal_uid.clone())
            });
            group_member(membership, &group, universal_uid)
        }))
    }

    /// One member of a group.
    pub async fn get_group_member(
        &self,
        actor: &AuthUser,
        group_id: Uuid,
        member_id: &str,
    ) -> GroveResult<GroupMember> {
        let store = self.store.as_ref();
        let group = self.readable_group(actor, group_id).await?;

        let membership = store
            .memberships()
            .find(group_id, member_id)
            .await?
            .ok_or_else(|| GroveError::missing("The member is not in the group"))?;

        let user = match Uuid::parse_str(member_id) {
            Ok(id) => store.users().find_by_id(id).await?,
            Err(_) => None,
        };
        let universal_uid =
            universal_uid_of(&membership.member, |_| user.as_ref().map(|u| u.universal_uid.clone()));
        Ok(group_member(membership, &group, universal_uid))
    }

    /// Groups `member_id` belongs to, directly or through ancestors, limited
    /// to active groups carrying a legacy id. Returns store ids when
    /// `return_uuid`, legacy ids otherwise.
    pub async fn list_member_groups(
        &self,
        member_id: &str,
        return_uuid: bool,
    ) -> GroveResult<Vec<String>> {
        let store = self.store.as_ref();

        let direct_ids: Vec<Uuid> = store
            .memberships()
            .list_by_member(member_id)
            .await?
            .into_iter()
            .map(|m| m.group_id)
            .collect();
        let direct: Vec<Uuid> = store
            .groups()
            .get_many(&direct_ids)
            .await?
            .into_iter()
            .filter(Group::is_tracked)
            .map(|g| g.id)
            .collect();

        let levels = self.hierarchy.max_depth().saturating_sub(1);
        let ancestors = self.hierarchy.walk(&direct, levels, Direction::Up).await?;

        let mut ids = direct;
        ids.extend(ancestors);
        let groups = store.groups().get_many(&ids).await?;

        let result: BTreeSet<String> = groups
            .into_iter()
            .filter(Group::is_tracked)
            .filter_map(|g| {
                if return_uuid {
                    Some(g.id.to_string())
                } else {
                    g.old_id
                }
            })
            .collect();
        Ok(result.into_iter().collect())
    }

    /// Whether `group_id` is one of the legacy ids `member_id` belongs to.
    pub async fn group_validity_check(&self, member_id: &str, group_id: &str) -> GroveResult<bool> {
        let groups = self.list_member_groups(member_id, false).await?;
        Ok(groups.iter().any(|id| id == group_id))
    }

    async fn readable_group(&self, actor: &AuthUser, group_id: Uuid) -> GroveResult<Group> {
        let store = self.store.as_ref();
        let group = access::visible_group_by_id(store, group_id, actor.is_admin).await?;
        if group.private_group && !actor.is_admin {
            access::ensure_member(store, group_id, actor).await?;
        }
        Ok(group)
    }
}

fn bulk_status(group_id: Uuid, member_id: String, outcome: GroveResult<()>) -> BulkMemberStatus {
    match outcome {
        Ok(()) => BulkMemberStatus {
            member_id,
            status: BulkStatus::Success,
            message: None,
        },
        Err(e) => {
            warn!(%group_id, %member_id, kind = e.kind(), error = %e, "Bulk membership item failed");
            BulkMemberStatus {
                member_id,
                status: BulkStatus::Failed,
                message: Some(e.message()),
            }
        }
    }
}

/// Universal UID of a user member: read from the user record for store
/// ids, the identifier itself otherwise.
fn universal_uid_of(member: &MemberRef, lookup: impl Fn(Uuid) -> Option<String>) -> Option<String> {
    match member {
        MemberRef::User(identifier) => match Uuid::parse_str(identifier) {
            Ok(id) => lookup(id),
            Err(_) => Some(identifier.clone()),
        },
        MemberRef::Group(_) => None,
    }
}

fn group_member(membership: Membership, group: &Group, universal_uid: Option<String>) -> GroupMember {
    GroupMember {
        id: membership.id,
        group_id: membership.group_id,
        group_name: group.name.clone(),
        member: membership.member,
        universal_uid,
        created_at: membership.created_at,
        created_by: membership.created_by,
    }
}
