//! Group lifecycle: create, bulk create, update, patch and cascading
//! delete.

use std::collections::HashSet;
use std::sync::Arc;

use grove_core::error::{GroveError, GroveResult};
use grove_core::models::auth::AuthUser;
use grove_core::models::group::{
    BulkCreateGroup, CreateGroup, Group, PatchGroup, UpdateGroup, normalize_old_id,
};
use grove_core::models::membership::{MemberRef, Membership};
use grove_core::repository::Store;
use grove_core::unit_of_work::UnitOfWork;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::access;
use crate::challenge::ChallengeChecker;
use crate::config::{EventTopics, ServiceConfig};
use crate::events::{EventPublisher, emit};
use crate::hierarchy::HierarchyEngine;

/// A group created together with its initial members.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupWithMembers {
    #[serde(flatten)]
    pub group: Group,
    pub members: Vec<Membership>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupUpdated<'a> {
    #[serde(flatten)]
    group: &'a Group,
    old_name: &'a str,
}

#[derive(Debug, Serialize)]
struct GroupsDeleted<'a> {
    groups: &'a [Group],
}

pub struct GroupService<S: Store, P: EventPublisher, C: ChallengeChecker> {
    store: Arc<S>,
    publisher: Arc<P>,
    challenges: Arc<C>,
    hierarchy: HierarchyEngine<S>,
    topics: EventTopics,
}

impl<S: Store, P: EventPublisher, C: ChallengeChecker> GroupService<S, P, C> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, challenges: Arc<C>, config: &ServiceConfig) -> Self {
        Self {
            hierarchy: HierarchyEngine::new(Arc::clone(&store), config.max_depth),
            store,
            publisher,
            challenges,
            topics: config.topics.clone(),
        }
    }

    pub async fn create_group(&self, actor: &AuthUser, input: CreateGroup) -> GroveResult<Group> {
        let store = self.store.as_ref();
        access::ensure_name_available(store, &input.name, None).await?;

        let group = Group::new(input, actor.actor_id());
        let mut work = UnitOfWork::new();
        work.insert_group(group.clone());
        store.commit(work).await?;

        info!(group_id = %group.id, name = %group.name, "Created group");
        emit(self.publisher.as_ref(), &self.topics.group_create, &group).await?;
        Ok(group)
    }

    /// Creates a group and user memberships for every listed identifier in
    /// one unit of work. Repeated identifiers are added once.
    pub async fn bulk_create_group(
        &self,
        actor: &AuthUser,
        input: BulkCreateGroup,
    ) -> GroveResult<GroupWithMembers> {
        let store = self.store.as_ref();
        access::ensure_name_available(store, &input.group.name, None).await?;

        let group = Group::new(input.group, actor.actor_id());
        let mut work = UnitOfWork::new();
        work.insert_group(group.clone());

        let mut seen = HashSet::new();
        let mut members = Vec::new();
        for identifier in input.members.iter().filter(|id| seen.insert(id.as_str())) {
            access::ensure_user(store, identifier, actor, &mut work).await?;
            let membership =
                Membership::new(group.id, MemberRef::User(identifier.clone()), actor.actor_id());
            work.insert_membership(membership.clone());
            members.push(membership);
        }
        store.commit(work).await?;

        info!(group_id = %group.id, members = members.len(), "Bulk created group");
        let created = GroupWithMembers { group, members };
        emit(self.publisher.as_ref(), &self.topics.group_bulk_create, &created).await?;
        Ok(created)
    }

    /// Replaces every mutable attribute of the group.
    pub async fn update_group(
        &self,
        actor: &AuthUser,
        group_id: Uuid,
        input: UpdateGroup,
    ) -> GroveResult<Group> {
        let store = self.store.as_ref();
        let mut group = access::visible_group_by_id(store, group_id, actor.is_admin).await?;
        if !input.group.name.is_empty() {
            access::ensure_name_available(store, &input.group.name, Some(group_id)).await?;
        }

        let old_name = group.name.clone();
        group.apply_update(input, actor.actor_id());
        let mut work = UnitOfWork::new();
        work.update_group(group.clone());
        store.commit(work).await?;

        info!(%group_id, "Updated group");
        let updated = GroupUpdated {
            group: &group,
            old_name: &old_name,
        };
        emit(self.publisher.as_ref(), &self.topics.group_update, &updated).await?;
        Ok(group)
    }

    /// Sets the legacy id of the group and nothing else.
    pub async fn patch_group(
        &self,
        actor: &AuthUser,
        group_id: Uuid,
        input: PatchGroup,
    ) -> GroveResult<Group> {
        let store = self.store.as_ref();
        let mut group = access::visible_group_by_id(store, group_id, actor.is_admin).await?;

        group.old_id = normalize_old_id(Some(input.old_id));
        group.touch(actor.actor_id());
        let mut work = UnitOfWork::new();
        work.update_group(group.clone());
        store.commit(work).await?;

        info!(%group_id, old_id = ?group.old_id, "Patched group");
        Ok(group)
    }

    /// Cascade deletes the group unless a challenge references it.
    /// Returns the group as it was before deletion.
    pub async fn delete_group(&self, actor: &AuthUser, group_id: Uuid) -> GroveResult<Group> {
        let group = access::visible_group_by_id(self.store.as_ref(), group_id, actor.is_admin).await?;

        if self.challenges.has_associated_challenges(group_id).await? {
            warn!(%group_id, "Refusing to delete group referenced by challenges");
            return Err(GroveError::NotAcceptable {
                reason: format!("group {group_id} is associated with challenges and can not be deleted"),
            });
        }

        let deleted = self.hierarchy.cascade_delete(group_id).await?;
        emit(
            self.publisher.as_ref(),
            &self.topics.group_delete,
            &GroupsDeleted { groups: &deleted },
        )
        .await?;
        Ok(group)
    }
}
