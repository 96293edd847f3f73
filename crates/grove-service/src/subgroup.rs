//! Sub-group creation and removal under an existing parent.

use std::sync::Arc;

use grove_core::error::{GroveError, GroveResult};
use grove_core::models::auth::AuthUser;
use grove_core::models::group::{CreateGroup, Group};
use grove_core::models::membership::{GroupRole, MemberRef, Membership, MembershipType};
use grove_core::repository::{MembershipRepository, Store};
use grove_core::unit_of_work::UnitOfWork;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::access::{self, NOT_ALLOWED};
use crate::config::{EventTopics, ServiceConfig};
use crate::events::{EventPublisher, emit};
use crate::hierarchy::{self, HierarchyEngine};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubGroupCreated<'a> {
    id: Uuid,
    group_id: Uuid,
    sub_group: &'a Group,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubGroupDeleted<'a> {
    group_id: Uuid,
    sub_group: &'a [Group],
}

pub struct SubGroupService<S: Store, P: EventPublisher> {
    store: Arc<S>,
    publisher: Arc<P>,
    hierarchy: HierarchyEngine<S>,
    topics: EventTopics,
}

impl<S: Store, P: EventPublisher> SubGroupService<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: &ServiceConfig) -> Self {
        Self {
            hierarchy: HierarchyEngine::new(Arc::clone(&store), config.max_depth),
            store,
            publisher,
            topics: config.topics.clone(),
        }
    }

    /// Creates a group directly under `parent_id`.
    pub async fn create_sub_group(
        &self,
        actor: &AuthUser,
        parent_id: Uuid,
        input: CreateGroup,
    ) -> GroveResult<Group> {
        let store = self.store.as_ref();
        self.ensure_group_admin(actor, parent_id).await?;
        let parent = access::visible_group_by_id(store, parent_id, actor.is_admin).await?;
        access::ensure_name_available(store, &input.name, None).await?;
        hierarchy::ensure_privacy_inherited(&parent, input.private_group)?;

        let sub_group = Group::new(input, actor.actor_id());
        let membership = Membership::new(parent_id, MemberRef::Group(sub_group.id), actor.actor_id());
        let mut work = UnitOfWork::new();
        work.insert_group(sub_group.clone())
            .insert_membership(membership.clone());
        store.commit(work).await?;

        info!(%parent_id, sub_group_id = %sub_group.id, "Created sub-group");
        let created = SubGroupCreated {
            id: membership.id,
            group_id: parent_id,
            sub_group: &sub_group,
        };
        emit(self.publisher.as_ref(), &self.topics.subgroup_create, &created).await?;
        Ok(sub_group)
    }

    /// Detaches and cascade deletes a direct sub-group. Returns the parent.
    pub async fn delete_sub_group(
        &self,
        actor: &AuthUser,
        parent_id: Uuid,
        sub_group_id: Uuid,
    ) -> GroveResult<Group> {
        let store = self.store.as_ref();
        self.ensure_group_admin(actor, parent_id).await?;
        let parent = access::visible_group_by_id(store, parent_id, actor.is_admin).await?;
        access::visible_group_by_id(store, sub_group_id, actor.is_admin).await?;

        let linked = store
            .memberships()
            .find_typed(parent_id, &sub_group_id.to_string(), MembershipType::Group)
            .await?;
        if linked.is_none() {
            return Err(GroveError::bad_request(format!(
                "The Group: {sub_group_id} is not the child of Group: {parent_id}"
            )));
        }

        let deleted = self.hierarchy.cascade_delete(sub_group_id).await?;

        info!(%parent_id, %sub_group_id, deleted = deleted.len(), "Deleted sub-group");
        let payload = SubGroupDeleted {
            group_id: parent_id,
            sub_group: &deleted,
        };
        emit(self.publisher.as_ref(), &self.topics.subgroup_delete, &payload).await?;
        Ok(parent)
    }

    async fn ensure_group_admin(&self, actor: &AuthUser, group_id: Uuid) -> GroveResult<()> {
        if actor.is_admin
            || access::has_group_role(self.store.as_ref(), group_id, actor, &[GroupRole::GroupAdmin])
                .await?
        {
            Ok(())
        } else {
            Err(GroveError::forbidden(NOT_ALLOWED))
        }
    }
}
