//! Group roles held by user members.

use std::sync::Arc;

use chrono::Utc;
use grove_core::error::{GroveError, GroveResult};
use grove_core::models::auth::AuthUser;
use grove_core::models::membership::{
    GroupRole, Membership, MembershipType, RoleAssignment, RoleGrant, UserGroupRole,
};
use grove_core::repository::{MembershipRepository, PaginatedResult, Pagination, Store};
use grove_core::unit_of_work::UnitOfWork;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::access;
use crate::config::{EventTopics, ServiceConfig};
use crate::events::{EventPublisher, emit};

/// Role change request for one user in one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChange {
    pub group_id: Uuid,
    pub role: GroupRole,
}

pub struct RoleService<S: Store, P: EventPublisher> {
    store: Arc<S>,
    publisher: Arc<P>,
    topics: EventTopics,
}

impl<S: Store, P: EventPublisher> RoleService<S, P> {
    pub fn new(store: Arc<S>, publisher: Arc<P>, config: &ServiceConfig) -> Self {
        Self {
            store,
            publisher,
            topics: config.topics.clone(),
        }
    }

    /// Grants `change.role` to `user_id` on its membership of
    /// `change.group_id`. The store re-checks the role list at commit.
    pub async fn add_role(
        &self,
        actor: &AuthUser,
        user_id: &str,
        change: RoleChange,
    ) -> GroveResult<RoleAssignment> {
        let mut work = UnitOfWork::new();
        let mut membership = self.user_membership(actor, user_id, &change, &mut work).await?;

        let grant = RoleGrant {
            role: change.role,
            created_by: actor.actor_id(),
            created_at: Utc::now(),
        };
        membership.grant(grant.clone())?;
        work.grant_role(membership.id, grant, actor.actor_id());
        self.store.commit(work).await?;

        info!(user_id, group_id = %change.group_id, role = change.role.as_str(), "Added group role");
        self.announce(&self.topics.member_role_add, membership.id, user_id, change)
            .await
    }

    /// Revokes `change.role`. Removing the last role leaves the membership
    /// without a role list.
    pub async fn delete_role(
        &self,
        actor: &AuthUser,
        user_id: &str,
        change: RoleChange,
    ) -> GroveResult<RoleAssignment> {
        let mut work = UnitOfWork::new();
        let mut membership = self.user_membership(actor, user_id, &change, &mut work).await?;

        membership.revoke(change.role)?;
        work.revoke_role(membership.id, change.role, actor.actor_id());
        self.store.commit(work).await?;

        info!(user_id, group_id = %change.group_id, role = change.role.as_str(), "Deleted group role");
        self.announce(&self.topics.member_role_delete, membership.id, user_id, change)
            .await
    }

    /// Every role of `user_id`, flattened across memberships ordered by
    /// group id descending. Pagination counts memberships, not roles.
    pub async fn get_group_roles(
        &self,
        user_id: &str,
        pagination: Pagination,
    ) -> GroveResult<PaginatedResult<UserGroupRole>> {
        let page = self
            .store
            .memberships()
            .list_with_roles(user_id, pagination)
            .await?;

        let data = page
            .data
            .iter()
            .flat_map(|membership| {
                membership
                    .roles
                    .iter()
                    .flatten()
                    .map(|grant| UserGroupRole {
                        group_id: membership.group_id,
                        role: grant.role,
                        created_by: grant.created_by.clone(),
                        created_at: grant.created_at,
                    })
            })
            .collect();

        Ok(PaginatedResult {
            data,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
        })
    }

    /// Validates the group and returns the user's membership, queueing the
    /// user's creation on `work` if it is not known yet.
    async fn user_membership(
        &self,
        actor: &AuthUser,
        user_id: &str,
        change: &RoleChange,
        work: &mut UnitOfWork,
    ) -> GroveResult<Membership> {
        let store = self.store.as_ref();
        access::visible_group_by_id(store, change.group_id, actor.is_admin).await?;
        access::ensure_user(store, user_id, actor, work).await?;

        store
            .memberships()
            .find_typed(change.group_id, user_id, MembershipType::User)
            .await?
            .ok_or_else(|| {
                GroveError::bad_request(format!(
                    "Not found Relation between member: {user_id} and Group: {}",
                    change.group_id
                ))
            })
    }

    async fn announce(
        &self,
        topic: &str,
        membership_id: Uuid,
        user_id: &str,
        change: RoleChange,
    ) -> GroveResult<RoleAssignment> {
        let assignment = RoleAssignment {
            id: membership_id,
            user_id: user_id.to_string(),
            group_id: change.group_id,
            role: change.role,
        };
        emit(self.publisher.as_ref(), topic, &assignment).await?;
        Ok(assignment)
    }
}
