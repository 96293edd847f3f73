//! Shared preconditions: group visibility, group roles, membership checks
//! and lazy user creation.

use grove_core::error::{GroveError, GroveResult};
use grove_core::models::SYSTEM_ACTOR;
use grove_core::models::auth::AuthUser;
use grove_core::models::group::{Group, GroupKey, name_key};
use grove_core::models::membership::{GroupRole, MembershipType};
use grove_core::models::user::{User, UserLookup};
use grove_core::repository::{GroupRepository, MembershipRepository, Store, UserRepository};
use grove_core::unit_of_work::UnitOfWork;
use uuid::Uuid;

pub(crate) const NOT_ALLOWED: &str = "You are not allowed to perform this action!";
pub(crate) const NOT_A_MEMBER: &str = "User is not member of the group";

/// Fetches a group visible to the caller: admins see every group, others
/// only active ones. Hidden groups read as not found.
pub(crate) async fn visible_group<S: Store>(
    store: &S,
    key: &GroupKey,
    is_admin: bool,
) -> GroveResult<Group> {
    let group = store.groups().get(key).await?;
    if !is_admin && !group.is_active() {
        return Err(GroveError::not_found("group", key));
    }
    Ok(group)
}

pub(crate) async fn visible_group_by_id<S: Store>(
    store: &S,
    id: Uuid,
    is_admin: bool,
) -> GroveResult<Group> {
    visible_group(store, &GroupKey::Id(id), is_admin).await
}

/// Whether the caller holds one of `roles` on its user membership of
/// `group_id`.
pub(crate) async fn has_group_role<S: Store>(
    store: &S,
    group_id: Uuid,
    actor: &AuthUser,
    roles: &[GroupRole],
) -> GroveResult<bool> {
    let Some(user_id) = actor.user_id.as_deref() else {
        return Ok(false);
    };
    Ok(store
        .memberships()
        .find_typed(group_id, user_id, MembershipType::User)
        .await?
        .is_some_and(|membership| membership.has_any_role(roles)))
}

/// Admin, or a group manager/admin of the group.
pub(crate) async fn can_manage_members<S: Store>(
    store: &S,
    group_id: Uuid,
    actor: &AuthUser,
) -> GroveResult<bool> {
    Ok(actor.is_admin
        || has_group_role(
            store,
            group_id,
            actor,
            &[GroupRole::GroupAdmin, GroupRole::GroupManager],
        )
        .await?)
}

/// Private groups are only readable by their members.
pub(crate) async fn ensure_member<S: Store>(
    store: &S,
    group_id: Uuid,
    actor: &AuthUser,
) -> GroveResult<()> {
    let user_id = actor.user_id.as_deref().unwrap_or_default();
    match store.memberships().find(group_id, user_id).await? {
        Some(_) => Ok(()),
        None => Err(GroveError::forbidden(NOT_A_MEMBER)),
    }
}

/// Rejects the name when another group already uses it.
pub(crate) async fn ensure_name_available<S: Store>(
    store: &S,
    name: &str,
    except: Option<Uuid>,
) -> GroveResult<()> {
    let key = name_key(name);
    match store.groups().find_by_name(&key).await? {
        Some(existing) if Some(existing.id) != except => Err(GroveError::conflict(format!(
            "The group name \"{name}\" is already used"
        ))),
        _ => Ok(()),
    }
}

/// Resolves a user identifier, queueing the creation of a missing user on
/// `work`.
///
/// UUID identifiers resolve by id; a missing one is created with that id
/// and the placeholder universal UID. Anything else resolves by universal
/// UID and a missing user gets a fresh id.
pub(crate) async fn ensure_user<S: Store>(
    store: &S,
    identifier: &str,
    actor: &AuthUser,
    work: &mut UnitOfWork,
) -> GroveResult<User> {
    let existing = match UserLookup::parse(identifier) {
        UserLookup::Id(id) => store.users().find_by_id(id).await?,
        UserLookup::UniversalUid(ref uid) => store.users().find_by_universal_uid(uid).await?,
    };
    if let Some(user) = existing {
        return Ok(user);
    }

    let user = match UserLookup::parse(identifier) {
        UserLookup::Id(id) => User::new(id, SYSTEM_ACTOR, actor.actor_id()),
        UserLookup::UniversalUid(uid) => User::new(Uuid::new_v4(), uid, actor.actor_id()),
    };
    work.insert_user(user.clone());
    Ok(user)
}
