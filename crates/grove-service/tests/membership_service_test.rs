//! Integration tests for adding, removing and listing group members.

mod common;

use common::{Harness, admin, user};
use grove_core::error::GroveError;
use grove_core::models::SYSTEM_ACTOR;
use grove_core::models::auth::AuthUser;
use grove_core::models::group::{CreateGroup, GroupStatus};
use grove_core::models::membership::{AddMember, BulkStatus, GroupRole, MemberRef, MembershipType};
use grove_core::repository::{MembershipRepository, Pagination, Store, UserRepository};
use grove_service::RoleChange;
use uuid::Uuid;

fn private(name: &str) -> CreateGroup {
    CreateGroup {
        name: name.into(),
        private_group: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn added_member_records_the_actor() {
    let h = Harness::new();
    let group = h.group("Audited", Some("7")).await;

    let added = h
        .memberships()
        .add_member(&admin(), group.id, AddMember::user("u-100"))
        .await
        .unwrap();

    assert_eq!(added.membership.created_by, "admin-1");
    assert_eq!(added.membership.member, MemberRef::User("u-100".into()));
    assert_eq!(added.name, "Audited");
    assert_eq!(added.old_id.as_deref(), Some("7"));

    let payload = h.publisher.last(&h.config.topics.member_add).unwrap();
    assert_eq!(payload["memberId"], "u-100");
    assert_eq!(payload["membershipType"], "user");
}

#[tokio::test]
async fn re_adding_a_member_conflicts() {
    let h = Harness::new();
    let group = h.group("Twice", None).await;
    let service = h.memberships();

    service
        .add_member(&admin(), group.id, AddMember::user("u-1"))
        .await
        .unwrap();
    let again = service
        .add_member(&admin(), group.id, AddMember::user("u-1"))
        .await;

    assert!(matches!(again, Err(GroveError::Conflict { .. })));
    assert_eq!(h.store.membership_count().unwrap(), 1);
}

#[tokio::test]
async fn machine_actor_is_recorded_as_sentinel() {
    let h = Harness::new();
    let group = h.group("Machine", None).await;

    let added = h
        .memberships()
        .add_member(&AuthUser::machine(), group.id, AddMember::user("u-2"))
        .await
        .unwrap();
    assert_eq!(added.membership.created_by, SYSTEM_ACTOR);
}

#[tokio::test]
async fn missing_users_are_created_on_add() {
    let h = Harness::new();
    let group = h.group("Upsert", None).await;
    let by_id = Uuid::new_v4();

    let service = h.memberships();
    service
        .add_member(&admin(), group.id, AddMember::user(by_id.to_string()))
        .await
        .unwrap();
    service
        .add_member(
            &admin(),
            group.id,
            AddMember {
                member_id: None,
                universal_uid: Some("legacy-42".into()),
                membership_type: Some(MembershipType::User),
            },
        )
        .await
        .unwrap();

    let users = h.store.users();
    let created = users.find_by_id(by_id).await.unwrap().unwrap();
    assert_eq!(created.universal_uid, SYSTEM_ACTOR);
    let legacy = users.find_by_universal_uid("legacy-42").await.unwrap().unwrap();
    assert_ne!(legacy.id, by_id);
}

#[tokio::test]
async fn other_spellings_of_a_group_id_are_the_same_group() {
    let h = Harness::new();
    let group = h.group("Spelled", None).await;
    let child = h.group("Spelled Child", None).await;
    let service = h.memberships();
    let spelled = |id: Uuid| AddMember {
        member_id: Some(id.to_string().to_uppercase()),
        membership_type: Some(MembershipType::Group),
        ..Default::default()
    };

    let itself = service.add_member(&admin(), group.id, spelled(group.id)).await;
    assert!(matches!(itself, Err(GroveError::BadRequest { .. })));
    let braced = service
        .add_member(
            &admin(),
            group.id,
            AddMember {
                member_id: Some(format!("{{{}}}", group.id)),
                membership_type: Some(MembershipType::Group),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(braced, Err(GroveError::BadRequest { .. })));
    assert_eq!(h.store.membership_count().unwrap(), 0);
    assert_eq!(h.store.sub_group_edge_count().unwrap(), 0);

    service
        .add_member(&admin(), group.id, AddMember::group(child.id))
        .await
        .unwrap();
    let again = service
        .add_member(&admin(), group.id, spelled(child.id))
        .await
        .unwrap_err();
    assert_eq!(again.message(), "The member is already in the group");
    assert_eq!(h.store.membership_count().unwrap(), 1);
}

#[tokio::test]
async fn add_member_validates_its_input() {
    let h = Harness::new();
    let group = h.group("Validated", None).await;
    let service = h.memberships();

    let no_member = service
        .add_member(
            &admin(),
            group.id,
            AddMember {
                membership_type: Some(MembershipType::User),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(no_member, Err(GroveError::BadRequest { .. })));

    let no_type = service
        .add_member(
            &admin(),
            group.id,
            AddMember {
                member_id: Some("u-1".into()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(no_type, Err(GroveError::BadRequest { .. })));

    let itself = service
        .add_member(&admin(), group.id, AddMember::group(group.id))
        .await;
    assert!(matches!(itself, Err(GroveError::BadRequest { .. })));

    let missing = service
        .add_member(&admin(), Uuid::new_v4(), AddMember::user("u-1"))
        .await;
    assert!(matches!(missing, Err(GroveError::NotFound { .. })));
    assert_eq!(h.store.membership_count().unwrap(), 0);
}

#[tokio::test]
async fn private_parents_only_take_private_children() {
    let h = Harness::new();
    let public = h.group("Public A", None).await;
    let secret = h.group_with(private("Private B"), None).await;
    let service = h.memberships();

    service
        .add_member(&admin(), public.id, AddMember::group(secret.id))
        .await
        .unwrap();

    let reversed = service
        .add_member(&admin(), secret.id, AddMember::group(public.id))
        .await;
    assert!(matches!(reversed, Err(GroveError::Conflict { .. })));
    assert_eq!(h.store.sub_group_edge_count().unwrap(), 1);
}

#[tokio::test]
async fn group_member_reports_its_legacy_id() {
    let h = Harness::new();
    let parent = h.group("Parent With Child", None).await;
    let child = h.group("Child With Legacy", Some("c-1")).await;

    let added = h
        .memberships()
        .add_member(&admin(), parent.id, AddMember::group(child.id))
        .await
        .unwrap();
    assert_eq!(added.member_old_id.as_deref(), Some("c-1"));
}

#[tokio::test]
async fn non_admins_cannot_see_inactive_groups() {
    let h = Harness::new();
    let inactive = h
        .group_with(
            CreateGroup {
                name: "Dormant".into(),
                status: GroupStatus::Inactive,
                ..Default::default()
            },
            None,
        )
        .await;

    let result = h
        .memberships()
        .add_member(&user("u-1"), inactive.id, AddMember::user("u-1"))
        .await;
    assert!(matches!(result, Err(GroveError::NotFound { .. })));
}

#[tokio::test]
async fn only_managers_or_self_registration_may_add() {
    let h = Harness::new();
    let closed = h.group("Closed", None).await;
    let open = h
        .group_with(
            CreateGroup {
                name: "Open".into(),
                self_register: true,
                ..Default::default()
            },
            None,
        )
        .await;
    let service = h.memberships();

    let stranger = service
        .add_member(&user("u-1"), closed.id, AddMember::user("u-1"))
        .await;
    assert!(matches!(stranger, Err(GroveError::Forbidden { .. })));

    service
        .add_member(&user("u-1"), open.id, AddMember::user("u-1"))
        .await
        .unwrap();

    let on_behalf = service
        .add_member(&user("u-1"), open.id, AddMember::user("u-2"))
        .await;
    assert!(matches!(on_behalf, Err(GroveError::Forbidden { .. })));

    // A group manager may add anyone.
    h.add_user(&closed, "manager").await;
    h.roles()
        .add_role(
            &admin(),
            "manager",
            RoleChange {
                group_id: closed.id,
                role: GroupRole::GroupManager,
            },
        )
        .await
        .unwrap();
    service
        .add_member(&user("manager"), closed.id, AddMember::user("u-3"))
        .await
        .unwrap();
}

#[tokio::test]
async fn bulk_add_isolates_failures() {
    let h = Harness::new();
    let group = h.group("Bulk", None).await;

    let result = h
        .memberships()
        .add_members_bulk(
            &admin(),
            group.id,
            vec![
                AddMember::user("b-1"),
                AddMember::user("b-1"),
                AddMember::user("b-3"),
            ],
        )
        .await;

    let statuses: Vec<BulkStatus> = result.members.iter().map(|m| m.status).collect();
    assert_eq!(
        statuses,
        vec![BulkStatus::Success, BulkStatus::Failed, BulkStatus::Success]
    );
    assert_eq!(
        result.members[1].message.as_deref(),
        Some("The member is already in the group")
    );
    assert_eq!(result.succeeded(), 2);
    assert_eq!(h.store.membership_count().unwrap(), 2);
}

#[tokio::test]
async fn delete_member_removes_row_and_edge() {
    let h = Harness::new();
    let parent = h.group("Detach Parent", Some("p")).await;
    let child = h.group("Detach Child", Some("c")).await;
    h.link(&parent, &child).await;
    h.add_user(&parent, "u-1").await;

    let service = h.memberships();
    let removed = service
        .delete_member(&admin(), parent.id, &child.id.to_string(), None)
        .await
        .unwrap();
    assert_eq!(removed.member_old_id.as_deref(), Some("c"));
    assert_eq!(removed.old_id.as_deref(), Some("p"));
    assert_eq!(h.store.sub_group_edge_count().unwrap(), 0);

    service
        .delete_member(&admin(), parent.id, "u-1", Some("uid-1".into()))
        .await
        .unwrap();
    assert_eq!(h.store.membership_count().unwrap(), 0);

    let payload = h.publisher.last(&h.config.topics.member_delete).unwrap();
    assert_eq!(payload["memberId"], "u-1");
    assert_eq!(payload["universalUID"], "uid-1");

    let missing = service.delete_member(&admin(), parent.id, "u-1", None).await;
    assert!(matches!(missing, Err(GroveError::NotFound { .. })));
}

#[tokio::test]
async fn self_registered_members_may_leave() {
    let h = Harness::new();
    let open = h
        .group_with(
            CreateGroup {
                name: "Leavable".into(),
                self_register: true,
                ..Default::default()
            },
            None,
        )
        .await;
    h.add_user(&open, "u-1").await;
    h.add_user(&open, "u-2").await;

    let service = h.memberships();
    let other = service.delete_member(&user("u-1"), open.id, "u-2", None).await;
    assert!(matches!(other, Err(GroveError::Forbidden { .. })));
    service
        .delete_member(&user("u-1"), open.id, "u-1", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn bulk_delete_reports_each_member() {
    let h = Harness::new();
    let group = h.group("Bulk Delete", None).await;
    h.add_user(&group, "d-1").await;

    let result = h
        .memberships()
        .delete_members_bulk(&admin(), group.id, vec!["d-1".into(), "d-2".into()])
        .await;
    assert_eq!(result.group_id, group.id);
    assert_eq!(result.members[0].status, BulkStatus::Success);
    assert_eq!(result.members[1].status, BulkStatus::Failed);
}

#[tokio::test]
async fn member_listing_enriches_users() {
    let h = Harness::new();
    let group = h.group("Listed", None).await;
    let by_id = Uuid::new_v4();
    h.add_user(&group, &by_id.to_string()).await;
    h.add_user(&group, "legacy-1").await;

    let service = h.memberships();
    let page = service
        .get_group_members(&admin(), group.id, Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(page.data.iter().all(|m| m.group_name == "Listed"));
    let legacy = page
        .data
        .iter()
        .find(|m| m.member == MemberRef::User("legacy-1".into()))
        .unwrap();
    assert_eq!(legacy.universal_uid.as_deref(), Some("legacy-1"));
    let stored = page
        .data
        .iter()
        .find(|m| m.member == MemberRef::User(by_id.to_string()))
        .unwrap();
    assert_eq!(stored.universal_uid.as_deref(), Some(SYSTEM_ACTOR));

    let one = service
        .get_group_member(&admin(), group.id, "legacy-1")
        .await
        .unwrap();
    assert_eq!(one.group_id, group.id);

    let absent = service
        .get_group_member(&admin(), group.id, "nobody")
        .await
        .unwrap_err();
    assert_eq!(absent.kind(), "not_found");
    assert_eq!(absent.message(), "The member is not in the group");
}

#[tokio::test]
async fn private_member_listing_requires_membership() {
    let h = Harness::new();
    let secret = h.group_with(private("Hidden Members"), None).await;
    h.add_user(&secret, "insider").await;

    let service = h.memberships();
    let outsider = service
        .get_group_members(&user("outsider"), secret.id, Pagination::default())
        .await;
    assert!(matches!(outsider, Err(GroveError::Forbidden { .. })));
    service
        .get_group_members(&user("insider"), secret.id, Pagination::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn member_groups_include_tracked_ancestors() {
    let h = Harness::new();
    let top = h.group("Company", Some("100")).await;
    let middle = h.group("Department", Some("200")).await;
    let team = h.group("Team", Some("300")).await;
    let untracked = h.group("Scratch", None).await;
    h.link(&top, &middle).await;
    h.link(&middle, &team).await;
    h.add_user(&team, "u-1").await;
    h.add_user(&untracked, "u-1").await;

    let service = h.memberships();
    let legacy = service.list_member_groups("u-1", false).await.unwrap();
    assert_eq!(legacy, vec!["100", "200", "300"]);

    let mut ids = service.list_member_groups("u-1", true).await.unwrap();
    ids.sort();
    let mut expected = vec![top.id.to_string(), middle.id.to_string(), team.id.to_string()];
    expected.sort();
    assert_eq!(ids, expected);

    assert!(service.group_validity_check("u-1", "100").await.unwrap());
    assert!(!service.group_validity_check("u-1", "999").await.unwrap());
    assert!(service.list_member_groups("nobody", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn publish_failure_surfaces_after_commit() {
    let h = Harness::new();
    let group = h.group("Noisy", None).await;
    h.publisher.fail(true);

    let result = h
        .memberships()
        .add_member(&admin(), group.id, AddMember::user("u-1"))
        .await;
    assert!(matches!(result, Err(GroveError::Upstream(_))));
    assert!(
        h.store
            .memberships()
            .find(group.id, "u-1")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn concurrent_bulk_duplicates_store_one_row() {
    let h = Harness::yielding();
    let group = h.group("Doubled", None).await;

    let result = h
        .memberships()
        .add_members_bulk(
            &admin(),
            group.id,
            vec![AddMember::user("u-9"), AddMember::user("u-9")],
        )
        .await;

    assert_eq!(result.succeeded(), 1);
    let failed = result
        .members
        .iter()
        .find(|m| m.status == BulkStatus::Failed)
        .unwrap();
    assert_eq!(failed.message.as_deref(), Some("The member is already in the group"));
    assert_eq!(h.store.membership_count().unwrap(), 1);
    assert!(h.store.users().find_by_universal_uid("u-9").await.unwrap().is_some());
}
