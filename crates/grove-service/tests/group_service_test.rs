//! Integration tests for the group and sub-group lifecycle.

mod common;

use common::{Harness, admin, user};
use grove_core::error::GroveError;
use grove_core::models::group::{BulkCreateGroup, CreateGroup, GroupStatus, PatchGroup, UpdateGroup};
use grove_core::models::membership::{AddMember, GroupRole};
use grove_core::repository::{GroupRepository, MembershipRepository, Store};
use grove_service::RoleChange;

fn named(name: &str) -> CreateGroup {
    CreateGroup {
        name: name.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn created_group_gets_defaults_and_an_event() {
    let h = Harness::new();
    let group = h.groups().create_group(&admin(), named("Fresh")).await.unwrap();

    assert_eq!(group.status, GroupStatus::Active);
    assert_eq!(group.domain, "");
    assert_eq!(group.sso_id, "");
    assert_eq!(group.organization_id, "");
    assert_eq!(group.created_by, "admin-1");
    assert_eq!(group.updated_by.as_deref(), Some("admin-1"));

    let payload = h.publisher.last(&h.config.topics.group_create).unwrap();
    assert_eq!(payload["name"], "Fresh");
}

#[tokio::test]
async fn group_names_are_unique_ignoring_case() {
    let h = Harness::new();
    let service = h.groups();
    service.create_group(&admin(), named("Engineering")).await.unwrap();

    let clash = service.create_group(&admin(), named("ENGINEERING")).await;
    match clash {
        Err(GroveError::Conflict { message }) => {
            assert_eq!(message, "The group name \"ENGINEERING\" is already used")
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn bulk_create_adds_each_member_once() {
    let h = Harness::new();
    let created = h
        .groups()
        .bulk_create_group(
            &admin(),
            BulkCreateGroup {
                group: named("Bulk Made"),
                members: vec!["m-1".into(), "m-2".into(), "m-1".into()],
            },
        )
        .await
        .unwrap();

    assert_eq!(created.members.len(), 2);
    assert_eq!(h.store.membership_count().unwrap(), 2);
    let payload = h.publisher.last(&h.config.topics.group_bulk_create).unwrap();
    assert_eq!(payload["members"].as_array().unwrap().len(), 2);
    assert_eq!(payload["name"], "Bulk Made");
}

#[tokio::test]
async fn update_replaces_fields_and_reports_old_name() {
    let h = Harness::new();
    let group = h.group("Before", None).await;
    h.group("Taken", None).await;
    let service = h.groups();

    let clash = service
        .update_group(
            &admin(),
            group.id,
            UpdateGroup {
                group: named("taken"),
                old_id: None,
            },
        )
        .await;
    assert!(matches!(clash, Err(GroveError::Conflict { .. })));

    let same_name = service
        .update_group(
            &user("editor"),
            group.id,
            UpdateGroup {
                group: CreateGroup {
                    name: "BEFORE".into(),
                    description: Some("renamed by case".into()),
                    ..Default::default()
                },
                old_id: Some("".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(same_name.updated_by.as_deref(), Some("editor"));
    assert_eq!(same_name.old_id, None);

    let updated = service
        .update_group(
            &admin(),
            group.id,
            UpdateGroup {
                group: named("After"),
                old_id: Some("55".into()),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "After");
    assert_eq!(updated.description, None);
    assert_eq!(updated.created_by, group.created_by);

    let payload = h.publisher.last(&h.config.topics.group_update).unwrap();
    assert_eq!(payload["oldName"], "BEFORE");
    assert_eq!(payload["name"], "After");
}

#[tokio::test]
async fn patch_sets_only_the_legacy_id() {
    let h = Harness::new();
    let group = h.group("Patched", None).await;
    h.publisher.clear();

    let patched = h
        .groups()
        .patch_group(
            &admin(),
            group.id,
            PatchGroup {
                old_id: "legacy-9".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.old_id.as_deref(), Some("legacy-9"));
    assert_eq!(patched.name, group.name);
    assert!(h.publisher.events().is_empty());
}

#[tokio::test]
async fn groups_with_challenges_are_not_deleted() {
    let h = Harness::new();
    let group = h.group("Challenged", None).await;
    let child = h.group("Challenged Child", None).await;
    h.link(&group, &child).await;
    h.challenges.set(true);

    let result = h.groups().delete_group(&admin(), group.id).await;
    assert!(matches!(result, Err(GroveError::NotAcceptable { .. })));

    assert!(h.store.groups().get_by_id(group.id).await.is_ok());
    assert!(h.store.groups().get_by_id(child.id).await.is_ok());
    assert_eq!(h.store.membership_count().unwrap(), 1);
    assert_eq!(h.store.sub_group_edge_count().unwrap(), 1);
}

#[tokio::test]
async fn delete_group_cascades_and_announces() {
    let h = Harness::new();
    let group = h.group("Doomed Root", None).await;
    let child = h.group("Doomed Child", None).await;
    h.link(&group, &child).await;
    h.add_user(&child, "u-1").await;

    let returned = h.groups().delete_group(&admin(), group.id).await.unwrap();
    assert_eq!(returned.id, group.id);

    assert!(h.store.groups().get_by_id(child.id).await.is_err());
    assert_eq!(h.store.membership_count().unwrap(), 0);
    let payload = h.publisher.last(&h.config.topics.group_delete).unwrap();
    assert_eq!(payload["groups"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn sub_group_creation_links_parent_and_child() {
    let h = Harness::new();
    let parent = h.group("Sub Parent", None).await;

    let sub = h
        .sub_groups()
        .create_sub_group(&admin(), parent.id, named("Sub Child"))
        .await
        .unwrap();

    let children = h.store.groups().sub_groups(parent.id).await.unwrap();
    assert_eq!(children.iter().map(|g| g.id).collect::<Vec<_>>(), vec![sub.id]);
    assert!(
        h.store
            .memberships()
            .find(parent.id, &sub.id.to_string())
            .await
            .unwrap()
            .is_some()
    );

    let payload = h.publisher.last(&h.config.topics.subgroup_create).unwrap();
    assert_eq!(payload["groupId"], parent.id.to_string());
    assert_eq!(payload["subGroup"]["name"], "Sub Child");
}

#[tokio::test]
async fn sub_group_creation_checks_authority_and_privacy() {
    let h = Harness::new();
    let secret = h
        .group_with(
            CreateGroup {
                name: "Secret Parent".into(),
                private_group: true,
                ..Default::default()
            },
            None,
        )
        .await;
    let service = h.sub_groups();

    let public_child = service
        .create_sub_group(&admin(), secret.id, named("Public Child"))
        .await;
    assert!(matches!(public_child, Err(GroveError::Conflict { .. })));

    let outsider = service
        .create_sub_group(&user("u-1"), secret.id, named("Outsider Child"))
        .await;
    assert!(matches!(outsider, Err(GroveError::Forbidden { .. })));

    h.memberships()
        .add_member(&admin(), secret.id, AddMember::user("u-1"))
        .await
        .unwrap();
    h.roles()
        .add_role(
            &admin(),
            "u-1",
            RoleChange {
                group_id: secret.id,
                role: GroupRole::GroupAdmin,
            },
        )
        .await
        .unwrap();
    let child = service
        .create_sub_group(
            &user("u-1"),
            secret.id,
            CreateGroup {
                name: "Private Child".into(),
                private_group: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(child.created_by, "u-1");
}

#[tokio::test]
async fn sub_group_deletion_requires_the_link() {
    let h = Harness::new();
    let parent = h.group("Unlinked Parent", None).await;
    let stranger = h.group("Unlinked Stranger", None).await;
    let service = h.sub_groups();

    let unlinked = service
        .delete_sub_group(&admin(), parent.id, stranger.id)
        .await;
    assert!(matches!(unlinked, Err(GroveError::BadRequest { .. })));

    let child = service
        .create_sub_group(&admin(), parent.id, named("Linked Child"))
        .await
        .unwrap();
    let returned = service
        .delete_sub_group(&admin(), parent.id, child.id)
        .await
        .unwrap();
    assert_eq!(returned.id, parent.id);
    assert!(h.store.groups().get_by_id(child.id).await.is_err());
    assert_eq!(h.store.sub_group_edge_count().unwrap(), 0);

    let payload = h.publisher.last(&h.config.topics.subgroup_delete).unwrap();
    assert_eq!(payload["subGroup"][0]["name"], "Linked Child");
}
