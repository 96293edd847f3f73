//! Store scenarios shared by the SurrealDB and in-memory store tests.

#![allow(dead_code)]

use grove_core::{GroveError, UnitOfWork};
use grove_core::models::group::{CreateGroup, Group, GroupStatus};
use grove_core::models::membership::{GroupRole, MemberRef, Membership, MembershipType, RoleGrant};
use grove_core::models::user::User;
use grove_core::repository::{
    GroupEdge, GroupFilter, GroupRepository, MembershipRepository, Pagination, Store,
    UserRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

pub async fn surreal() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    grove_db::run_migrations(&db).await.unwrap();
    db
}

pub fn group(name: &str, old_id: Option<&str>) -> Group {
    let mut group = Group::new(
        CreateGroup {
            name: name.into(),
            ..Default::default()
        },
        "1",
    );
    group.old_id = old_id.map(str::to_string);
    group
}

pub async fn insert_groups<S: Store>(store: &S, groups: &[&Group]) {
    let mut work = UnitOfWork::new();
    for group in groups {
        work.insert_group((*group).clone());
    }
    store.commit(work).await.unwrap();
}

pub async fn link<S: Store>(store: &S, parent: &Group, child: &Group) {
    let mut work = UnitOfWork::new();
    work.insert_membership(Membership::new(
        parent.id,
        MemberRef::Group(child.id),
        "1".into(),
    ));
    store.commit(work).await.unwrap();
}

pub async fn add_user<S: Store>(store: &S, group: &Group, member_id: &str) -> Membership {
    let membership = Membership::new(group.id, MemberRef::User(member_id.into()), "1".into());
    let mut work = UnitOfWork::new();
    work.insert_membership(membership.clone());
    store.commit(work).await.unwrap();
    membership
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

pub async fn group_lookups<S: Store>(store: S) {
    let alpha = group("Alpha Team", Some("100"));
    insert_groups(&store, &[&alpha]).await;

    let by_id = store.groups().get_by_id(alpha.id).await.unwrap();
    assert_eq!(by_id.name, "Alpha Team");
    assert_eq!(by_id.old_id.as_deref(), Some("100"));
    assert_eq!(by_id.status, GroupStatus::Active);

    let by_old_id = store.groups().get_by_old_id("100").await.unwrap();
    assert_eq!(by_old_id.id, alpha.id);

    let by_name = store.groups().find_by_name("ALPHA team").await.unwrap();
    assert_eq!(by_name.map(|g| g.id), Some(alpha.id));

    let missing = store.groups().get_by_id(Uuid::new_v4()).await;
    assert!(matches!(
        missing,
        Err(grove_core::GroveError::NotFound { .. })
    ));
}

pub async fn duplicate_name_is_rejected<S: Store>(store: S) {
    insert_groups(&store, &[&group("Design", None)]).await;

    let mut work = UnitOfWork::new();
    work.insert_group(group("DESIGN", None));
    assert!(store.commit(work).await.is_err());

    let page = store
        .groups()
        .search(&GroupFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

pub async fn failed_unit_of_work_leaves_store_unchanged<S: Store>(store: S) {
    let parent = group("Parent", Some("1"));
    insert_groups(&store, &[&parent]).await;
    add_user(&store, &parent, "42").await;

    let fresh = group("Fresh", Some("2"));
    let mut work = UnitOfWork::new();
    work.insert_group(fresh.clone()).insert_membership(Membership::new(
        parent.id,
        MemberRef::User("42".into()),
        "1".into(),
    ));
    assert!(store.commit(work).await.is_err());

    assert!(store.groups().get_by_id(fresh.id).await.is_err());
    assert_eq!(store.memberships().count_by_group(parent.id).await.unwrap(), 1);
}

pub async fn group_membership_is_mirrored<S: Store>(store: S) {
    let parent = group("Parent", Some("1"));
    let child = group("Child", Some("2"));
    insert_groups(&store, &[&parent, &child]).await;
    link(&store, &parent, &child).await;

    let subs = store.groups().sub_groups(parent.id).await.unwrap();
    assert_eq!(subs.iter().map(|g| g.id).collect::<Vec<_>>(), vec![child.id]);

    let parents = store.groups().parent_groups(child.id).await.unwrap();
    assert_eq!(
        parents.iter().map(|g| g.id).collect::<Vec<_>>(),
        vec![parent.id]
    );

    let edges = store.memberships().child_edges(&[parent.id]).await.unwrap();
    assert_eq!(
        edges,
        vec![GroupEdge {
            parent: parent.id,
            child: child.id
        }]
    );
    let edges = store.memberships().parent_edges(&[child.id]).await.unwrap();
    assert_eq!(edges.len(), 1);

    let membership = store
        .memberships()
        .find_typed(parent.id, &child.id.to_string(), MembershipType::Group)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.member, MemberRef::Group(child.id));

    let mut work = UnitOfWork::new();
    work.delete_membership(parent.id, child.id.to_string());
    store.commit(work).await.unwrap();

    assert!(store.groups().sub_groups(parent.id).await.unwrap().is_empty());
    assert!(store.groups().parent_groups(child.id).await.unwrap().is_empty());
}

pub async fn group_deletion_removes_every_reference<S: Store>(store: S) {
    let root = group("Root", Some("1"));
    let child = group("Child", Some("2"));
    let other = group("Other", Some("3"));
    insert_groups(&store, &[&root, &child, &other]).await;
    link(&store, &root, &child).await;
    link(&store, &other, &child).await;
    add_user(&store, &child, "7").await;
    add_user(&store, &other, "7").await;

    let mut work = UnitOfWork::new();
    work.delete_groups(vec![child.id]);
    store.commit(work).await.unwrap();

    assert!(store.groups().get_by_id(child.id).await.is_err());
    assert_eq!(store.memberships().count_by_group(child.id).await.unwrap(), 0);
    assert_eq!(store.memberships().count_by_group(root.id).await.unwrap(), 0);
    assert_eq!(store.memberships().count_by_group(other.id).await.unwrap(), 1);
    assert!(store.groups().sub_groups(root.id).await.unwrap().is_empty());
    assert!(
        store
            .memberships()
            .list_by_member(&child.id.to_string())
            .await
            .unwrap()
            .is_empty()
    );
}

pub async fn roles_are_granted_and_revoked<S: Store>(store: S) {
    let team = group("Team", Some("1"));
    insert_groups(&store, &[&team]).await;
    let membership = add_user(&store, &team, "7").await;

    let grant = RoleGrant {
        role: GroupRole::GroupManager,
        created_by: "1".into(),
        created_at: chrono::Utc::now(),
    };
    let mut work = UnitOfWork::new();
    work.grant_role(membership.id, grant.clone(), "1");
    store.commit(work).await.unwrap();

    let stored = store.memberships().find(team.id, "7").await.unwrap().unwrap();
    assert!(stored.has_role(GroupRole::GroupManager));
    assert_eq!(stored.updated_by.as_deref(), Some("1"));

    let with_roles = store
        .memberships()
        .list_with_roles("7", Pagination::default())
        .await
        .unwrap();
    assert_eq!(with_roles.total, 1);

    let mut work = UnitOfWork::new();
    work.grant_role(membership.id, grant, "1");
    let err = store.commit(work).await.unwrap_err();
    assert!(matches!(err, GroveError::Conflict { .. }));
    assert_eq!(
        err.message(),
        format!(
            "The group role: groupManager of the member: 7 is already in the group: {}",
            team.id
        )
    );

    let mut work = UnitOfWork::new();
    work.revoke_role(membership.id, GroupRole::GroupManager, "2");
    store.commit(work).await.unwrap();

    let stored = store.memberships().find(team.id, "7").await.unwrap().unwrap();
    assert_eq!(stored.roles, None);
    assert_eq!(stored.updated_by.as_deref(), Some("2"));
    let with_roles = store
        .memberships()
        .list_with_roles("7", Pagination::default())
        .await
        .unwrap();
    assert_eq!(with_roles.total, 0);

    let mut work = UnitOfWork::new();
    work.revoke_role(membership.id, GroupRole::GroupManager, "2");
    let err = store.commit(work).await.unwrap_err();
    assert!(matches!(err, GroveError::BadRequest { .. }));
}

pub async fn grants_keep_roles_added_in_between<S: Store>(store: S) {
    let team = group("Team", Some("1"));
    insert_groups(&store, &[&team]).await;
    let membership = add_user(&store, &team, "7").await;

    for role in [GroupRole::GroupAdmin, GroupRole::GroupManager] {
        let mut work = UnitOfWork::new();
        work.grant_role(
            membership.id,
            RoleGrant {
                role,
                created_by: "1".into(),
                created_at: chrono::Utc::now(),
            },
            "1",
        );
        store.commit(work).await.unwrap();
    }

    let stored = store.memberships().find(team.id, "7").await.unwrap().unwrap();
    assert!(stored.has_role(GroupRole::GroupAdmin));
    assert!(stored.has_role(GroupRole::GroupManager));
}

pub async fn memberships_need_existing_groups<S: Store>(store: S) {
    let team = group("Team", Some("1"));
    insert_groups(&store, &[&team]).await;
    let gone = group("Gone", None);

    let mut work = UnitOfWork::new();
    work.insert_membership(Membership::new(team.id, MemberRef::Group(gone.id), "1".into()));
    let err = store.commit(work).await.unwrap_err();
    assert!(matches!(err, GroveError::NotFound { .. }));

    let mut work = UnitOfWork::new();
    work.insert_membership(Membership::new(gone.id, MemberRef::User("7".into()), "1".into()));
    let err = store.commit(work).await.unwrap_err();
    assert!(matches!(err, GroveError::NotFound { .. }));

    assert!(store.groups().sub_groups(team.id).await.unwrap().is_empty());
    assert_eq!(store.memberships().count_by_group(team.id).await.unwrap(), 0);
}

pub async fn guarded_deletion_refuses_new_parents<S: Store>(store: S) {
    let root = group("Root", Some("1"));
    let child = group("Child", Some("2"));
    let outside = group("Outside", Some("3"));
    insert_groups(&store, &[&root, &child, &outside]).await;
    link(&store, &root, &child).await;

    let ids = vec![root.id, child.id];
    link(&store, &outside, &child).await;

    let mut work = UnitOfWork::new();
    work.delete_group_tree(ids.clone(), vec![child.id], ids.clone());
    let err = store.commit(work).await.unwrap_err();
    assert!(matches!(err, GroveError::Conflict { .. }));
    assert_eq!(store.groups().get_many(&ids).await.unwrap().len(), 2);
    assert_eq!(store.memberships().count_by_group(outside.id).await.unwrap(), 1);

    let mut work = UnitOfWork::new();
    work.delete_group_tree(vec![root.id], Vec::new(), ids);
    store.commit(work).await.unwrap();
    assert!(store.groups().get_by_id(child.id).await.is_ok());
    assert!(store.groups().get_by_id(root.id).await.is_err());
}

pub async fn users_resolve_by_id_and_universal_uid<S: Store>(store: S) {
    let first = User::new(Uuid::new_v4(), "40159127", "1");
    let second = User::new(Uuid::new_v4(), "40159127", "1");
    let mut work = UnitOfWork::new();
    work.insert_user(first.clone()).insert_user(second.clone());
    store.commit(work).await.unwrap();

    let found = store.users().find_by_id(first.id).await.unwrap().unwrap();
    assert_eq!(found.universal_uid, "40159127");

    assert!(
        store
            .users()
            .find_by_universal_uid("40159127")
            .await
            .unwrap()
            .is_some()
    );
    assert!(store.users().find_by_universal_uid("nobody").await.unwrap().is_none());

    let mut ids = store.users().ids_by_universal_uid("40159127").await.unwrap();
    ids.sort();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(ids, expected);

    let many = store.users().get_many(&[first.id, Uuid::new_v4()]).await.unwrap();
    assert_eq!(many.len(), 1);
}

pub async fn search_filters_and_paginates<S: Store>(store: S) {
    let mut a = group("Data Science", Some("10"));
    a.organization_id = "Org-1".into();
    let mut b = group("Data Platform", Some("20"));
    b.organization_id = "org-1".into();
    b.private_group = true;
    let mut c = group("Marketing", Some("30"));
    c.status = GroupStatus::Inactive;
    insert_groups(&store, &[&a, &b, &c]).await;

    let filter = GroupFilter {
        name: Some("DATA".into()),
        ..Default::default()
    };
    let page = store
        .groups()
        .search(&filter, Pagination::new(1, 1))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].id, b.id);
    assert_eq!(page.total_pages(), 2);

    let filter = GroupFilter {
        organization_id: Some("ORG-1".into()),
        private_group: Some(false),
        ..Default::default()
    };
    let page = store
        .groups()
        .search(&filter, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.data.iter().map(|g| g.id).collect::<Vec<_>>(), vec![a.id]);

    let filter = GroupFilter {
        status: Some(GroupStatus::Active),
        ids: Some(vec![a.id, c.id]),
        ..Default::default()
    };
    let page = store
        .groups()
        .search(&filter, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    let mut tracked = store.groups().tracked_ids(None).await.unwrap();
    tracked.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(tracked, expected);
    assert_eq!(
        store.groups().tracked_ids(Some("org-1")).await.unwrap(),
        vec![b.id]
    );
}

pub async fn member_aggregates<S: Store>(store: S) {
    let a = group("A", Some("1"));
    let b = group("B", Some("2"));
    insert_groups(&store, &[&a, &b]).await;
    add_user(&store, &a, "7").await;
    add_user(&store, &a, "8").await;
    add_user(&store, &b, "8").await;
    link(&store, &a, &b).await;

    let mut counts = store
        .memberships()
        .count_by_groups(&[a.id, b.id], None)
        .await
        .unwrap();
    counts.sort_by_key(|(id, _)| *id == b.id);
    assert_eq!(counts, vec![(a.id, 3), (b.id, 1)]);

    let only_seven = vec!["7".to_string()];
    let counts = store
        .memberships()
        .count_by_groups(&[a.id, b.id], Some(&only_seven))
        .await
        .unwrap();
    assert_eq!(counts, vec![(a.id, 1)]);

    let groups = store
        .memberships()
        .group_ids_for_members(&["8".to_string()], MembershipType::User)
        .await
        .unwrap();
    assert_eq!(groups.len(), 2);

    let users = store
        .memberships()
        .distinct_member_ids(MembershipType::User)
        .await
        .unwrap();
    assert_eq!(users, vec!["7".to_string(), "8".to_string()]);

    let page = store
        .memberships()
        .list_by_group(a.id, Pagination::new(2, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.data.len(), 1);
}
