//! Shared fixtures for the service tests: in-memory stores, a publisher
//! that records events and a challenge checker with a fixed answer.

#![allow(dead_code)]

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use grove_core::UnitOfWork;
use grove_core::error::GroveResult;
use grove_core::models::auth::AuthUser;
use grove_core::models::group::{CreateGroup, Group, PatchGroup};
use grove_core::models::membership::AddMember;
use grove_core::repository::Store;
use grove_db::InMemoryStore;
use grove_service::{
    ChallengeChecker, EventPublisher, GroupService, HierarchyEngine, IntegrationError,
    MembershipService, QueryService, RoleService, ServiceConfig, SubGroupService,
};
use serde_json::Value;
use uuid::Uuid;

#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<(String, Value)>>,
    failing: AtomicBool,
}

impl RecordingPublisher {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<String> {
        self.events().into_iter().map(|(topic, _)| topic).collect()
    }

    pub fn last(&self, topic: &str) -> Option<Value> {
        self.events()
            .into_iter()
            .rev()
            .find(|(t, _)| t == topic)
            .map(|(_, payload)| payload)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), IntegrationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(IntegrationError::Closed);
        }
        self.events.lock().unwrap().push((topic.to_string(), payload));
        Ok(())
    }
}

#[derive(Default)]
pub struct FixedChallengeChecker {
    associated: AtomicBool,
}

impl FixedChallengeChecker {
    pub fn set(&self, associated: bool) {
        self.associated.store(associated, Ordering::SeqCst);
    }
}

impl ChallengeChecker for FixedChallengeChecker {
    async fn has_associated_challenges(&self, _group_id: Uuid) -> Result<bool, IntegrationError> {
        Ok(self.associated.load(Ordering::SeqCst))
    }
}

/// An in-memory store that yields to the scheduler before every commit,
/// so that concurrent service calls interleave between their reads and
/// their writes.
pub struct YieldingStore(pub InMemoryStore);

impl Deref for YieldingStore {
    type Target = InMemoryStore;

    fn deref(&self) -> &InMemoryStore {
        &self.0
    }
}

impl Store for YieldingStore {
    type Groups = <InMemoryStore as Store>::Groups;
    type Users = <InMemoryStore as Store>::Users;
    type Memberships = <InMemoryStore as Store>::Memberships;

    fn groups(&self) -> &Self::Groups {
        self.0.groups()
    }

    fn users(&self) -> &Self::Users {
        self.0.users()
    }

    fn memberships(&self) -> &Self::Memberships {
        self.0.memberships()
    }

    async fn commit(&self, work: UnitOfWork) -> GroveResult<()> {
        tokio::task::yield_now().await;
        self.0.commit(work).await
    }
}

/// Every service wired to one store.
pub struct Harness<S: Store = InMemoryStore> {
    pub store: Arc<S>,
    pub publisher: Arc<RecordingPublisher>,
    pub challenges: Arc<FixedChallengeChecker>,
    pub config: ServiceConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(InMemoryStore::new())
    }
}

impl Harness<YieldingStore> {
    pub fn yielding() -> Self {
        Self::with_store(YieldingStore(InMemoryStore::new()))
    }
}

impl<S: Store> Harness<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store: Arc::new(store),
            publisher: Arc::new(RecordingPublisher::default()),
            challenges: Arc::new(FixedChallengeChecker::default()),
            config: ServiceConfig::default(),
        }
    }

    pub fn groups(&self) -> GroupService<S, RecordingPublisher, FixedChallengeChecker> {
        GroupService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.publisher),
            Arc::clone(&self.challenges),
            &self.config,
        )
    }

    pub fn sub_groups(&self) -> SubGroupService<S, RecordingPublisher> {
        SubGroupService::new(Arc::clone(&self.store), Arc::clone(&self.publisher), &self.config)
    }

    pub fn memberships(&self) -> MembershipService<S, RecordingPublisher> {
        MembershipService::new(Arc::clone(&self.store), Arc::clone(&self.publisher), &self.config)
    }

    pub fn roles(&self) -> RoleService<S, RecordingPublisher> {
        RoleService::new(Arc::clone(&self.store), Arc::clone(&self.publisher), &self.config)
    }

    pub fn queries(&self) -> QueryService<S> {
        QueryService::new(Arc::clone(&self.store), &self.config)
    }

    pub fn hierarchy(&self) -> HierarchyEngine<S> {
        HierarchyEngine::new(Arc::clone(&self.store), self.config.max_depth)
    }

    /// Creates a group as an admin, optionally giving it a legacy id.
    pub async fn group(&self, name: &str, old_id: Option<&str>) -> Group {
        self.group_with(
            CreateGroup {
                name: name.into(),
                ..Default::default()
            },
            old_id,
        )
        .await
    }

    pub async fn group_with(&self, input: CreateGroup, old_id: Option<&str>) -> Group {
        let groups = self.groups();
        let group = groups.create_group(&admin(), input).await.unwrap();
        match old_id {
            Some(old_id) => groups
                .patch_group(
                    &admin(),
                    group.id,
                    PatchGroup {
                        old_id: old_id.into(),
                    },
                )
                .await
                .unwrap(),
            None => group,
        }
    }

    /// Adds `child` as a sub-group member of `parent`.
    pub async fn link(&self, parent: &Group, child: &Group) {
        self.memberships()
            .add_member(&admin(), parent.id, AddMember::group(child.id))
            .await
            .unwrap();
    }

    pub async fn add_user(&self, group: &Group, member_id: &str) {
        self.memberships()
            .add_member(&admin(), group.id, AddMember::user(member_id))
            .await
            .unwrap();
    }
}

pub fn admin() -> AuthUser {
    AuthUser::admin("admin-1")
}

pub fn user(id: &str) -> AuthUser {
    AuthUser::user(id)
}
