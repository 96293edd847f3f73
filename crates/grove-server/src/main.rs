//! Grove Server: process host for the group membership services.

use std::sync::Arc;

use anyhow::Context;
use grove_db::{DbConfig, DbManager, SurrealStore};
use grove_service::{
    BusApiPublisher, GroupService, HttpChallengeChecker, MemberCountQuery, MembershipService,
    QueryService, RoleService, ServiceConfig, SubGroupService,
};
use surrealdb::engine::remote::ws::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

type Store = SurrealStore<Client>;

/// Every service, sharing one store and one event publisher. Transport
/// handlers borrow from this.
#[allow(dead_code)]
struct Services {
    groups: GroupService<Store, BusApiPublisher, HttpChallengeChecker>,
    sub_groups: SubGroupService<Store, BusApiPublisher>,
    memberships: MembershipService<Store, BusApiPublisher>,
    roles: RoleService<Store, BusApiPublisher>,
    queries: QueryService<Store>,
}

impl Services {
    fn new(
        store: Arc<Store>,
        publisher: Arc<BusApiPublisher>,
        challenges: Arc<HttpChallengeChecker>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            groups: GroupService::new(
                Arc::clone(&store),
                Arc::clone(&publisher),
                challenges,
                config,
            ),
            sub_groups: SubGroupService::new(Arc::clone(&store), Arc::clone(&publisher), config),
            memberships: MembershipService::new(Arc::clone(&store), Arc::clone(&publisher), config),
            roles: RoleService::new(Arc::clone(&store), publisher, config),
            queries: QueryService::new(store, config),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("grove=info")),
        )
        .json()
        .init();

    info!("Starting grove server...");

    let config = ServiceConfig::from_env();
    let db = DbManager::connect(&DbConfig::from_env())
        .await
        .context("connecting to SurrealDB")?;
    let store = Arc::new(SurrealStore::new(db.client().clone()));

    let publisher = Arc::new(
        BusApiPublisher::new(config.bus.clone()).context("building event bus client")?,
    );
    let challenges = Arc::new(
        HttpChallengeChecker::new(config.challenges.clone())
            .context("building challenge API client")?,
    );

    let services = Services::new(store, Arc::clone(&publisher), challenges, &config);
    let tracked = services
        .queries
        .list_groups_member_count(MemberCountQuery::default())
        .await
        .context("reading group member counts")?;
    info!(
        max_depth = config.max_depth,
        tracked_groups = tracked.len(),
        "Grove services ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    publisher.shutdown();
    info!("Grove server stopped.");
    Ok(())
}
