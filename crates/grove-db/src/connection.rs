//! Connecting to the SurrealDB server that backs the grove store.

use std::env;

use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::schema::run_migrations;

/// Where and as whom to connect.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket endpoint, `host:port`. Defaults to the local server on
    /// port 8000.
    pub url: String,
    /// Namespace holding the grove data, `grove` unless overridden.
    pub namespace: String,
    /// Database inside the namespace with the group, user and membership
    /// tables, `groups` unless overridden.
    pub database: String,
    /// Root user the store signs in as.
    pub username: String,
    /// Password of the root user.
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "grove".into(),
            database: "groups".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl DbConfig {
    /// Reads `GROVE_DB_URL`, `GROVE_DB_NAMESPACE`, `GROVE_DB_DATABASE`,
    /// `GROVE_DB_USER` and `GROVE_DB_PASS`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let pick = |key: &str, fallback: String| lookup(key).unwrap_or(fallback);
        Self {
            url: pick("GROVE_DB_URL", defaults.url),
            namespace: pick("GROVE_DB_NAMESPACE", defaults.namespace),
            database: pick("GROVE_DB_DATABASE", defaults.database),
            username: pick("GROVE_DB_USER", defaults.username),
            password: pick("GROVE_DB_PASS", defaults.password),
        }
    }
}

/// An authenticated, migrated SurrealDB client.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    /// Authenticates as root, selects the configured namespace and
    /// database, and brings the schema up to date.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;

        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        run_migrations(&db).await?;

        info!(url = %config.url, "SurrealDB ready");

        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<Client> {
        &self.db
    }
}
