//! Service configuration.

use std::env;
use std::time::Duration;

/// Default traversal bound for hierarchy operations.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Event-bus topics, one per mutation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTopics {
    pub group_create: String,
    pub group_bulk_create: String,
    pub group_update: String,
    pub group_delete: String,
    pub member_add: String,
    pub member_delete: String,
    pub subgroup_create: String,
    pub subgroup_delete: String,
    pub member_role_add: String,
    pub member_role_delete: String,
}

impl Default for EventTopics {
    fn default() -> Self {
        Self {
            group_create: "groups.notification.create".into(),
            group_bulk_create: "groups.notification.bulk.create".into(),
            group_update: "groups.notification.update".into(),
            group_delete: "groups.notification.delete".into(),
            member_add: "groups.notification.member.add".into(),
            member_delete: "groups.notification.member.delete".into(),
            subgroup_create: "subgroups.notification.create".into(),
            subgroup_delete: "subgroups.notification.delete".into(),
            // Consumers subscribe to these exact names, double dot included.
            member_role_add: "groups.notification..member.role.add".into(),
            member_role_delete: "groups.notification..member.role.delete".into(),
        }
    }
}

impl EventTopics {
    /// Overrides each topic from its `KAFKA_*_TOPIC` variable when set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let var = |name: &str, default: String| env::var(name).unwrap_or(default);
        Self {
            group_create: var("KAFKA_GROUP_CREATE_TOPIC", defaults.group_create),
            group_bulk_create: var("KAFKA_GROUP_BULK_CREATE_TOPIC", defaults.group_bulk_create),
            group_update: var("KAFKA_GROUP_UPDATE_TOPIC", defaults.group_update),
            group_delete: var("KAFKA_GROUP_DELETE_TOPIC", defaults.group_delete),
            member_add: var("KAFKA_GROUP_MEMBER_ADD_TOPIC", defaults.member_add),
            member_delete: var("KAFKA_GROUP_MEMBER_DELETE_TOPIC", defaults.member_delete),
            subgroup_create: var("KAFKA_SUBGROUP_CREATE_TOPIC", defaults.subgroup_create),
            subgroup_delete: var("KAFKA_SUBGROUP_DELETE_TOPIC", defaults.subgroup_delete),
            member_role_add: var("KAFKA_GROUP_MEMBER_ROLE_ADD_TOPIC", defaults.member_role_add),
            member_role_delete: var(
                "KAFKA_GROUP_MEMBER_ROLE_DELETE_TOPIC",
                defaults.member_role_delete,
            ),
        }
    }
}

/// Connection settings for the HTTP event bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub url: String,
    /// Value of the `originator` envelope field.
    pub originator: String,
    /// Bearer token sent with every event, if any.
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4000/eventBus".into(),
            originator: "grove-groups-api".into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl BusConfig {
    /// Reads `BUSAPI_URL`, `BUSAPI_ORIGINATOR`, `BUSAPI_TOKEN` and
    /// `BUSAPI_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env::var("BUSAPI_URL").unwrap_or(defaults.url),
            originator: env::var("BUSAPI_ORIGINATOR").unwrap_or(defaults.originator),
            token: env::var("BUSAPI_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: secs_from_env("BUSAPI_TIMEOUT_SECS").unwrap_or(defaults.timeout),
        }
    }
}

/// Connection settings for the challenge association lookup.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4000/challenges/".into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl ChallengeConfig {
    /// Reads `CHALLENGE_API_URL`, `CHALLENGE_API_TOKEN` and
    /// `CHALLENGE_API_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env::var("CHALLENGE_API_URL").unwrap_or(defaults.url),
            token: env::var("CHALLENGE_API_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: secs_from_env("CHALLENGE_API_TIMEOUT_SECS").unwrap_or(defaults.timeout),
        }
    }
}

/// Configuration shared by every grove service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Number of levels hierarchy traversals look at (default: 3).
    pub max_depth: usize,
    pub topics: EventTopics,
    pub bus: BusConfig,
    pub challenges: ChallengeConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            topics: EventTopics::default(),
            bus: BusConfig::default(),
            challenges: ChallengeConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Reads `GROVE_MAX_DEPTH` plus the topic, bus and challenge variables.
    /// A zero or unparsable depth falls back to the default.
    pub fn from_env() -> Self {
        let max_depth = env::var("GROVE_MAX_DEPTH")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|depth| *depth > 0)
            .unwrap_or(DEFAULT_MAX_DEPTH);
        Self {
            max_depth,
            topics: EventTopics::from_env(),
            bus: BusConfig::from_env(),
            challenges: ChallengeConfig::from_env(),
        }
    }
}

fn secs_from_env(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
