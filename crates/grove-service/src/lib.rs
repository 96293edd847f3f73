//! Grove Service: group hierarchy engine plus the group, sub-group,
//! membership, role and query services built on top of a
//! [`Store`](grove_core::repository::Store).

mod access;
pub mod challenge;
pub mod config;
pub mod error;
pub mod events;
pub mod group;
pub mod hierarchy;
pub mod membership;
pub mod query;
pub mod role;
pub mod subgroup;

pub use challenge::{ChallengeChecker, HttpChallengeChecker};
pub use config::{BusConfig, ChallengeConfig, EventTopics, ServiceConfig};
pub use error::IntegrationError;
pub use events::{BusApiPublisher, EventPublisher};
pub use group::{GroupService, GroupWithMembers};
pub use hierarchy::{DeletionPlan, Direction, HierarchyEngine};
pub use membership::MembershipService;
pub use query::{GetGroupOptions, GroupMemberCount, GroupSearch, MemberCountQuery, QueryService};
pub use role::{RoleChange, RoleService};
pub use subgroup::SubGroupService;
