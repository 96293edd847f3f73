//! SurrealDB implementations of the grove repository traits.

pub mod group;
pub mod membership;
pub mod user;

pub use group::SurrealGroupRepository;
pub use membership::SurrealMembershipRepository;
pub use user::SurrealUserRepository;
