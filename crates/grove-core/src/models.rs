//! Domain models for grove.
//!
//! These are the core types shared across all crates.

pub mod auth;
pub mod group;
pub mod membership;
pub mod user;

/// Actor id recorded when a mutation has no authenticated user, and the
/// universal UID given to users created from a bare id.
pub const SYSTEM_ACTOR: &str = "00000000";
