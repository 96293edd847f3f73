//! Grove Core: domain models, error types and storage traits shared by
//! every grove crate.

pub mod error;
pub mod models;
pub mod repository;
pub mod unit_of_work;

pub use error::{GroveError, GroveResult};
pub use unit_of_work::{UnitOfWork, WriteOp};
