//! [`Store`] backed by SurrealDB.

use grove_core::error::GroveResult;
use grove_core::repository::Store;
use grove_core::unit_of_work::UnitOfWork;
use surrealdb::{Connection, Surreal};

use crate::repository::{
    SurrealGroupRepository, SurrealMembershipRepository, SurrealUserRepository,
};
use crate::unit_of_work;

/// All grove repositories over one SurrealDB handle.
#[derive(Clone)]
pub struct SurrealStore<C: Connection> {
    db: Surreal<C>,
    groups: SurrealGroupRepository<C>,
    users: SurrealUserRepository<C>,
    memberships: SurrealMembershipRepository<C>,
}

impl<C: Connection> SurrealStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            groups: SurrealGroupRepository::new(db.clone()),
            users: SurrealUserRepository::new(db.clone()),
            memberships: SurrealMembershipRepository::new(db.clone()),
            db,
        }
    }

    pub fn client(&self) -> &Surreal<C> {
        &self.db
    }
}

impl<C: Connection> Store for SurrealStore<C> {
    type Groups = SurrealGroupRepository<C>;
    type Users = SurrealUserRepository<C>;
    type Memberships = SurrealMembershipRepository<C>;

    fn groups(&self) -> &Self::Groups {
        &self.groups
    }

    fn users(&self) -> &Self::Users {
        &self.users
    }

    fn memberships(&self) -> &Self::Memberships {
        &self.memberships
    }

    async fn commit(&self, work: UnitOfWork) -> GroveResult<()> {
        unit_of_work::execute(&self.db, work).await?;
        Ok(())
    }
}
