//! SurrealDB implementation of [`UserRepository`].

use chrono::{DateTime, Utc};
use grove_core::error::GroveResult;
use grove_core::models::user::User;
use grove_core::repository::UserRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::repository::group::{parse_uuids, uuid_strings};

#[derive(Debug, SurrealValue)]
struct UserRow {
    record_id: String,
    universal_uid: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid user UUID: {e}")))?;
        Ok(User {
            id,
            universal_uid: self.universal_uid,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn find_by_id(&self, id: Uuid) -> GroveResult<Option<User>> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('user', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_user()?)),
            None => Ok(None),
        }
    }

    async fn find_by_universal_uid(&self, universal_uid: &str) -> GroveResult<Option<User>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM user \
                 WHERE universal_uid = $universal_uid \
                 ORDER BY created_at ASC LIMIT 1",
            )
            .bind(("universal_uid", universal_uid.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_user()?)),
            None => Ok(None),
        }
    }

    async fn get_many(&self, ids: &[Uuid]) -> GroveResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM user WHERE meta::id(id) IN $ids")
            .bind(("ids", uuid_strings(ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let users = rows
            .into_iter()
            .map(UserRow::try_into_user)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(users)
    }

    async fn ids_by_universal_uid(&self, universal_uid: &str) -> GroveResult<Vec<Uuid>> {
        let mut result = self
            .db
            .query("SELECT VALUE meta::id(id) FROM user WHERE universal_uid = $universal_uid")
            .bind(("universal_uid", universal_uid.to_string()))
            .await
            .map_err(DbError::from)?;
        let ids: Vec<String> = result.take(0).map_err(DbError::from)?;
        Ok(parse_uuids(ids, "user")?)
    }
}
