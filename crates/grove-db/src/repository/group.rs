//! SurrealDB implementation of [`GroupRepository`].

use chrono::{DateTime, Utc};
use grove_core::error::GroveResult;
use grove_core::models::group::{Group, GroupStatus, name_key};
use grove_core::repository::{GroupFilter, GroupRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
pub(crate) struct GroupRow {
    record_id: String,
    old_id: Option<String>,
    name: String,
    description: Option<String>,
    organization_id: String,
    domain: String,
    sso_id: String,
    private_group: bool,
    self_register: bool,
    status: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_by: Option<String>,
    updated_at: DateTime<Utc>,
}

impl GroupRow {
    pub(crate) fn try_into_group(self) -> Result<Group, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid group UUID: {e}")))?;
        let status = self
            .status
            .parse::<GroupStatus>()
            .map_err(DbError::Decode)?;
        Ok(Group {
            id,
            old_id: self.old_id,
            name: self.name,
            description: self.description,
            organization_id: self.organization_id,
            domain: self.domain,
            sso_id: self.sso_id,
            private_group: self.private_group,
            self_register: self.self_register,
            status,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_by: self.updated_by,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn rows_into_groups(rows: Vec<GroupRow>) -> Result<Vec<Group>, DbError> {
    rows.into_iter().map(GroupRow::try_into_group).collect()
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

pub(crate) fn uuid_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

pub(crate) fn parse_uuids(values: Vec<String>, entity: &str) -> Result<Vec<Uuid>, DbError> {
    values
        .iter()
        .map(|v| {
            Uuid::parse_str(v).map_err(|e| DbError::Decode(format!("invalid {entity} UUID: {e}")))
        })
        .collect()
}

/// SurrealDB implementation of the Group repository.
#[derive(Clone)]
pub struct SurrealGroupRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealGroupRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn first(
        &self,
        query: &str,
        key: &'static str,
        value: String,
    ) -> GroveResult<Option<Group>> {
        let mut result = self
            .db
            .query(query)
            .bind((key, value))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<GroupRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_group()?)),
            None => Ok(None),
        }
    }

    async fn related(&self, query: &str, id: Uuid) -> GroveResult<Vec<Group>> {
        let mut result = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<GroupRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_groups(rows)?)
    }
}

/// Builds the WHERE clause for a search filter. Values are bound under the
/// parameter names used in the clause.
fn filter_clause(filter: &GroupFilter) -> String {
    let mut conditions = Vec::new();
    if filter.ids.is_some() {
        conditions.push("meta::id(id) IN $ids");
    }
    if filter.name.is_some() {
        conditions.push("string::contains(name_key, $name)");
    }
    if filter.old_id.is_some() {
        conditions.push("old_id = $old_id");
    }
    if filter.sso_id.is_some() {
        conditions.push("string::lowercase(sso_id) = $sso_id");
    }
    if filter.organization_id.is_some() {
        conditions.push("string::lowercase(organization_id) = $organization_id");
    }
    if filter.self_register.is_some() {
        conditions.push("self_register = $self_register");
    }
    if filter.private_group.is_some() {
        conditions.push("private_group = $private_group");
    }
    if filter.status.is_some() {
        conditions.push("status = $status");
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

impl<C: Connection> GroupRepository for SurrealGroupRepository<C> {
    async fn get_by_id(&self, id: Uuid) -> GroveResult<Group> {
        self.first(
            "SELECT meta::id(id) AS record_id, * FROM type::record('group', $id)",
            "id",
            id.to_string(),
        )
        .await?
        .ok_or_else(|| {
            DbError::NotFound {
                entity: "group".into(),
                id: id.to_string(),
            }
            .into()
        })
    }

    async fn get_by_old_id(&self, old_id: &str) -> GroveResult<Group> {
        self.first(
            "SELECT meta::id(id) AS record_id, * FROM group \
             WHERE old_id = $old_id LIMIT 1",
            "old_id",
            old_id.to_string(),
        )
        .await?
        .ok_or_else(|| {
            DbError::NotFound {
                entity: "group".into(),
                id: old_id.to_string(),
            }
            .into()
        })
    }

    async fn find_by_name(&self, name: &str) -> GroveResult<Option<Group>> {
        self.first(
            "SELECT meta::id(id) AS record_id, * FROM group \
             WHERE name_key = $name_key LIMIT 1",
            "name_key",
            name_key(name),
        )
        .await
    }

    async fn get_many(&self, ids: &[Uuid]) -> GroveResult<Vec<Group>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM group WHERE meta::id(id) IN $ids")
            .bind(("ids", uuid_strings(ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<GroupRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_groups(rows)?)
    }

    async fn search(
        &self,
        filter: &GroupFilter,
        pagination: Pagination,
    ) -> GroveResult<PaginatedResult<Group>> {
        let clause = filter_clause(filter);
        let query = format!(
            "SELECT count() AS total FROM group{clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM group{clause} \
             ORDER BY old_id DESC \
             LIMIT $limit START $offset"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("limit", pagination.limit()))
            .bind(("offset", pagination.offset()));
        if let Some(ids) = &filter.ids {
            builder = builder.bind(("ids", uuid_strings(ids)));
        }
        if let Some(name) = &filter.name {
            builder = builder.bind(("name", name.to_lowercase()));
        }
        if let Some(old_id) = &filter.old_id {
            builder = builder.bind(("old_id", old_id.clone()));
        }
        if let Some(sso_id) = &filter.sso_id {
            builder = builder.bind(("sso_id", sso_id.to_lowercase()));
        }
        if let Some(organization_id) = &filter.organization_id {
            builder = builder.bind(("organization_id", organization_id.to_lowercase()));
        }
        if let Some(self_register) = filter.self_register {
            builder = builder.bind(("self_register", self_register));
        }
        if let Some(private_group) = filter.private_group {
            builder = builder.bind(("private_group", private_group));
        }
        if let Some(status) = filter.status {
            builder = builder.bind(("status", status.as_str().to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);
        let rows: Vec<GroupRow> = result.take(1).map_err(DbError::from)?;

        Ok(PaginatedResult::new(
            rows_into_groups(rows)?,
            pagination,
            total,
        ))
    }

    async fn sub_groups(&self, id: Uuid) -> GroveResult<Vec<Group>> {
        self.related(
            "SELECT meta::id(id) AS record_id, * FROM group \
             WHERE id IN (\
                 SELECT VALUE out FROM has_sub_group \
                 WHERE in = type::record('group', $id)\
             )",
            id,
        )
        .await
    }

    async fn parent_groups(&self, id: Uuid) -> GroveResult<Vec<Group>> {
        self.related(
            "SELECT meta::id(id) AS record_id, * FROM group \
             WHERE id IN (\
                 SELECT VALUE in FROM has_sub_group \
                 WHERE out = type::record('group', $id)\
             )",
            id,
        )
        .await
    }

    async fn tracked_ids(&self, organization_id: Option<&str>) -> GroveResult<Vec<Uuid>> {
        let mut query = String::from(
            "SELECT VALUE meta::id(id) FROM group \
             WHERE status = 'active' AND old_id != NONE",
        );
        if organization_id.is_some() {
            query.push_str(" AND organization_id = $organization_id");
        }

        let mut builder = self.db.query(&query);
        if let Some(organization_id) = organization_id {
            builder = builder.bind(("organization_id", organization_id.to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let ids: Vec<String> = result.take(0).map_err(DbError::from)?;
        Ok(parse_uuids(ids, "group")?)
    }
}
