//! SurrealDB implementation of [`MembershipRepository`].
//!
//! Memberships live in the `group_membership` table with the member id
//! stored as a plain string next to its `membership_type`. Group-type rows
//! are mirrored in the `has_sub_group` relation by the unit-of-work
//! executor; the reads in this module only consult the membership table.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use grove_core::error::GroveResult;
use grove_core::models::membership::{
    GroupRole, MemberRef, Membership, MembershipType, RoleGrant,
};
use grove_core::repository::{GroupEdge, MembershipRepository, PaginatedResult, Pagination};
use serde_json::{Value, json};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::repository::group::uuid_strings;

#[derive(Debug, SurrealValue)]
struct MembershipRow {
    record_id: String,
    group_id: String,
    member_id: String,
    membership_type: String,
    roles: Option<Value>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_by: Option<String>,
    updated_at: DateTime<Utc>,
}

impl MembershipRow {
    fn try_into_membership(self) -> Result<Membership, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid membership UUID: {e}")))?;
        let group_id = Uuid::parse_str(&self.group_id)
            .map_err(|e| DbError::Decode(format!("invalid group UUID: {e}")))?;
        let membership_type = self
            .membership_type
            .parse::<MembershipType>()
            .map_err(DbError::Decode)?;
        let member =
            MemberRef::from_parts(membership_type, &self.member_id).map_err(DbError::Decode)?;
        Ok(Membership {
            id,
            group_id,
            member,
            roles: decode_roles(self.roles)?,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_by: self.updated_by,
            updated_at: self.updated_at,
        })
    }
}

fn rows_into_memberships(rows: Vec<MembershipRow>) -> Result<Vec<Membership>, DbError> {
    rows.into_iter()
        .map(MembershipRow::try_into_membership)
        .collect()
}

#[derive(Debug, SurrealValue)]
struct EdgeRow {
    group_id: String,
    member_id: String,
}

impl EdgeRow {
    fn try_into_edge(self) -> Result<GroupEdge, DbError> {
        let parent = Uuid::parse_str(&self.group_id)
            .map_err(|e| DbError::Decode(format!("invalid group UUID: {e}")))?;
        let child = Uuid::parse_str(&self.member_id)
            .map_err(|e| DbError::Decode(format!("invalid sub-group UUID: {e}")))?;
        Ok(GroupEdge { parent, child })
    }
}

#[derive(Debug, SurrealValue)]
struct GroupCountRow {
    group_id: String,
    total: u64,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Encodes a role list for storage. Empty lists are stored as absent.
pub(crate) fn encode_grant(grant: &RoleGrant) -> Value {
    json!({
        "role": grant.role.as_str(),
        "created_by": grant.created_by,
        "created_at": grant.created_at.to_rfc3339(),
    })
}

pub(crate) fn encode_roles(roles: Option<&[RoleGrant]>) -> Option<Value> {
    let roles = roles.filter(|r| !r.is_empty())?;
    Some(Value::Array(roles.iter().map(encode_grant).collect()))
}

fn decode_roles(value: Option<Value>) -> Result<Option<Vec<RoleGrant>>, DbError> {
    let Some(Value::Array(items)) = value else {
        return Ok(None);
    };

    let mut roles = Vec::with_capacity(items.len());
    for item in items {
        let field = |name: &str| {
            item.get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| DbError::Decode(format!("role entry missing {name}")))
        };
        let role = field("role")?.parse::<GroupRole>().map_err(DbError::Decode)?;
        let created_by = field("created_by")?.to_string();
        let created_at = DateTime::parse_from_rfc3339(field("created_at")?)
            .map_err(|e| DbError::Decode(format!("invalid role timestamp: {e}")))?
            .with_timezone(&Utc);
        roles.push(RoleGrant {
            role,
            created_by,
            created_at,
        });
    }

    Ok((!roles.is_empty()).then_some(roles))
}

/// SurrealDB implementation of the Membership repository.
#[derive(Clone)]
pub struct SurrealMembershipRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMembershipRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn edges(&self, query: &str, ids: &[Uuid]) -> GroveResult<Vec<GroupEdge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = self
            .db
            .query(query)
            .bind(("ids", uuid_strings(ids)))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<EdgeRow> = result.take(0).map_err(DbError::from)?;
        let edges = rows
            .into_iter()
            .map(EdgeRow::try_into_edge)
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(edges)
    }
}

impl<C: Connection> MembershipRepository for SurrealMembershipRepository<C> {
    async fn find(&self, group_id: Uuid, member_id: &str) -> GroveResult<Option<Membership>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM group_membership \
                 WHERE group_id = $group_id AND member_id = $member_id LIMIT 1",
            )
            .bind(("group_id", group_id.to_string()))
            .bind(("member_id", member_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(row.try_into_membership()?)),
            None => Ok(None),
        }
    }

    async fn list_by_group(
        &self,
        group_id: Uuid,
        pagination: Pagination,
    ) -> GroveResult<PaginatedResult<Membership>> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM group_membership \
                 WHERE group_id = $group_id GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM group_membership \
                 WHERE group_id = $group_id \
                 ORDER BY created_at ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("group_id", group_id.to_string()))
            .bind(("limit", pagination.limit()))
            .bind(("offset", pagination.offset()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);
        let rows: Vec<MembershipRow> = result.take(1).map_err(DbError::from)?;

        Ok(PaginatedResult::new(
            rows_into_memberships(rows)?,
            pagination,
            total,
        ))
    }

    async fn count_by_group(&self, group_id: Uuid) -> GroveResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM group_membership \
                 WHERE group_id = $group_id GROUP ALL",
            )
            .bind(("group_id", group_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(count_rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn list_by_member(&self, member_id: &str) -> GroveResult<Vec<Membership>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM group_membership \
                 WHERE member_id = $member_id",
            )
            .bind(("member_id", member_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<MembershipRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_memberships(rows)?)
    }

    async fn list_with_roles(
        &self,
        member_id: &str,
        pagination: Pagination,
    ) -> GroveResult<PaginatedResult<Membership>> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM group_membership \
                 WHERE member_id = $member_id AND membership_type = 'user' \
                 AND roles != NONE GROUP ALL; \
                 SELECT meta::id(id) AS record_id, * FROM group_membership \
                 WHERE member_id = $member_id AND membership_type = 'user' \
                 AND roles != NONE \
                 ORDER BY group_id DESC \
                 LIMIT $limit START $offset",
            )
            .bind(("member_id", member_id.to_string()))
            .bind(("limit", pagination.limit()))
            .bind(("offset", pagination.offset()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);
        let rows: Vec<MembershipRow> = result.take(1).map_err(DbError::from)?;

        Ok(PaginatedResult::new(
            rows_into_memberships(rows)?,
            pagination,
            total,
        ))
    }

    async fn group_ids_for_members(
        &self,
        member_ids: &[String],
        membership_type: MembershipType,
    ) -> GroveResult<Vec<Uuid>> {
        if member_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = self
            .db
            .query(
                "SELECT VALUE group_id FROM group_membership \
                 WHERE member_id IN $member_ids \
                 AND membership_type = $membership_type",
            )
            .bind(("member_ids", member_ids.to_vec()))
            .bind(("membership_type", membership_type.as_str().to_string()))
            .await
            .map_err(DbError::from)?;
        let ids: Vec<String> = result.take(0).map_err(DbError::from)?;

        let mut seen = BTreeSet::new();
        let mut group_ids = Vec::new();
        for id in ids {
            let id = Uuid::parse_str(&id)
                .map_err(|e| DbError::Decode(format!("invalid group UUID: {e}")))?;
            if seen.insert(id) {
                group_ids.push(id);
            }
        }
        Ok(group_ids)
    }

    async fn child_edges(&self, parents: &[Uuid]) -> GroveResult<Vec<GroupEdge>> {
        self.edges(
            "SELECT group_id, member_id FROM group_membership \
             WHERE membership_type = 'group' AND group_id IN $ids",
            parents,
        )
        .await
    }

    async fn parent_edges(&self, children: &[Uuid]) -> GroveResult<Vec<GroupEdge>> {
        self.edges(
            "SELECT group_id, member_id FROM group_membership \
             WHERE membership_type = 'group' AND member_id IN $ids",
            children,
        )
        .await
    }

    async fn count_by_groups(
        &self,
        group_ids: &[Uuid],
        member_ids: Option<&[String]>,
    ) -> GroveResult<Vec<(Uuid, u64)>> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = if member_ids.is_some() {
            "SELECT group_id, count() AS total FROM group_membership \
             WHERE group_id IN $group_ids AND member_id IN $member_ids \
             GROUP BY group_id"
        } else {
            "SELECT group_id, count() AS total FROM group_membership \
             WHERE group_id IN $group_ids \
             GROUP BY group_id"
        };

        let mut builder = self
            .db
            .query(query)
            .bind(("group_ids", uuid_strings(group_ids)));
        if let Some(member_ids) = member_ids {
            builder = builder.bind(("member_ids", member_ids.to_vec()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<GroupCountRow> = result.take(0).map_err(DbError::from)?;
        let counts = rows
            .into_iter()
            .map(|row| {
                Uuid::parse_str(&row.group_id)
                    .map(|id| (id, row.total))
                    .map_err(|e| DbError::Decode(format!("invalid group UUID: {e}")))
            })
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(counts)
    }

    async fn distinct_member_ids(&self, membership_type: MembershipType) -> GroveResult<Vec<String>> {
        let mut result = self
            .db
            .query(
                "SELECT VALUE member_id FROM group_membership \
                 WHERE membership_type = $membership_type",
            )
            .bind(("membership_type", membership_type.as_str().to_string()))
            .await
            .map_err(DbError::from)?;
        let ids: Vec<String> = result.take(0).map_err(DbError::from)?;
        let distinct: BTreeSet<String> = ids.into_iter().collect();
        Ok(distinct.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_role_lists_encode_as_absent() {
        assert!(encode_roles(Some(&[])).is_none());
        assert!(encode_roles(None).is_none());
    }

    #[test]
    fn roles_survive_storage_encoding() {
        let grant = RoleGrant {
            role: GroupRole::GroupAdmin,
            created_by: "42".into(),
            created_at: DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let encoded = encode_roles(Some(std::slice::from_ref(&grant)));
        assert_eq!(encoded.as_ref().unwrap()[0]["created_by"], "42");

        let decoded = decode_roles(encoded).unwrap().unwrap();
        assert_eq!(decoded, vec![grant]);
    }
}
