//! Executes a [`UnitOfWork`] as one SurrealDB transaction.
//!
//! Every operation is rendered into SurrealQL statements between
//! `BEGIN TRANSACTION` and `COMMIT TRANSACTION`. Operation values travel
//! in a single bound `$ops` array and are addressed as `$ops[i].field`;
//! only UUIDs are ever interpolated into the statement text. Optional
//! values are left out of the bound object so that they read as NONE.

use grove_core::models::group::Group;
use grove_core::models::membership::{MemberRef, Membership};
use grove_core::models::user::User;
use grove_core::unit_of_work::{UnitOfWork, WriteOp};
use serde_json::{Map, Value, json};
use surrealdb::{Connection, Surreal};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CONFLICT_MARK, DbError, NOT_FOUND_MARK, REJECTED_MARK};
use crate::repository::membership::{encode_grant, encode_roles};

/// A rendered transaction: statement text plus the `$ops` binding.
#[derive(Debug)]
pub(crate) struct Script {
    pub(crate) sql: String,
    pub(crate) ops: Value,
}

fn put(object: &mut Map<String, Value>, key: &str, value: Option<impl Into<Value>>) {
    if let Some(value) = value {
        object.insert(key.to_string(), value.into());
    }
}

fn group_values(group: &Group) -> Value {
    let mut object = Map::new();
    put(&mut object, "id", Some(group.id.to_string()));
    put(&mut object, "old_id", group.old_id.clone());
    put(&mut object, "name", Some(group.name.clone()));
    put(&mut object, "name_key", Some(group.name_key()));
    put(&mut object, "description", group.description.clone());
    put(&mut object, "organization_id", Some(group.organization_id.clone()));
    put(&mut object, "domain", Some(group.domain.clone()));
    put(&mut object, "sso_id", Some(group.sso_id.clone()));
    put(&mut object, "private_group", Some(group.private_group));
    put(&mut object, "self_register", Some(group.self_register));
    put(&mut object, "status", Some(group.status.as_str()));
    put(&mut object, "created_by", Some(group.created_by.clone()));
    put(&mut object, "created_at", Some(group.created_at.to_rfc3339()));
    put(&mut object, "updated_by", group.updated_by.clone());
    put(&mut object, "updated_at", Some(group.updated_at.to_rfc3339()));
    Value::Object(object)
}

fn user_values(user: &User) -> Value {
    json!({
        "id": user.id.to_string(),
        "universal_uid": user.universal_uid,
        "created_by": user.created_by,
        "created_at": user.created_at.to_rfc3339(),
    })
}

fn membership_values(membership: &Membership) -> Value {
    let mut object = Map::new();
    put(&mut object, "id", Some(membership.id.to_string()));
    put(&mut object, "group_id", Some(membership.group_id.to_string()));
    put(&mut object, "member_id", Some(membership.member.id()));
    put(
        &mut object,
        "membership_type",
        Some(membership.member.membership_type().as_str()),
    );
    put(&mut object, "roles", encode_roles(membership.roles.as_deref()));
    put(&mut object, "created_by", Some(membership.created_by.clone()));
    put(&mut object, "created_at", Some(membership.created_at.to_rfc3339()));
    put(&mut object, "updated_by", membership.updated_by.clone());
    put(&mut object, "updated_at", Some(membership.updated_at.to_rfc3339()));
    Value::Object(object)
}

fn group_columns(p: &str) -> String {
    format!(
        "old_id = {p}.old_id, \
         name = {p}.name, \
         name_key = {p}.name_key, \
         description = {p}.description, \
         organization_id = {p}.organization_id, \
         domain = {p}.domain, \
         sso_id = {p}.sso_id, \
         private_group = {p}.private_group, \
         self_register = {p}.self_register, \
         status = {p}.status, \
         updated_by = {p}.updated_by, \
         updated_at = <datetime> {p}.updated_at"
    )
}

fn ids(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

/// Loads the membership named by `{p}.id` into `$m{i}` or aborts.
fn load_membership(i: usize, p: &str) -> String {
    format!(
        "LET $m{i} = (SELECT * FROM ONLY type::record('group_membership', {p}.id));\n\
         IF $m{i} = NONE {{ THROW string::concat('{NOT_FOUND_MARK}group_membership ', {p}.id) }};\n"
    )
}

/// Aborts unless the group named by `expr` exists.
fn require_group(expr: &str) -> String {
    format!(
        "IF !record::exists(type::record('group', {expr})) \
         {{ THROW string::concat('{NOT_FOUND_MARK}group ', {expr}) }};\n"
    )
}

fn records(table: &str, ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(|id| format!("{table}:`{id}`")).collect()
}

/// Renders the operations of a unit of work into one transaction script.
pub(crate) fn render(work: &UnitOfWork) -> Script {
    let mut sql = String::from("BEGIN TRANSACTION;\n");
    let mut values = Vec::with_capacity(work.len());

    for (i, op) in work.ops().iter().enumerate() {
        let p = format!("$ops[{i}]");
        match op {
            WriteOp::InsertGroup(group) => {
                sql.push_str(&format!(
                    "CREATE type::record('group', {p}.id) SET {}, \
                     created_by = {p}.created_by, \
                     created_at = <datetime> {p}.created_at;\n",
                    group_columns(&p)
                ));
                values.push(group_values(group));
            }
            WriteOp::UpdateGroup(group) => {
                sql.push_str(&format!(
                    "UPDATE type::record('group', {p}.id) SET {};\n",
                    group_columns(&p)
                ));
                values.push(group_values(group));
            }
            WriteOp::InsertUser(user) => {
                sql.push_str(&format!(
                    "CREATE type::record('user', {p}.id) SET \
                     universal_uid = {p}.universal_uid, \
                     created_by = {p}.created_by, \
                     created_at = <datetime> {p}.created_at;\n"
                ));
                values.push(user_values(user));
            }
            WriteOp::InsertMembership(membership) => {
                sql.push_str(&require_group(&format!("{p}.group_id")));
                if let MemberRef::Group(_) = membership.member {
                    sql.push_str(&require_group(&format!("{p}.member_id")));
                }
                sql.push_str(&format!(
                    "CREATE type::record('group_membership', {p}.id) SET \
                     group_id = {p}.group_id, \
                     member_id = {p}.member_id, \
                     membership_type = {p}.membership_type, \
                     roles = {p}.roles, \
                     created_by = {p}.created_by, \
                     created_at = <datetime> {p}.created_at, \
                     updated_by = {p}.updated_by, \
                     updated_at = <datetime> {p}.updated_at;\n"
                ));
                if let MemberRef::Group(child) = membership.member {
                    sql.push_str(&format!(
                        "RELATE group:`{}` -> has_sub_group -> group:`{child}`;\n",
                        membership.group_id
                    ));
                }
                values.push(membership_values(membership));
            }
            WriteOp::DeleteMembership {
                group_id,
                member_id,
            } => {
                sql.push_str(&format!(
                    "DELETE group_membership WHERE \
                     group_id = {p}.group_id AND member_id = {p}.member_id;\n"
                ));
                if let Ok(child) = Uuid::parse_str(member_id) {
                    sql.push_str(&format!(
                        "DELETE has_sub_group WHERE \
                         in = group:`{group_id}` AND out = group:`{child}`;\n"
                    ));
                }
                values.push(json!({
                    "group_id": group_id.to_string(),
                    "member_id": member_id,
                }));
            }
            WriteOp::GrantRole {
                membership_id,
                grant,
                updated_by,
                updated_at,
            } => {
                sql.push_str(&load_membership(i, &p));
                sql.push_str(&format!(
                    "IF {p}.grant.role IN ($m{i}.roles ?? []).role {{ THROW string::concat(\
                     '{CONFLICT_MARK}The group role: ', {p}.grant.role, \
                     ' of the member: ', $m{i}.member_id, \
                     ' is already in the group: ', $m{i}.group_id) }};\n\
                     UPDATE type::record('group_membership', {p}.id) SET \
                     roles = array::append(roles ?? [], {p}.grant), \
                     updated_by = {p}.updated_by, \
                     updated_at = <datetime> {p}.updated_at;\n"
                ));
                values.push(json!({
                    "id": membership_id.to_string(),
                    "grant": encode_grant(grant),
                    "updated_by": updated_by,
                    "updated_at": updated_at.to_rfc3339(),
                }));
            }
            WriteOp::RevokeRole {
                membership_id,
                role,
                updated_by,
                updated_at,
            } => {
                sql.push_str(&load_membership(i, &p));
                sql.push_str(&format!(
                    "IF {p}.role NOT IN ($m{i}.roles ?? []).role {{ THROW string::concat(\
                     '{REJECTED_MARK}Not found Group Role: ', {p}.role, \
                     ' of Member: ', $m{i}.member_id, \
                     ' in the Group ', $m{i}.group_id) }};\n\
                     LET $r{i} = ($m{i}.roles ?? [])[WHERE role != {p}.role];\n\
                     UPDATE type::record('group_membership', {p}.id) SET \
                     roles = IF array::len($r{i}) = 0 {{ NONE }} ELSE {{ $r{i} }}, \
                     updated_by = {p}.updated_by, \
                     updated_at = <datetime> {p}.updated_at;\n"
                ));
                values.push(json!({
                    "id": membership_id.to_string(),
                    "role": role.as_str(),
                    "updated_by": updated_by,
                    "updated_at": updated_at.to_rfc3339(),
                }));
            }
            WriteOp::DeleteGroups {
                ids: targets,
                exclusive,
                scope,
            } => {
                if !exclusive.is_empty() {
                    sql.push_str(&format!(
                        "IF array::len((SELECT id FROM group_membership WHERE \
                         membership_type = 'group' AND member_id IN {p}.exclusive \
                         AND group_id NOT IN {p}.scope)) > 0 \
                         {{ THROW '{CONFLICT_MARK}A group gained a parent during deletion' }};\n"
                    ));
                }
                if !targets.is_empty() {
                    let refs = records("group", targets);
                    let list = format!("[{}]", refs.join(", "));
                    sql.push_str(&format!(
                        "DELETE group_membership WHERE \
                         group_id IN {p}.ids OR member_id IN {p}.ids;\n\
                         DELETE has_sub_group WHERE in IN {list} OR out IN {list};\n\
                         DELETE {};\n",
                        refs.join(", ")
                    ));
                }
                values.push(json!({
                    "ids": ids(targets),
                    "exclusive": ids(exclusive),
                    "scope": ids(scope),
                }));
            }
        }
    }

    sql.push_str("COMMIT TRANSACTION;");
    Script {
        sql,
        ops: Value::Array(values),
    }
}

/// Runs the unit of work inside a single SurrealDB transaction.
pub async fn execute<C: Connection>(db: &Surreal<C>, work: UnitOfWork) -> Result<(), DbError> {
    if work.is_empty() {
        return Ok(());
    }

    let script = render(&work);
    debug!(operations = work.len(), "Committing unit of work");

    let mut response = db.query(script.sql).bind(("ops", script.ops)).await?;
    let mut errors: Vec<_> = response.take_errors().into_iter().collect();
    if errors.is_empty() {
        return Ok(());
    }
    errors.sort_by_key(|(index, _)| *index);
    Err(DbError::from_statements(errors.into_iter().map(|(_, err)| err)))
}
