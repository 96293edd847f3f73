//! Read side: group search, single-group views with hierarchy expansion,
//! and member-count aggregation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use grove_core::error::{GroveError, GroveResult};
use grove_core::models::auth::AuthUser;
use grove_core::models::group::{Group, GroupField, GroupKey, GroupStatus};
use grove_core::models::membership::MembershipType;
use grove_core::repository::{
    GroupFilter, GroupRepository, MembershipRepository, PaginatedResult, Pagination, Store,
    UserRepository,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::access;
use crate::config::ServiceConfig;
use crate::hierarchy::{Direction, HierarchyEngine};

/// Attributes hidden from non-admin callers.
const ADMIN_FIELDS: [&str; 3] = ["createdBy", "updatedBy", "status"];
const SUB_GROUPS: &str = "subGroups";
const PARENT_GROUPS: &str = "parentGroups";
const FLATTEN_GROUP_ID_TREE: &str = "flattenGroupIdTree";

fn default_page() -> u64 {
    1
}

fn default_per_page() -> u64 {
    20
}

fn default_true() -> bool {
    true
}

/// Group search criteria.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSearch {
    pub member_id: Option<String>,
    #[serde(rename = "universalUID")]
    pub universal_uid: Option<String>,
    pub membership_type: Option<MembershipType>,
    pub name: Option<String>,
    pub old_id: Option<String>,
    pub sso_id: Option<String>,
    pub organization_id: Option<String>,
    pub self_register: Option<bool>,
    pub private_group: Option<bool>,
    /// Honoured for admins only; everyone else sees active groups.
    pub status: Option<GroupStatus>,
    #[serde(default)]
    pub include_sub_groups: bool,
    #[serde(default)]
    pub include_parent_group: bool,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

impl Default for GroupSearch {
    fn default() -> Self {
        Self {
            member_id: None,
            universal_uid: None,
            membership_type: None,
            name: None,
            old_id: None,
            sso_id: None,
            organization_id: None,
            self_register: None,
            private_group: None,
            status: None,
            include_sub_groups: false,
            include_parent_group: false,
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

/// Options of a single-group read.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetGroupOptions {
    #[serde(default)]
    pub include_sub_groups: bool,
    #[serde(default)]
    pub include_parent_group: bool,
    /// One level of sub/parent groups, or the configured depth when false.
    #[serde(default = "default_true")]
    pub one_level: bool,
    /// Comma separated projection.
    pub fields: Option<String>,
    #[serde(default)]
    pub flatten_group_id_tree: bool,
}

impl Default for GetGroupOptions {
    fn default() -> Self {
        Self {
            include_sub_groups: false,
            include_parent_group: false,
            one_level: true,
            fields: None,
            flatten_group_id_tree: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberCountQuery {
    #[serde(default)]
    pub include_sub_groups: bool,
    #[serde(rename = "universalUID")]
    pub universal_uid: Option<String>,
    pub organization_id: Option<String>,
}

/// Member count of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberCount {
    pub id: Uuid,
    pub old_id: Option<String>,
    pub count: u64,
}

pub struct QueryService<S: Store> {
    store: Arc<S>,
    hierarchy: HierarchyEngine<S>,
}

impl<S: Store> QueryService<S> {
    pub fn new(store: Arc<S>, config: &ServiceConfig) -> Self {
        Self {
            hierarchy: HierarchyEngine::new(Arc::clone(&store), config.max_depth),
            store,
        }
    }

    /// Paginated search ordered by legacy id, descending.
    pub async fn search_groups(
        &self,
        criteria: GroupSearch,
        is_admin: bool,
    ) -> GroveResult<PaginatedResult<Value>> {
        let has_member = criteria.member_id.is_some() || criteria.universal_uid.is_some();
        match (has_member, criteria.membership_type) {
            (true, None) => {
                return Err(GroveError::bad_request(
                    "The membershipType parameter should be provided if memberId or universalUID is provided.",
                ));
            }
            (false, Some(_)) => {
                return Err(GroveError::bad_request(
                    "The memberId or universalUID parameter should be provided if membershipType is provided.",
                ));
            }
            _ => {}
        }

        let store = self.store.as_ref();
        let pagination = Pagination::new(criteria.page, criteria.per_page);

        let mut filter = GroupFilter {
            ids: None,
            name: criteria.name,
            old_id: criteria.old_id,
            sso_id: criteria.sso_id,
            organization_id: criteria.organization_id,
            self_register: criteria.self_register,
            private_group: criteria.private_group,
            status: if is_admin {
                criteria.status
            } else {
                Some(GroupStatus::Active)
            },
        };

        if let Some(membership_type) = criteria.membership_type {
            let member_ids = match (criteria.member_id, criteria.universal_uid) {
                (Some(member_id), _) => vec![member_id],
                (None, Some(uid)) => store
                    .users()
                    .ids_by_universal_uid(&uid)
                    .await?
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect(),
                (None, None) => Vec::new(),
            };
            if member_ids.is_empty() {
                return Ok(PaginatedResult::new(Vec::new(), pagination, 0));
            }
            let group_ids = store
                .memberships()
                .group_ids_for_members(&member_ids, membership_type)
                .await?;
            filter.ids = Some(group_ids);
        }

        debug!(?filter, "Searching groups");
        let page = store.groups().search(&filter, pagination).await?;

        let mut data = Vec::with_capacity(page.data.len());
        for group in &page.data {
            let mut value = to_json(group)?;
            if criteria.include_parent_group {
                let parents = store.groups().parent_groups(group.id).await?;
                insert(&mut value, PARENT_GROUPS, to_json(&parents)?);
            }
            if criteria.include_sub_groups {
                let subs = store.groups().sub_groups(group.id).await?;
                insert(&mut value, SUB_GROUPS, to_json(&subs)?);
            }
            if !is_admin {
                redact(&mut value);
            }
            data.push(value);
        }

        Ok(PaginatedResult {
            data,
            page: page.page,
            per_page: page.per_page,
            total: page.total,
        })
    }

    /// One group by id or legacy id, optionally with its sub-group or
    /// parent-group tree and a flat list of descendant ids.
    pub async fn get_group(
        &self,
        actor: &AuthUser,
        key: &GroupKey,
        options: GetGroupOptions,
    ) -> GroveResult<Value> {
        if options.include_sub_groups && options.include_parent_group {
            return Err(GroveError::bad_request(
                "includeSubGroups and includeParentGroup can not be both true",
            ));
        }
        let fields = parse_fields(options.fields.as_deref())?;

        let store = self.store.as_ref();
        let group = store.groups().get(key).await?;
        if group.private_group && !actor.is_admin {
            access::ensure_member(store, group.id, actor).await?;
        }

        let levels = if options.one_level {
            1
        } else {
            self.hierarchy.max_depth()
        };

        let mut keys: Vec<&str> = fields.iter().map(|f| f.as_str()).collect();
        let mut value = to_json(&group)?;

        if options.include_sub_groups {
            let tree = self.tree(group.id, levels, Direction::Down).await?;
            insert(&mut value, SUB_GROUPS, Value::Array(tree));
            keys.push(SUB_GROUPS);
        }
        if options.include_parent_group {
            let tree = self.tree(group.id, levels, Direction::Up).await?;
            insert(&mut value, PARENT_GROUPS, Value::Array(tree));
            keys.push(PARENT_GROUPS);
        }
        if options.flatten_group_id_tree {
            let ids = self
                .hierarchy
                .resolve_descendants(group.id, self.hierarchy.max_depth())
                .await?;
            insert(&mut value, FLATTEN_GROUP_ID_TREE, to_json(&ids)?);
            keys.push(FLATTEN_GROUP_ID_TREE);
        }

        let mut value = project(value, &keys);
        if !actor.is_admin {
            redact(&mut value);
        }
        Ok(value)
    }

    /// Member count of an active group, optionally aggregated over its
    /// sub-group tree.
    pub async fn get_group_members_count(
        &self,
        group_id: Uuid,
        include_sub_groups: bool,
    ) -> GroveResult<u64> {
        access::visible_group_by_id(self.store.as_ref(), group_id, false).await?;
        self.hierarchy
            .count_members(group_id, include_sub_groups)
            .await
    }

    /// Member counts of every active group carrying a legacy id, ordered
    /// by group id.
    pub async fn list_groups_member_count(
        &self,
        query: MemberCountQuery,
    ) -> GroveResult<Vec<GroupMemberCount>> {
        let store = self.store.as_ref();
        let organization_id = query.organization_id.as_deref();

        let member_ids = match &query.universal_uid {
            Some(uid) => {
                let members: HashSet<String> = store
                    .memberships()
                    .distinct_member_ids(MembershipType::User)
                    .await?
                    .into_iter()
                    .collect();
                let ids: Vec<String> = store
                    .users()
                    .ids_by_universal_uid(uid)
                    .await?
                    .into_iter()
                    .map(|id| id.to_string())
                    .filter(|id| members.contains(id))
                    .collect();
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                Some(ids)
            }
            None => None,
        };

        let filtered = self
            .hierarchy
            .tracked_counts(organization_id, member_ids.as_deref())
            .await?;

        let mut counts: Vec<(Uuid, u64)> = if query.include_sub_groups {
            let all = match member_ids {
                Some(_) => self.hierarchy.tracked_counts(organization_id, None).await?,
                None => filtered.clone(),
            };
            let mut totals = Vec::with_capacity(filtered.len());
            for root in filtered.keys() {
                totals.push((*root, self.hierarchy.tree_count(*root, &all).await?));
            }
            totals
        } else {
            filtered.into_iter().collect()
        };
        counts.sort_by_key(|(id, _)| *id);

        let ids: Vec<Uuid> = counts.iter().map(|(id, _)| *id).collect();
        let old_ids: HashMap<Uuid, Option<String>> = store
            .groups()
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|g| (g.id, g.old_id))
            .collect();

        Ok(counts
            .into_iter()
            .map(|(id, count)| GroupMemberCount {
                id,
                old_id: old_ids.get(&id).cloned().flatten(),
                count,
            })
            .collect())
    }

    /// Nested sub-group or parent-group tree, `levels` deep. The deepest
    /// level carries no nested key.
    async fn tree(&self, root: Uuid, levels: usize, direction: Direction) -> GroveResult<Vec<Value>> {
        let groups = self.store.groups();
        let key = match direction {
            Direction::Down => SUB_GROUPS,
            Direction::Up => PARENT_GROUPS,
        };

        // Level by level: (owner id, related group).
        let mut tiers: Vec<Vec<(Uuid, Group)>> = Vec::new();
        let mut frontier = vec![root];
        for _ in 0..levels {
            let mut tier = Vec::new();
            for id in &frontier {
                let related = match direction {
                    Direction::Down => groups.sub_groups(*id).await?,
                    Direction::Up => groups.parent_groups(*id).await?,
                };
                tier.extend(related.into_iter().map(|g| (*id, g)));
            }
            frontier = tier.iter().map(|(_, g)| g.id).collect();
            tiers.push(tier);
        }

        let mut below: HashMap<Uuid, Vec<Value>> = HashMap::new();
        for (depth, tier) in tiers.into_iter().enumerate().rev() {
            let nested = depth + 1 < levels;
            let mut current: HashMap<Uuid, Vec<Value>> = HashMap::new();
            for (owner, group) in tier {
                let mut value = to_json(&group)?;
                if nested {
                    let children = below.get(&group.id).cloned().unwrap_or_default();
                    insert(&mut value, key, Value::Array(children));
                }
                current.entry(owner).or_default().push(value);
            }
            below = current;
        }

        Ok(below.remove(&root).unwrap_or_default())
    }
}

/// Parses a comma separated field list. `None` or an empty string selects
/// every field.
pub fn parse_fields(fields: Option<&str>) -> GroveResult<Vec<GroupField>> {
    let Some(raw) = fields.filter(|f| !f.is_empty()) else {
        return Ok(GroupField::ALL.to_vec());
    };

    let mut parsed = Vec::new();
    for name in raw.split(',') {
        if name.trim().is_empty() {
            return Err(GroveError::bad_request("The input string is empty"));
        }
        let field = name.parse::<GroupField>().map_err(|_| {
            let allowed: Vec<&str> = GroupField::ALL.iter().map(|f| f.as_str()).collect();
            GroveError::bad_request(format!(
                "Field name {name} is not allowed, allowed field names: {allowed:?}"
            ))
        })?;
        if parsed.contains(&field) {
            return Err(GroveError::bad_request(format!(
                "There are duplicate field names: {name}"
            )));
        }
        parsed.push(field);
    }
    Ok(parsed)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> GroveResult<Value> {
    serde_json::to_value(value).map_err(|e| GroveError::Internal(e.to_string()))
}

fn insert(value: &mut Value, key: &str, entry: Value) {
    if let Value::Object(object) = value {
        object.insert(key.to_string(), entry);
    }
}

/// Keeps only `keys` of a JSON object.
fn project(value: Value, keys: &[&str]) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .filter(|(k, _)| keys.contains(&k.as_str()))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Removes admin-only attributes, including those of nested groups.
fn redact(value: &mut Value) {
    let Value::Object(object) = value else {
        return;
    };
    for field in ADMIN_FIELDS {
        object.remove(field);
    }
    for key in [SUB_GROUPS, PARENT_GROUPS] {
        if let Some(Value::Array(items)) = object.get_mut(key) {
            items.iter_mut().for_each(redact);
        }
    }
}
