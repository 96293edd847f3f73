//! Group hierarchy engine.
//!
//! Sub-group trees are walked level by level over `group`-type membership
//! edges. Every walk is bounded by a depth, so a cyclic hierarchy cannot
//! loop forever; it only yields repeated ids, which are deduplicated.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use grove_core::error::{GroveError, GroveResult};
use grove_core::models::group::Group;
use grove_core::repository::{GroupEdge, GroupRepository, MembershipRepository, Store};
use grove_core::unit_of_work::UnitOfWork;
use tracing::{debug, info};
use uuid::Uuid;

/// Direction of a hierarchy walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Parent → child.
    Down,
    /// Child → parent.
    Up,
}

impl Direction {
    fn target(self, edge: &GroupEdge) -> Uuid {
        match self {
            Self::Down => edge.child,
            Self::Up => edge.parent,
        }
    }
}

/// Groups removed by a cascading delete.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionPlan {
    pub root: Uuid,
    /// Deleted ids, root first.
    pub ids: Vec<Uuid>,
    /// The root and every descendant, spared or not.
    pub candidates: Vec<Uuid>,
}

impl DeletionPlan {
    /// Deleted ids other than the root.
    pub fn descendants(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.ids.iter().copied().filter(move |id| *id != self.root)
    }
}

/// Collects ids in first-seen order without repeats.
#[derive(Debug, Default)]
struct Ordered {
    seen: HashSet<Uuid>,
    ids: Vec<Uuid>,
}

impl Ordered {
    fn push(&mut self, id: Uuid) -> bool {
        let fresh = self.seen.insert(id);
        if fresh {
            self.ids.push(id);
        }
        fresh
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }
}

/// Traversal, cascade and aggregation rules over the group hierarchy.
pub struct HierarchyEngine<S: Store> {
    store: Arc<S>,
    max_depth: usize,
}

impl<S: Store> Clone for HierarchyEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_depth: self.max_depth,
        }
    }
}

impl<S: Store> HierarchyEngine<S> {
    pub fn new(store: Arc<S>, max_depth: usize) -> Self {
        Self {
            store,
            max_depth: max_depth.max(1),
        }
    }

    /// Configured traversal bound.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Walks up to `levels` levels away from `start` in `direction`.
    ///
    /// Returns every reached id once, in breadth-first order. Nodes are
    /// not excluded from later levels once visited, so a cycle may lead
    /// back to a start node; the bound still holds.
    pub async fn walk(
        &self,
        start: &[Uuid],
        levels: usize,
        direction: Direction,
    ) -> GroveResult<Vec<Uuid>> {
        let memberships = self.store.memberships();
        let mut found = Ordered::default();
        let mut frontier: Vec<Uuid> = start.to_vec();

        for depth in 1..=levels {
            if frontier.is_empty() {
                break;
            }

            let edges = match direction {
                Direction::Down => memberships.child_edges(&frontier).await?,
                Direction::Up => memberships.parent_edges(&frontier).await?,
            };

            let mut next = Ordered::default();
            for edge in &edges {
                let id = direction.target(edge);
                next.push(id);
                found.push(id);
            }

            debug!(depth, ?direction, reached = next.ids.len(), "Walked hierarchy level");
            frontier = next.ids;
        }

        Ok(found.ids)
    }

    /// Group ids reachable through outgoing `group`-type edges.
    pub async fn resolve_descendants(
        &self,
        group_id: Uuid,
        max_depth: usize,
    ) -> GroveResult<Vec<Uuid>> {
        self.walk(&[group_id], max_depth, Direction::Down).await
    }

    /// Group ids reachable through incoming `group`-type edges.
    pub async fn resolve_ancestors(
        &self,
        group_id: Uuid,
        max_depth: usize,
    ) -> GroveResult<Vec<Uuid>> {
        self.walk(&[group_id], max_depth, Direction::Up).await
    }

    /// What a cascading delete of `group_id` removes.
    ///
    /// The group and its descendants are candidates. A descendant that is
    /// also a member of a group outside the candidates is kept, but its own
    /// descendants are not.
    pub async fn deletion_plan(&self, group_id: Uuid) -> GroveResult<DeletionPlan> {
        let descendants = self.resolve_descendants(group_id, self.max_depth).await?;

        let mut candidates = Ordered::default();
        candidates.push(group_id);
        for id in &descendants {
            candidates.push(*id);
        }

        let spared: HashSet<Uuid> = self
            .store
            .memberships()
            .parent_edges(&descendants)
            .await?
            .into_iter()
            .filter(|edge| !candidates.contains(&edge.parent))
            .map(|edge| edge.child)
            .collect();

        let ids = candidates
            .ids
            .iter()
            .copied()
            .filter(|id| !spared.contains(id))
            .collect();
        Ok(DeletionPlan {
            root: group_id,
            ids,
            candidates: candidates.ids,
        })
    }

    /// Deletes `group_id` and its exclusively owned descendants together
    /// with every membership and sub-group edge referencing them, in one
    /// unit of work. Returns the deleted groups.
    ///
    /// The commit fails with a conflict if a deleted descendant gained a
    /// parent outside the tree after the plan was read.
    pub async fn cascade_delete(&self, group_id: Uuid) -> GroveResult<Vec<Group>> {
        let plan = self.deletion_plan(group_id).await?;

        let mut by_id: HashMap<Uuid, Group> = self
            .store
            .groups()
            .get_many(&plan.ids)
            .await?
            .into_iter()
            .map(|group| (group.id, group))
            .collect();
        let deleted: Vec<Group> = plan.ids.iter().filter_map(|id| by_id.remove(id)).collect();

        let exclusive = plan.descendants().collect();
        let mut work = UnitOfWork::new();
        work.delete_group_tree(plan.ids, exclusive, plan.candidates);
        self.store.commit(work).await?;

        info!(%group_id, deleted = deleted.len(), "Cascade deleted groups");
        Ok(deleted)
    }

    /// Direct member count, or the tree aggregate when `include_sub_groups`.
    pub async fn count_members(&self, group_id: Uuid, include_sub_groups: bool) -> GroveResult<u64> {
        if !include_sub_groups {
            return self.store.memberships().count_by_group(group_id).await;
        }

        let counts = self.tracked_counts(None, None).await?;
        self.tree_count(group_id, &counts).await
    }

    /// Direct member counts of active groups carrying a legacy id,
    /// optionally restricted to one organization and to given members.
    pub async fn tracked_counts(
        &self,
        organization_id: Option<&str>,
        member_ids: Option<&[String]>,
    ) -> GroveResult<HashMap<Uuid, u64>> {
        let tracked = self.store.groups().tracked_ids(organization_id).await?;
        if tracked.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .store
            .memberships()
            .count_by_groups(&tracked, member_ids)
            .await?
            .into_iter()
            .collect())
    }

    /// Tree aggregate of `root`: its own count plus, for every bounded
    /// descendant, one for the sub-group itself and its own count.
    pub async fn tree_count(&self, root: Uuid, counts: &HashMap<Uuid, u64>) -> GroveResult<u64> {
        let descendants = self.resolve_descendants(root, self.max_depth).await?;
        let own = counts.get(&root).copied().unwrap_or(0);
        Ok(own
            + descendants
                .iter()
                .map(|id| counts.get(id).copied().unwrap_or(0) + 1)
                .sum::<u64>())
    }
}

/// A private parent only accepts private children.
pub fn ensure_privacy_inherited(parent: &Group, child_private: bool) -> GroveResult<()> {
    if parent.private_group && !child_private {
        return Err(GroveError::conflict(
            "Parent group is private, the child group must be private too.",
        ));
    }
    Ok(())
}

/// A group can never become its own member.
pub fn ensure_not_self(group_id: Uuid, child_id: Uuid) -> GroveResult<()> {
    if group_id == child_id {
        return Err(GroveError::bad_request("A group can not add to itself."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use grove_core::models::group::CreateGroup;

    use super::*;

    fn group(private_group: bool) -> Group {
        Group::new(
            CreateGroup {
                name: "g".into(),
                private_group,
                ..Default::default()
            },
            "1",
        )
    }

    #[test]
    fn ordered_keeps_first_occurrence() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut ordered = Ordered::default();
        assert!(ordered.push(a));
        assert!(ordered.push(b));
        assert!(!ordered.push(a));
        assert_eq!(ordered.ids, vec![a, b]);
    }

    #[test]
    fn private_parent_requires_private_child() {
        assert!(ensure_privacy_inherited(&group(false), false).is_ok());
        assert!(ensure_privacy_inherited(&group(true), true).is_ok());
        assert!(matches!(
            ensure_privacy_inherited(&group(true), false),
            Err(GroveError::Conflict { .. })
        ));
    }

    #[test]
    fn self_membership_is_rejected() {
        let id = Uuid::new_v4();
        let spelled = Uuid::parse_str(&id.to_string().to_uppercase()).unwrap();
        assert!(matches!(
            ensure_not_self(id, spelled),
            Err(GroveError::BadRequest { .. })
        ));
        assert!(ensure_not_self(id, Uuid::new_v4()).is_ok());
    }
}
