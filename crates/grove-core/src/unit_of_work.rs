//! Batched writes committed atomically by a [`Store`](crate::repository::Store).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::group::Group;
use crate::models::membership::{GroupRole, Membership, RoleGrant};
use crate::models::user::User;

/// A single write inside a [`UnitOfWork`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    InsertGroup(Group),
    /// Replaces every mutable column of an existing group.
    UpdateGroup(Group),
    InsertUser(User),
    /// Inserts a membership row. For group members the store also writes
    /// the mirrored parent→child sub-group edge. Fails with not found when
    /// the group, or a member group, no longer exists.
    InsertMembership(Membership),
    /// Removes the `(group_id, member_id)` row and its mirrored edge.
    DeleteMembership { group_id: Uuid, member_id: String },
    /// Appends a grant to the stored role list. Fails with a conflict when
    /// the stored list already holds the role.
    GrantRole {
        membership_id: Uuid,
        grant: RoleGrant,
        updated_by: String,
        updated_at: DateTime<Utc>,
    },
    /// Removes a role from the stored list; an emptied list becomes absent.
    /// Fails with a bad request when the stored list lacks the role.
    RevokeRole {
        membership_id: Uuid,
        role: GroupRole,
        updated_by: String,
        updated_at: DateTime<Utc>,
    },
    /// Deletes the groups, every membership referencing them on either side,
    /// and their mirrored edges.
    ///
    /// Fails with a conflict, deleting nothing, when a group in `exclusive`
    /// is at that point a member of a group outside `scope`.
    DeleteGroups {
        ids: Vec<Uuid>,
        exclusive: Vec<Uuid>,
        scope: Vec<Uuid>,
    },
}

/// An ordered list of writes that either all apply or none do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitOfWork {
    ops: Vec<WriteOp>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn insert_group(&mut self, group: Group) -> &mut Self {
        self.push(WriteOp::InsertGroup(group))
    }

    pub fn update_group(&mut self, group: Group) -> &mut Self {
        self.push(WriteOp::UpdateGroup(group))
    }

    pub fn insert_user(&mut self, user: User) -> &mut Self {
        self.push(WriteOp::InsertUser(user))
    }

    pub fn insert_membership(&mut self, membership: Membership) -> &mut Self {
        self.push(WriteOp::InsertMembership(membership))
    }

    pub fn delete_membership(&mut self, group_id: Uuid, member_id: impl Into<String>) -> &mut Self {
        self.push(WriteOp::DeleteMembership {
            group_id,
            member_id: member_id.into(),
        })
    }

    pub fn grant_role(
        &mut self,
        membership_id: Uuid,
        grant: RoleGrant,
        updated_by: impl Into<String>,
    ) -> &mut Self {
        self.push(WriteOp::GrantRole {
            membership_id,
            grant,
            updated_by: updated_by.into(),
            updated_at: Utc::now(),
        })
    }

    pub fn revoke_role(
        &mut self,
        membership_id: Uuid,
        role: GroupRole,
        updated_by: impl Into<String>,
    ) -> &mut Self {
        self.push(WriteOp::RevokeRole {
            membership_id,
            role,
            updated_by: updated_by.into(),
            updated_at: Utc::now(),
        })
    }

    /// Unconditional group deletion.
    pub fn delete_groups(&mut self, ids: Vec<Uuid>) -> &mut Self {
        self.delete_group_tree(ids, Vec::new(), Vec::new())
    }

    /// Group deletion guarded against `exclusive` groups having gained a
    /// parent outside `scope` since they were read.
    pub fn delete_group_tree(
        &mut self,
        ids: Vec<Uuid>,
        exclusive: Vec<Uuid>,
        scope: Vec<Uuid>,
    ) -> &mut Self {
        self.push(WriteOp::DeleteGroups {
            ids,
            exclusive,
            scope,
        })
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}
