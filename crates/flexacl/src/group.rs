//! ACL groups and their parallel-search chains.
//!
//! A group holds an ordered list of ACLs of one direction. Groups can be
//! linked into a singly linked chain (`next`) that the device searches in
//! parallel; only the head of a chain may be bound.

use std::collections::HashSet;

use flexacl_common::{Arena, Query, QueryResult};
use flexacl_hw::{AclId, GroupId, GroupKind};

use crate::acl::AclStore;
use crate::config::PriorityRange;
use crate::error::{AclError, Result};
use crate::types::Direction;

/// An ACL group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclGroup {
    pub id: GroupId,
    pub direction: Direction,
    pub acls: Vec<AclId>,
    pub priority: u32,
    pub next: Option<GroupId>,
}

/// Group storage and chain bookkeeping.
#[derive(Debug, Clone)]
pub struct GroupManager {
    groups: Arena<AclGroup, GroupKind>,
    max_acls_per_group: usize,
    priorities: PriorityRange,
}

impl GroupManager {
    pub fn new(limit: usize, max_acls_per_group: usize, priorities: PriorityRange) -> Self {
        Self {
            groups: Arena::with_limit(limit),
            max_acls_per_group,
            priorities,
        }
    }

    pub fn default_priority(&self) -> u32 {
        self.priorities.default
    }

    pub fn plan_create(&self, direction: Direction) -> Result<GroupId> {
        if direction == Direction::MultiPoints {
            return Err(AclError::invalid(format!(
                "a group cannot have direction {}",
                direction
            )));
        }
        self.groups
            .next_handle()
            .ok_or_else(|| AclError::exhausted("group table is full"))
    }

    pub(crate) fn insert(&mut self, direction: Direction) -> Result<GroupId> {
        let priority = self.priorities.default;
        self.groups
            .insert_with(|id| AclGroup {
                id,
                direction,
                acls: Vec::new(),
                priority,
                next: None,
            })
            .ok_or_else(|| AclError::exhausted("group table is full"))
    }

    /// Validates a full membership list for `group`.
    pub fn plan_members(&self, group: GroupId, acls: &[AclId], store: &AclStore) -> Result<()> {
        let direction = self.get(group)?.direction;
        if acls.len() > self.max_acls_per_group {
            return Err(AclError::exhausted(format!(
                "{:?} would hold {} ACLs, limit is {}",
                group,
                acls.len(),
                self.max_acls_per_group
            )));
        }
        let mut seen = HashSet::new();
        for id in acls {
            let acl = store.get(*id)?;
            if !acl.serves(direction) {
                return Err(AclError::invalid(format!(
                    "{:?} does not serve {} of {:?}",
                    id, direction, group
                )));
            }
            if !seen.insert(*id) {
                return Err(AclError::invalid(format!("{:?} listed twice", id)));
            }
        }
        Ok(())
    }

    /// Membership after appending `acl`, or `None` if it is already a member.
    pub fn plan_add(&self, group: GroupId, acl: AclId, store: &AclStore) -> Result<Option<Vec<AclId>>> {
        let current = &self.get(group)?.acls;
        if current.contains(&acl) {
            return Ok(None);
        }
        let mut acls = current.clone();
        acls.push(acl);
        self.plan_members(group, &acls, store)?;
        Ok(Some(acls))
    }

    pub fn plan_delete(&self, group: GroupId, acl: AclId) -> Result<Vec<AclId>> {
        let current = &self.get(group)?.acls;
        if !current.contains(&acl) {
            return Err(AclError::not_found(format!("{:?} in {:?}", acl, group)));
        }
        Ok(current.iter().copied().filter(|a| *a != acl).collect())
    }

    pub(crate) fn commit_members(&mut self, group: GroupId, acls: Vec<AclId>) -> Result<()> {
        self.get_mut(group)?.acls = acls;
        Ok(())
    }

    /// The group whose `next` is `group`.
    pub fn parent_of(&self, group: GroupId) -> Option<GroupId> {
        self.groups
            .iter()
            .find(|(_, g)| g.next == Some(group))
            .map(|(id, _)| id)
    }

    pub fn is_chain_head(&self, group: GroupId) -> bool {
        self.parent_of(group).is_none()
    }

    /// Validates linking `child` after `parent`.
    ///
    /// `bound` tells whether a group is currently bound.
    pub fn plan_chain(
        &self,
        parent: GroupId,
        child: GroupId,
        bound: impl Fn(GroupId) -> bool,
    ) -> Result<()> {
        let p = self.get(parent)?;
        let c = self.get(child)?;
        if parent == child {
            return Err(AclError::invalid(format!("{:?} cannot follow itself", parent)));
        }
        if let Some(next) = p.next {
            return Err(AclError::invalid(format!(
                "{:?} is already followed by {:?}",
                parent, next
            )));
        }
        if let Some(grand) = self.parent_of(child) {
            return Err(AclError::invalid(format!(
                "{:?} already follows {:?}",
                child, grand
            )));
        }
        if p.direction != c.direction {
            return Err(AclError::invalid(format!(
                "cannot chain {} group {:?} after {} group {:?}",
                c.direction, child, p.direction, parent
            )));
        }
        if bound(child) {
            return Err(AclError::invalid(format!(
                "{:?} is bound and must stay a chain head",
                child
            )));
        }
        if self.chain_from(child).contains(&parent) {
            return Err(AclError::invalid(format!(
                "chaining {:?} after {:?} forms a cycle",
                child, parent
            )));
        }
        Ok(())
    }

    pub(crate) fn set_next(&mut self, group: GroupId, next: Option<GroupId>) -> Result<()> {
        self.get_mut(group)?.next = next;
        Ok(())
    }

    /// Groups reachable from `head` through `next`, `head` first.
    ///
    /// The walk stops at a repeated group and is bounded by the number of
    /// groups.
    pub fn chain_from(&self, head: GroupId) -> Vec<GroupId> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut cursor = Some(head);
        while let Some(id) = cursor {
            if chain.len() > self.groups.len() || !visited.insert(id) {
                break;
            }
            let Some(group) = self.groups.get(id) else {
                break;
            };
            chain.push(id);
            cursor = group.next;
        }
        chain
    }

    pub fn chain_next(&self, group: GroupId) -> Result<Option<GroupId>> {
        Ok(self.get(group)?.next)
    }

    pub fn plan_priority(&self, group: GroupId, priority: u32) -> Result<()> {
        self.get(group)?;
        if !self.priorities.contains(priority) {
            return Err(AclError::invalid(format!(
                "group priority {} not in {}..={}",
                priority, self.priorities.min, self.priorities.max
            )));
        }
        Ok(())
    }

    pub(crate) fn set_priority(&mut self, group: GroupId, priority: u32) -> Result<()> {
        self.plan_priority(group, priority)?;
        self.get_mut(group)?.priority = priority;
        Ok(())
    }

    /// First group that lists `acl`.
    pub fn holder_of(&self, acl: AclId) -> Option<GroupId> {
        self.groups
            .iter()
            .find(|(_, g)| g.acls.contains(&acl))
            .map(|(id, _)| id)
    }

    pub(crate) fn remove(&mut self, group: GroupId) -> Result<AclGroup> {
        self.groups
            .remove(group)
            .ok_or_else(|| AclError::not_found(format!("{:?}", group)))
    }

    pub fn get(&self, group: GroupId) -> Result<&AclGroup> {
        self.groups
            .get(group)
            .ok_or_else(|| AclError::not_found(format!("{:?}", group)))
    }

    fn get_mut(&mut self, group: GroupId) -> Result<&mut AclGroup> {
        self.groups
            .get_mut(group)
            .ok_or_else(|| AclError::not_found(format!("{:?}", group)))
    }

    pub fn contains(&self, group: GroupId) -> bool {
        self.groups.contains(group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn query(&self, query: Query<GroupId>) -> Result<QueryResult<GroupId>> {
        query
            .select(self.groups.handles())
            .ok_or_else(|| AclError::not_found("ACL group"))
    }
}
