//! Bindings of ACLs and group chains to attachment points.
//!
//! Each `(attachment point, direction)` carries an ordered list of bound
//! entries. A bare ACL is always bound alone; groups can be stacked with
//! `ADD` and are kept in descending priority order, ties in insertion order.

use std::fmt;

use flexacl_common::SyncMap;
use flexacl_hw::{AclId, GroupId, RawHandle};

use crate::error::{AclError, Result};
use crate::types::{AttachPoint, Direction};

/// What a binding enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindTarget {
    Acl(AclId),
    /// Head of a group chain.
    Group(GroupId),
}

impl BindTarget {
    pub fn raw(&self) -> RawHandle {
        match self {
            BindTarget::Acl(id) => id.as_raw(),
            BindTarget::Group(id) => id.as_raw(),
        }
    }
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindTarget::Acl(id) => write!(f, "{:?}", id),
            BindTarget::Group(id) => write!(f, "{:?}", id),
        }
    }
}

/// A bound entry. The priority is captured when the entry is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundEntry {
    pub target: BindTarget,
    pub priority: u32,
}

impl BoundEntry {
    pub fn new(target: BindTarget, priority: u32) -> Self {
        Self { target, priority }
    }
}

/// Binding state of one `(point, direction)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    BoundSingle,
    BoundMultiple,
}

/// Result of a full binding listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingList {
    /// Number of bound entries.
    pub total: usize,
    /// Entries in evaluation order, capped at the requested maximum.
    pub targets: Vec<BindTarget>,
}

pub type BindingKey = (AttachPoint, Direction);

/// All bindings of one device.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    entries: SyncMap<BindingKey, Vec<BoundEntry>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that `direction` can be bound on `point`.
    pub fn check_point(point: AttachPoint, direction: Direction) -> Result<()> {
        if direction == Direction::MultiPoints {
            return Err(AclError::invalid(format!(
                "{} is not a binding direction",
                direction
            )));
        }
        if !point.supports(direction) {
            return Err(AclError::invalid(format!(
                "{} cannot be bound in direction {}",
                point, direction
            )));
        }
        Ok(())
    }

    /// List after inserting `entry` behind every entry of equal or higher
    /// priority.
    ///
    /// Returns `None` when the target is already bound there.
    pub fn plan_add(&self, key: &BindingKey, entry: BoundEntry) -> Result<Option<Vec<BoundEntry>>> {
        let current = self.entries.get(key).map(Vec::as_slice).unwrap_or_default();
        if current.iter().any(|e| e.target == entry.target) {
            return Ok(None);
        }
        if let Some(acl) = current.iter().find(|e| matches!(e.target, BindTarget::Acl(_))) {
            return Err(AclError::invalid(format!(
                "{} {} is bound to a bare ACL {}",
                key.0, key.1, acl.target
            )));
        }
        let mut list = current.to_vec();
        let at = list
            .iter()
            .position(|e| e.priority < entry.priority)
            .unwrap_or(list.len());
        list.insert(at, entry);
        Ok(Some(list))
    }

    pub fn plan_delete(&self, key: &BindingKey, group: GroupId) -> Result<Vec<BoundEntry>> {
        let current = self.bound(key)?;
        let target = BindTarget::Group(group);
        if !current.iter().any(|e| e.target == target) {
            return Err(AclError::not_found(format!(
                "{:?} on {} {}",
                group, key.0, key.1
            )));
        }
        Ok(current.iter().copied().filter(|e| e.target != target).collect())
    }

    /// Stores the list of `key`. An empty list removes the binding.
    pub(crate) fn commit(&mut self, key: BindingKey, list: Vec<BoundEntry>) {
        if list.is_empty() {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, list);
        }
    }

    fn bound(&self, key: &BindingKey) -> Result<&[BoundEntry]> {
        self.entries
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| AclError::not_found(format!("binding on {} {}", key.0, key.1)))
    }

    pub fn get(&self, key: &BindingKey) -> Option<&[BoundEntry]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn primary(&self, key: &BindingKey) -> Result<BindTarget> {
        self.bound(key)?
            .first()
            .map(|e| e.target)
            .ok_or_else(|| AclError::not_found(format!("binding on {} {}", key.0, key.1)))
    }

    /// Ordered targets, capped at `cap`. `Some(0)` returns the count only.
    pub fn all(&self, key: &BindingKey, cap: Option<usize>) -> Result<BindingList> {
        let entries = self.bound(key)?;
        let limit = cap.unwrap_or(entries.len());
        Ok(BindingList {
            total: entries.len(),
            targets: entries.iter().take(limit).map(|e| e.target).collect(),
        })
    }

    pub fn state(&self, key: &BindingKey) -> BindingState {
        match self.entries.get(key).map(Vec::len) {
            None | Some(0) => BindingState::Unbound,
            Some(1) => BindingState::BoundSingle,
            Some(_) => BindingState::BoundMultiple,
        }
    }

    pub fn is_bound(&self, target: BindTarget) -> bool {
        self.entries
            .values()
            .any(|list| list.iter().any(|e| e.target == target))
    }

    /// Every bound target with its key.
    pub fn iter(&self) -> impl Iterator<Item = (&BindingKey, &BoundEntry)> {
        self.entries
            .iter()
            .flat_map(|(key, list)| list.iter().map(move |e| (key, e)))
    }

    /// Number of bound `(point, direction)` keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Raw handles of a list, in order, for device programming.
pub fn raw_targets(list: &[BoundEntry]) -> Vec<RawHandle> {
    list.iter().map(|e| e.target.raw()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use flexacl_hw::{PortId, RifId};
    use pretty_assertions::assert_eq;

    fn key() -> BindingKey {
        (AttachPoint::Port(PortId(100)), Direction::Ingress)
    }

    fn group(index: u32) -> GroupId {
        GroupId::from_parts(index, 1)
    }

    fn add(table: &mut BindingTable, g: GroupId, priority: u32) {
        let entry = BoundEntry::new(BindTarget::Group(g), priority);
        let list = table.plan_add(&key(), entry).unwrap().unwrap();
        table.commit(key(), list);
    }

    #[test]
    fn test_priority_order() {
        let mut table = BindingTable::new();
        add(&mut table, group(1), 10);
        add(&mut table, group(2), 20);
        add(&mut table, group(3), 15);
        let list = table.all(&key(), None).unwrap();
        assert_eq!(
            list.targets,
            vec![
                BindTarget::Group(group(2)),
                BindTarget::Group(group(3)),
                BindTarget::Group(group(1)),
            ]
        );
        assert_eq!(table.primary(&key()).unwrap(), BindTarget::Group(group(2)));
        assert_eq!(table.state(&key()), BindingState::BoundMultiple);
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order() {
        let mut table = BindingTable::new();
        add(&mut table, group(1), 8);
        add(&mut table, group(2), 8);
        add(&mut table, group(3), 9);
        add(&mut table, group(4), 8);
        let targets = table.all(&key(), None).unwrap().targets;
        let order: Vec<_> = targets
            .iter()
            .map(|t| match t {
                BindTarget::Group(g) => g.index(),
                BindTarget::Acl(a) => a.index(),
            })
            .collect();
        assert_eq!(order, vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_add_twice_is_noop() {
        let mut table = BindingTable::new();
        add(&mut table, group(1), 10);
        let entry = BoundEntry::new(BindTarget::Group(group(1)), 12);
        assert_eq!(table.plan_add(&key(), entry).unwrap(), None);
    }

    #[test]
    fn test_add_onto_bare_acl_fails() {
        let mut table = BindingTable::new();
        let acl = BoundEntry::new(BindTarget::Acl(AclId::from_parts(0, 1)), 8);
        table.commit(key(), vec![acl]);
        let entry = BoundEntry::new(BindTarget::Group(group(1)), 8);
        assert_eq!(
            table.plan_add(&key(), entry).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
    }

    #[test]
    fn test_delete_and_count_only() {
        let mut table = BindingTable::new();
        add(&mut table, group(1), 10);
        add(&mut table, group(2), 5);

        let counted = table.all(&key(), Some(0)).unwrap();
        assert_eq!(counted.total, 2);
        assert!(counted.targets.is_empty());

        assert_eq!(
            table.plan_delete(&key(), group(9)).unwrap_err().kind(),
            ErrorKind::EntryNotFound
        );
        let list = table.plan_delete(&key(), group(1)).unwrap();
        table.commit(key(), list);
        assert_eq!(table.state(&key()), BindingState::BoundSingle);

        let list = table.plan_delete(&key(), group(2)).unwrap();
        table.commit(key(), list);
        assert_eq!(table.state(&key()), BindingState::Unbound);
        assert_eq!(
            table.primary(&key()).unwrap_err().kind(),
            ErrorKind::EntryNotFound
        );
    }

    #[test]
    fn test_point_direction_compatibility() {
        let port = AttachPoint::Port(PortId(1));
        let rif = AttachPoint::Rif(RifId(1));
        assert!(BindingTable::check_point(port, Direction::Egress).is_ok());
        assert!(BindingTable::check_point(port, Direction::RifIngress).is_err());
        assert!(BindingTable::check_point(rif, Direction::RifEgress).is_ok());
        assert!(BindingTable::check_point(rif, Direction::Ingress).is_err());
        assert!(BindingTable::check_point(port, Direction::MultiPoints).is_err());
    }
}
