//! Satellite resource pools.
//!
//! PBS entries, range comparators, custom-byte sets, port lists and VLAN
//! groups are allocated independently of regions and referenced from rules
//! (or, for VLAN groups, from bindings). Each pool counts references and
//! refuses to delete an entry that is still referenced.

mod custom_bytes;
mod pbs;
mod port_list;
mod range;
mod vlan_group;

use std::fmt;

use flexacl_common::{Arena, Query, QueryResult, RefCounted};
use flexacl_hw::{CustomBytesId, Handle, HandleKind, PbsId, PortListId, RangeId};

use crate::config::AclCoreConfig;
use crate::error::{AclError, Result};

pub use custom_bytes::{CustomByteSet, CustomBytesPool, ExtractionPoint};
pub use pbs::{PbsDestination, PbsPool};
pub use port_list::PortListPool;
pub use range::{RangeComparator, RangeField, RangePool};
pub use vlan_group::VlanGroupPool;

/// Reference-counted storage shared by every pool.
#[derive(Debug, Clone)]
pub struct Pool<T, K: HandleKind> {
    name: &'static str,
    entries: Arena<RefCounted<T>, K>,
}

impl<T, K: HandleKind> Pool<T, K> {
    pub fn new(name: &'static str, limit: usize) -> Self {
        Self {
            name,
            entries: Arena::with_limit(limit),
        }
    }

    pub fn insert(&mut self, value: T) -> Result<Handle<K>> {
        self.entries
            .insert(RefCounted::new(value))
            .ok_or_else(|| AclError::exhausted(format!("{} pool is full", self.name)))
    }

    pub fn get(&self, id: Handle<K>) -> Result<&T> {
        self.entries
            .get(id)
            .map(|e| &e.value)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))
    }

    pub(crate) fn get_mut(&mut self, id: Handle<K>) -> Result<&mut T> {
        self.entries
            .get_mut(id)
            .map(|e| &mut e.value)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))
    }

    pub fn contains(&self, id: Handle<K>) -> bool {
        self.entries.contains(id)
    }

    /// Removes an entry nothing references.
    pub fn remove(&mut self, id: Handle<K>) -> Result<T> {
        check_in_use(self.ref_count(id)?, id)?;
        self.entries
            .remove(id)
            .map(|e| e.value)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))
    }

    pub fn ref_count(&self, id: Handle<K>) -> Result<u32> {
        self.entries
            .ref_count(id)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))
    }

    pub(crate) fn acquire(&mut self, id: Handle<K>) -> Result<u32> {
        self.entries
            .increment_ref(id)
            .map_err(|e| AclError::from_ref_count(e, format!("{:?}", id)))
    }

    pub(crate) fn release(&mut self, id: Handle<K>) -> Result<u32> {
        self.entries
            .decrement_ref(id)
            .map_err(|e| AclError::from_ref_count(e, format!("{:?}", id)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.entries.iter().map(|(id, e)| (id, &e.value))
    }

    pub fn query(&self, query: Query<Handle<K>>) -> Result<QueryResult<Handle<K>>> {
        query
            .select(self.entries.handles())
            .ok_or_else(|| AclError::not_found(format!("{} entry", self.name)))
    }
}

fn check_in_use<K: HandleKind>(refs: u32, id: Handle<K>) -> Result<()> {
    if refs > 0 {
        return Err(AclError::in_use(format!(
            "{:?} is referenced {} time(s)",
            id, refs
        )));
    }
    Ok(())
}

/// Pool entries referenced by one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolRefs {
    pub pbs: Vec<PbsId>,
    pub ranges: Vec<RangeId>,
    pub custom_bytes: Vec<CustomBytesId>,
    pub port_lists: Vec<PortListId>,
}

impl PoolRefs {
    pub fn is_empty(&self) -> bool {
        self.pbs.is_empty()
            && self.ranges.is_empty()
            && self.custom_bytes.is_empty()
            && self.port_lists.is_empty()
    }

    pub fn extend(&mut self, other: PoolRefs) {
        self.pbs.extend(other.pbs);
        self.ranges.extend(other.ranges);
        self.custom_bytes.extend(other.custom_bytes);
        self.port_lists.extend(other.port_lists);
    }
}

impl fmt::Display for PoolRefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pbs={} ranges={} custom_bytes={} port_lists={}",
            self.pbs.len(),
            self.ranges.len(),
            self.custom_bytes.len(),
            self.port_lists.len()
        )
    }
}

/// All satellite pools of one ACL core.
#[derive(Debug, Clone)]
pub struct Pools {
    pub pbs: PbsPool,
    pub ranges: RangePool,
    pub custom_bytes: CustomBytesPool,
    pub port_lists: PortListPool,
    pub vlan_groups: VlanGroupPool,
}

impl Pools {
    pub fn new(config: &AclCoreConfig) -> Self {
        Self {
            pbs: PbsPool::new(config.max_pbs_entries),
            ranges: RangePool::new(config.max_range_comparators, config.max_custom_bytes_ranges),
            custom_bytes: CustomBytesPool::new(config.max_custom_byte_sets),
            port_lists: PortListPool::new(config.max_port_lists),
            vlan_groups: VlanGroupPool::new(config.max_vlan_groups),
        }
    }

    /// Fails with `EntryNotFound` if any referenced entry does not exist.
    pub(crate) fn check_refs(&self, refs: &PoolRefs) -> Result<()> {
        let missing = |what: String| Err(AclError::not_found(what));
        if let Some(id) = refs.pbs.iter().find(|id| !self.pbs.contains(**id)) {
            return missing(format!("{:?}", id));
        }
        if let Some(id) = refs.ranges.iter().find(|id| !self.ranges.contains(**id)) {
            return missing(format!("{:?}", id));
        }
        if let Some(id) = refs
            .custom_bytes
            .iter()
            .find(|id| !self.custom_bytes.contains(**id))
        {
            return missing(format!("{:?}", id));
        }
        if let Some(id) = refs
            .port_lists
            .iter()
            .find(|id| !self.port_lists.contains(**id))
        {
            return missing(format!("{:?}", id));
        }
        Ok(())
    }

    /// Takes one reference on every entry in `refs`. Call `check_refs` first.
    pub(crate) fn acquire(&mut self, refs: &PoolRefs) -> Result<()> {
        for id in &refs.pbs {
            self.pbs.pool.acquire(*id)?;
        }
        for id in &refs.ranges {
            self.ranges.pool.acquire(*id)?;
        }
        for id in &refs.custom_bytes {
            self.custom_bytes.pool.acquire(*id)?;
        }
        for id in &refs.port_lists {
            self.port_lists.pool.acquire(*id)?;
        }
        Ok(())
    }

    pub(crate) fn release(&mut self, refs: &PoolRefs) -> Result<()> {
        for id in &refs.pbs {
            self.pbs.pool.release(*id)?;
        }
        for id in &refs.ranges {
            self.ranges.pool.release(*id)?;
        }
        for id in &refs.custom_bytes {
            self.custom_bytes.pool.release(*id)?;
        }
        for id in &refs.port_lists {
            self.port_lists.pool.release(*id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use flexacl_hw::{PortId, PortListKind};

    #[test]
    fn test_pool_refuses_delete_while_referenced() {
        let mut pool: Pool<u32, PortListKind> = Pool::new("test", 4);
        let id = pool.insert(7).unwrap();
        pool.acquire(id).unwrap();
        assert_eq!(pool.remove(id).unwrap_err().kind(), ErrorKind::ResourceInUse);
        pool.release(id).unwrap();
        assert_eq!(pool.remove(id).unwrap(), 7);
        assert_eq!(pool.get(id).unwrap_err().kind(), ErrorKind::EntryNotFound);
    }

    #[test]
    fn test_pool_limit() {
        let mut pool: Pool<u32, PortListKind> = Pool::new("test", 1);
        pool.insert(1).unwrap();
        assert_eq!(
            pool.insert(2).unwrap_err().kind(),
            ErrorKind::ResourceExhausted
        );
    }

    #[test]
    fn test_acquire_and_release_refs() {
        let mut pools = Pools::new(&AclCoreConfig::default());
        let list = pools.port_lists.create(&[PortId(1), PortId(2)]).unwrap();
        let refs = PoolRefs {
            port_lists: vec![list, list],
            ..Default::default()
        };
        pools.check_refs(&refs).unwrap();
        pools.acquire(&refs).unwrap();
        assert_eq!(pools.port_lists.ref_count(list).unwrap(), 2);
        pools.release(&refs).unwrap();
        assert_eq!(pools.port_lists.ref_count(list).unwrap(), 0);
    }

    #[test]
    fn test_check_refs_reports_missing_entry() {
        let mut pools = Pools::new(&AclCoreConfig::default());
        let list = pools.port_lists.create(&[PortId(1)]).unwrap();
        pools.port_lists.destroy(list).unwrap();
        let refs = PoolRefs {
            port_lists: vec![list],
            ..Default::default()
        };
        assert_eq!(
            pools.check_refs(&refs).unwrap_err().kind(),
            ErrorKind::EntryNotFound
        );
    }
}
