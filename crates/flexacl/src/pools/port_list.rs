//! Port-list containers referenced by `RX_LIST` / `TX_LIST` keys.

use std::collections::BTreeSet;

use flexacl_common::{Query, QueryResult};
use flexacl_hw::{PortId, PortListId, PortListKind};
use log::info;

use super::Pool;
use crate::error::{AclError, Result};

/// Port-list allocator.
#[derive(Debug, Clone)]
pub struct PortListPool {
    pub(crate) pool: Pool<BTreeSet<PortId>, PortListKind>,
}

impl PortListPool {
    pub fn new(limit: usize) -> Self {
        Self {
            pool: Pool::new("port list", limit),
        }
    }

    fn collect_unique(ports: &[PortId]) -> Result<BTreeSet<PortId>> {
        let set: BTreeSet<PortId> = ports.iter().copied().collect();
        if set.len() != ports.len() {
            return Err(AclError::invalid("port list names a port twice"));
        }
        Ok(set)
    }

    pub fn create(&mut self, ports: &[PortId]) -> Result<PortListId> {
        let set = Self::collect_unique(ports)?;
        let id = self.pool.insert(set)?;
        info!("port list {:?} created with {} ports", id, ports.len());
        Ok(id)
    }

    /// Replaces the member ports.
    pub fn set(&mut self, id: PortListId, ports: &[PortId]) -> Result<()> {
        let set = Self::collect_unique(ports)?;
        *self.pool.get_mut(id)? = set;
        Ok(())
    }

    /// Adds ports; ports already present are kept once.
    pub fn add(&mut self, id: PortListId, ports: &[PortId]) -> Result<()> {
        self.pool.get_mut(id)?.extend(ports.iter().copied());
        Ok(())
    }

    /// Removes ports. Every port must be a member.
    pub fn delete(&mut self, id: PortListId, ports: &[PortId]) -> Result<()> {
        let current = self.pool.get_mut(id)?;
        if let Some(port) = ports.iter().find(|p| !current.contains(*p)) {
            return Err(AclError::not_found(format!("{} in {:?}", port, id)));
        }
        for port in ports {
            current.remove(port);
        }
        Ok(())
    }

    pub fn destroy(&mut self, id: PortListId) -> Result<()> {
        self.pool.remove(id)?;
        info!("port list {:?} destroyed", id);
        Ok(())
    }

    pub fn get(&self, id: PortListId) -> Result<&BTreeSet<PortId>> {
        self.pool.get(id)
    }

    pub fn contains(&self, id: PortListId) -> bool {
        self.pool.contains(id)
    }

    pub fn ref_count(&self, id: PortListId) -> Result<u32> {
        self.pool.ref_count(id)
    }

    pub fn query(&self, query: Query<PortListId>) -> Result<QueryResult<PortListId>> {
        self.pool.query(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_membership_edits() {
        let mut pool = PortListPool::new(4);
        let id = pool.create(&[PortId(1), PortId(2)]).unwrap();
        pool.add(id, &[PortId(2), PortId(3)]).unwrap();
        assert_eq!(pool.get(id).unwrap().len(), 3);

        pool.delete(id, &[PortId(1)]).unwrap();
        assert!(!pool.get(id).unwrap().contains(&PortId(1)));

        let err = pool.delete(id, &[PortId(3), PortId(9)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EntryNotFound);
        assert!(pool.get(id).unwrap().contains(&PortId(3)));

        pool.set(id, &[PortId(7)]).unwrap();
        assert_eq!(
            pool.get(id).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![PortId(7)]
        );
    }

    #[test]
    fn test_duplicate_ports_rejected() {
        let mut pool = PortListPool::new(4);
        assert_eq!(
            pool.create(&[PortId(1), PortId(1)]).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
    }
}
