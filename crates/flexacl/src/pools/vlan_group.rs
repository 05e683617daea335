//! VLAN groups usable as attachment points.
//!
//! A VLAN group is referenced by the bindings made on it, not by rules: the
//! binding table takes a reference when a list is first bound on the group
//! and drops it when the group is unbound.

use std::collections::BTreeSet;

use flexacl_common::{Query, QueryResult};
use flexacl_hw::{VlanGroupId, VlanGroupKind};
use log::info;

use super::Pool;
use crate::error::{AclError, Result};

const VLAN_MIN: u16 = 1;
const VLAN_MAX: u16 = 4094;

fn check_vlans(vlans: &[u16]) -> Result<()> {
    if let Some(vlan) = vlans
        .iter()
        .find(|v| !(VLAN_MIN..=VLAN_MAX).contains(*v))
    {
        return Err(AclError::invalid(format!(
            "VLAN {} not in {}..={}",
            vlan, VLAN_MIN, VLAN_MAX
        )));
    }
    Ok(())
}

/// VLAN-group allocator.
#[derive(Debug, Clone)]
pub struct VlanGroupPool {
    pub(crate) pool: Pool<BTreeSet<u16>, VlanGroupKind>,
}

impl VlanGroupPool {
    pub fn new(limit: usize) -> Self {
        Self {
            pool: Pool::new("VLAN group", limit),
        }
    }

    pub fn create(&mut self, vlans: &[u16]) -> Result<VlanGroupId> {
        check_vlans(vlans)?;
        let id = self.pool.insert(vlans.iter().copied().collect())?;
        info!("VLAN group {:?} created with {} VLANs", id, vlans.len());
        Ok(id)
    }

    pub fn add_vlans(&mut self, id: VlanGroupId, vlans: &[u16]) -> Result<()> {
        check_vlans(vlans)?;
        self.pool.get_mut(id)?.extend(vlans.iter().copied());
        Ok(())
    }

    /// Removes VLANs. Every VLAN must be a member.
    pub fn delete_vlans(&mut self, id: VlanGroupId, vlans: &[u16]) -> Result<()> {
        let current = self.pool.get_mut(id)?;
        if let Some(vlan) = vlans.iter().find(|v| !current.contains(*v)) {
            return Err(AclError::not_found(format!("VLAN {} in {:?}", vlan, id)));
        }
        for vlan in vlans {
            current.remove(vlan);
        }
        Ok(())
    }

    /// Destroys a group that carries no binding.
    pub fn destroy(&mut self, id: VlanGroupId) -> Result<()> {
        self.pool.remove(id)?;
        info!("VLAN group {:?} destroyed", id);
        Ok(())
    }

    pub fn get(&self, id: VlanGroupId) -> Result<&BTreeSet<u16>> {
        self.pool.get(id)
    }

    pub fn contains(&self, id: VlanGroupId) -> bool {
        self.pool.contains(id)
    }

    pub fn ref_count(&self, id: VlanGroupId) -> Result<u32> {
        self.pool.ref_count(id)
    }

    pub fn query(&self, query: Query<VlanGroupId>) -> Result<QueryResult<VlanGroupId>> {
        self.pool.query(query)
    }
}
