//! Policy-based switching entries.

use std::fmt;

use flexacl_common::{Query, QueryResult};
use flexacl_hw::{LagId, PbsId, PbsKind, PortId};
use log::info;

use super::Pool;
use crate::error::{AclError, Result};

/// Where a PBS entry sends matching packets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PbsDestination {
    Port(PortId),
    Lag(LagId),
    /// Multicast-style fan-out to a set of ports.
    PortGroup(Vec<PortId>),
    /// Hand the packet to a virtual router.
    Router { vrid: u16 },
}

impl PbsDestination {
    fn validate(&self) -> Result<()> {
        if let PbsDestination::PortGroup(ports) = self {
            if ports.is_empty() {
                return Err(AclError::invalid("PBS port group needs at least one port"));
            }
            let mut sorted = ports.clone();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() != ports.len() {
                return Err(AclError::invalid("PBS port group lists a port twice"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for PbsDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(p) => write!(f, "{}", p),
            Self::Lag(l) => write!(f, "{}", l),
            Self::PortGroup(ports) => write!(f, "[{} ports]", ports.len()),
            Self::Router { vrid } => write!(f, "VR{}", vrid),
        }
    }
}

/// PBS entry allocator.
#[derive(Debug, Clone)]
pub struct PbsPool {
    pub(crate) pool: Pool<PbsDestination, PbsKind>,
}

impl PbsPool {
    pub fn new(limit: usize) -> Self {
        Self {
            pool: Pool::new("PBS", limit),
        }
    }

    /// Creates a PBS entry. An identical destination may exist only once.
    pub fn create(&mut self, destination: PbsDestination) -> Result<PbsId> {
        destination.validate()?;
        if let Some((existing, _)) = self.pool.iter().find(|(_, d)| **d == destination) {
            return Err(AclError::AlreadyExists(format!(
                "PBS {} already exists as {:?}",
                destination, existing
            )));
        }
        let id = self.pool.insert(destination)?;
        info!("PBS {:?} created", id);
        Ok(id)
    }

    /// Replaces the destination of an entry. Rules referencing it follow.
    pub fn edit(&mut self, id: PbsId, destination: PbsDestination) -> Result<()> {
        destination.validate()?;
        if self
            .pool
            .iter()
            .any(|(other, d)| other != id && *d == destination)
        {
            return Err(AclError::AlreadyExists(format!("PBS {}", destination)));
        }
        *self.pool.get_mut(id)? = destination;
        Ok(())
    }

    /// Adds ports to a port-group entry.
    pub fn add_ports(&mut self, id: PbsId, ports: &[PortId]) -> Result<()> {
        let PbsDestination::PortGroup(current) = self.pool.get_mut(id)? else {
            return Err(AclError::invalid(format!("{:?} is not a port group", id)));
        };
        for port in ports {
            if !current.contains(port) {
                current.push(*port);
            }
        }
        Ok(())
    }

    /// Removes ports from a port-group entry. The group may not become empty.
    pub fn delete_ports(&mut self, id: PbsId, ports: &[PortId]) -> Result<()> {
        let PbsDestination::PortGroup(current) = self.pool.get(id)? else {
            return Err(AclError::invalid(format!("{:?} is not a port group", id)));
        };
        if let Some(port) = ports.iter().find(|p| !current.contains(*p)) {
            return Err(AclError::not_found(format!("{} in {:?}", port, id)));
        }
        let remaining: Vec<PortId> = current
            .iter()
            .copied()
            .filter(|p| !ports.contains(p))
            .collect();
        if remaining.is_empty() {
            return Err(AclError::invalid(format!(
                "{:?} would be left without ports",
                id
            )));
        }
        *self.pool.get_mut(id)? = PbsDestination::PortGroup(remaining);
        Ok(())
    }

    pub fn destroy(&mut self, id: PbsId) -> Result<()> {
        self.pool.remove(id)?;
        info!("PBS {:?} destroyed", id);
        Ok(())
    }

    pub fn get(&self, id: PbsId) -> Result<&PbsDestination> {
        self.pool.get(id)
    }

    pub fn contains(&self, id: PbsId) -> bool {
        self.pool.contains(id)
    }

    pub fn ref_count(&self, id: PbsId) -> Result<u32> {
        self.pool.ref_count(id)
    }

    pub fn query(&self, query: Query<PbsId>) -> Result<QueryResult<PbsId>> {
        self.pool.query(query)
    }
}
