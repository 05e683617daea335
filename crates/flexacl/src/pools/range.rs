//! Range comparators.
//!
//! Ranges are used when a rule matches on a value interval (e.g. an L4 port
//! range). They are shared resources referenced from rules through
//! `KeyMatch::Range`; the device has a small fixed number of comparators.

use std::fmt;

use flexacl_common::{Query, QueryResult};
use flexacl_hw::{RangeId, RangeKind};
use log::info;

use super::{check_in_use, Pool};
use crate::error::{AclError, Result};

/// Field a range comparator applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeField {
    /// L4 source port range.
    L4SrcPort,
    /// L4 destination port range.
    L4DstPort,
    /// Either L4 port.
    L4Port,
    /// Outer VLAN range.
    OuterVlan,
    /// Inner VLAN range.
    InnerVlan,
    /// Packet length range.
    PacketLength,
    Ttl,
    /// Value extracted by a custom-byte set.
    CustomBytes,
}

impl fmt::Display for RangeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L4SrcPort => write!(f, "L4_SRC_PORT"),
            Self::L4DstPort => write!(f, "L4_DST_PORT"),
            Self::L4Port => write!(f, "L4_PORT"),
            Self::OuterVlan => write!(f, "OUTER_VLAN"),
            Self::InnerVlan => write!(f, "INNER_VLAN"),
            Self::PacketLength => write!(f, "PACKET_LENGTH"),
            Self::Ttl => write!(f, "TTL"),
            Self::CustomBytes => write!(f, "CUSTOM_BYTES"),
        }
    }
}

/// An inclusive interval on one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeComparator {
    pub field: RangeField,
    /// Minimum value (inclusive).
    pub min: u32,
    /// Maximum value (inclusive).
    pub max: u32,
}

impl RangeComparator {
    pub fn new(field: RangeField, min: u32, max: u32) -> Self {
        Self { field, min, max }
    }

    /// Validates the range.
    pub fn validate(&self) -> Result<()> {
        if self.min > self.max {
            return Err(AclError::invalid(format!(
                "Invalid range: min ({}) > max ({})",
                self.min, self.max
            )));
        }

        let limit = match self.field {
            RangeField::L4SrcPort | RangeField::L4DstPort | RangeField::L4Port => 65535,
            RangeField::OuterVlan | RangeField::InnerVlan => 4094,
            RangeField::PacketLength => 0xFFFF,
            RangeField::Ttl => 255,
            RangeField::CustomBytes => u32::MAX,
        };
        if self.max > limit {
            return Err(AclError::invalid(format!(
                "{} range max ({}) exceeds {}",
                self.field, self.max, limit
            )));
        }

        Ok(())
    }

    pub fn is_custom_bytes(&self) -> bool {
        self.field == RangeField::CustomBytes
    }
}

impl fmt::Display for RangeComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.field, self.min, self.max)
    }
}

/// Range comparator allocator.
#[derive(Debug, Clone)]
pub struct RangePool {
    pub(crate) pool: Pool<RangeComparator, RangeKind>,
    max_custom_bytes: usize,
}

impl RangePool {
    pub fn new(max_ranges: usize, max_custom_bytes: usize) -> Self {
        Self {
            pool: Pool::new("range comparator", max_ranges),
            max_custom_bytes,
        }
    }

    fn custom_bytes_in_use(&self, except: Option<RangeId>) -> usize {
        self.pool
            .iter()
            .filter(|(id, r)| Some(*id) != except && r.is_custom_bytes())
            .count()
    }

    fn check_custom_bytes_limit(&self, range: &RangeComparator, except: Option<RangeId>) -> Result<()> {
        if range.is_custom_bytes() && self.custom_bytes_in_use(except) >= self.max_custom_bytes {
            return Err(AclError::exhausted(format!(
                "at most {} custom-bytes ranges may exist",
                self.max_custom_bytes
            )));
        }
        Ok(())
    }

    pub fn create(&mut self, range: RangeComparator) -> Result<RangeId> {
        range.validate()?;
        self.check_custom_bytes_limit(&range, None)?;
        let id = self.pool.insert(range)?;
        info!("range {:?} created: {}", id, range);
        Ok(id)
    }

    /// Changes an unreferenced comparator.
    pub fn edit(&mut self, id: RangeId, range: RangeComparator) -> Result<()> {
        range.validate()?;
        check_in_use(self.pool.ref_count(id)?, id)?;
        self.check_custom_bytes_limit(&range, Some(id))?;
        *self.pool.get_mut(id)? = range;
        Ok(())
    }

    pub fn destroy(&mut self, id: RangeId) -> Result<()> {
        self.pool.remove(id)?;
        info!("range {:?} destroyed", id);
        Ok(())
    }

    /// Returns an existing comparator with the same properties.
    pub fn find(&self, range: &RangeComparator) -> Option<RangeId> {
        self.pool.iter().find(|(_, r)| *r == range).map(|(id, _)| id)
    }

    pub fn get(&self, id: RangeId) -> Result<&RangeComparator> {
        self.pool.get(id)
    }

    pub fn contains(&self, id: RangeId) -> bool {
        self.pool.contains(id)
    }

    pub fn ref_count(&self, id: RangeId) -> Result<u32> {
        self.pool.ref_count(id)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn query(&self, query: Query<RangeId>) -> Result<QueryResult<RangeId>> {
        self.pool.query(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_range_validation() {
        assert!(RangeComparator::new(RangeField::L4DstPort, 80, 443)
            .validate()
            .is_ok());
        assert!(RangeComparator::new(RangeField::L4DstPort, 443, 80)
            .validate()
            .is_err());
        assert!(RangeComparator::new(RangeField::L4SrcPort, 0, 70000)
            .validate()
            .is_err());
        assert!(RangeComparator::new(RangeField::OuterVlan, 1, 4095)
            .validate()
            .is_err());
    }

    #[test]
    fn test_range_display() {
        let range = RangeComparator::new(RangeField::L4SrcPort, 1024, 2048);
        assert_eq!(range.to_string(), "L4_SRC_PORT:1024-2048");
    }

    #[test]
    fn test_global_comparator_limit() {
        let mut pool = RangePool::new(16, 2);
        for i in 0..16 {
            pool.create(RangeComparator::new(RangeField::L4DstPort, i, i + 1))
                .unwrap();
        }
        let err = pool
            .create(RangeComparator::new(RangeField::L4DstPort, 100, 200))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_custom_bytes_limit() {
        let mut pool = RangePool::new(16, 2);
        let custom = RangeComparator::new(RangeField::CustomBytes, 0, 10);
        let first = pool.create(custom).unwrap();
        pool.create(custom).unwrap();
        assert_eq!(
            pool.create(custom).unwrap_err().kind(),
            ErrorKind::ResourceExhausted
        );

        // Other fields are unaffected.
        let port = pool
            .create(RangeComparator::new(RangeField::L4Port, 1, 2))
            .unwrap();
        assert_eq!(
            pool.edit(port, custom).unwrap_err().kind(),
            ErrorKind::ResourceExhausted
        );

        pool.destroy(first).unwrap();
        pool.edit(port, custom).unwrap();
    }

    #[test]
    fn test_edit_referenced_range_is_in_use() {
        let mut pool = RangePool::new(16, 2);
        let id = pool
            .create(RangeComparator::new(RangeField::Ttl, 1, 64))
            .unwrap();
        pool.pool.acquire(id).unwrap();
        let err = pool
            .edit(id, RangeComparator::new(RangeField::Ttl, 1, 32))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceInUse);
        assert_eq!(pool.destroy(id).unwrap_err().kind(), ErrorKind::ResourceInUse);
    }

    #[test]
    fn test_find_existing() {
        let mut pool = RangePool::new(16, 2);
        let range = RangeComparator::new(RangeField::PacketLength, 64, 1500);
        let id = pool.create(range).unwrap();
        assert_eq!(pool.find(&range), Some(id));
        assert_eq!(
            pool.find(&RangeComparator::new(RangeField::PacketLength, 64, 9000)),
            None
        );
    }
}
