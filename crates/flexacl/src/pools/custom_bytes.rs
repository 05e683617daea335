//! Custom-byte sets.
//!
//! A custom-byte set extracts up to four bytes at a fixed offset from a
//! packet header and exposes them to rules through the `CUSTOM_BYTES_*`
//! basic keys.

use std::fmt;

use flexacl_common::{Query, QueryResult};
use flexacl_hw::{CustomBytesId, CustomBytesKind};
use log::info;

use super::{check_in_use, Pool};
use crate::error::{AclError, Result};

/// Header the extraction offset is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionPoint {
    L2Start,
    L3Start,
    L4Start,
    PayloadStart,
}

impl fmt::Display for ExtractionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L2Start => write!(f, "L2_START"),
            Self::L3Start => write!(f, "L3_START"),
            Self::L4Start => write!(f, "L4_START"),
            Self::PayloadStart => write!(f, "PAYLOAD_START"),
        }
    }
}

/// Bytes extracted from the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CustomByteSet {
    pub extraction_point: ExtractionPoint,
    /// Offset in bytes from the extraction point.
    pub offset: u16,
    /// Number of bytes, 1 to 4.
    pub size: u8,
}

impl CustomByteSet {
    /// Furthest byte reachable from an extraction point.
    pub const MAX_REACH: u16 = 128;

    pub fn new(extraction_point: ExtractionPoint, offset: u16, size: u8) -> Self {
        Self {
            extraction_point,
            offset,
            size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=4).contains(&self.size) {
            return Err(AclError::invalid(format!(
                "custom byte set size {} not in 1..=4",
                self.size
            )));
        }
        if self.offset + u16::from(self.size) > Self::MAX_REACH {
            return Err(AclError::invalid(format!(
                "custom bytes {}+{} reach beyond {} bytes",
                self.offset,
                self.size,
                Self::MAX_REACH
            )));
        }
        Ok(())
    }

    /// Mask covering the extracted bytes.
    pub fn value_mask(&self) -> u32 {
        match self.size {
            4 => u32::MAX,
            n => (1u32 << (8 * u32::from(n))) - 1,
        }
    }
}

impl fmt::Display for CustomByteSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}/{}", self.extraction_point, self.offset, self.size)
    }
}

/// Custom-byte set allocator.
#[derive(Debug, Clone)]
pub struct CustomBytesPool {
    pub(crate) pool: Pool<CustomByteSet, CustomBytesKind>,
}

impl CustomBytesPool {
    pub fn new(limit: usize) -> Self {
        Self {
            pool: Pool::new("custom bytes", limit),
        }
    }

    pub fn create(&mut self, set: CustomByteSet) -> Result<CustomBytesId> {
        set.validate()?;
        let id = self.pool.insert(set)?;
        info!("custom bytes {:?} created: {}", id, set);
        Ok(id)
    }

    /// Moves an unreferenced set to a new extraction position.
    pub fn edit(&mut self, id: CustomBytesId, set: CustomByteSet) -> Result<()> {
        set.validate()?;
        check_in_use(self.pool.ref_count(id)?, id)?;
        *self.pool.get_mut(id)? = set;
        Ok(())
    }

    pub fn destroy(&mut self, id: CustomBytesId) -> Result<()> {
        self.pool.remove(id)?;
        info!("custom bytes {:?} destroyed", id);
        Ok(())
    }

    pub fn get(&self, id: CustomBytesId) -> Result<&CustomByteSet> {
        self.pool.get(id)
    }

    pub fn contains(&self, id: CustomBytesId) -> bool {
        self.pool.contains(id)
    }

    pub fn ref_count(&self, id: CustomBytesId) -> Result<u32> {
        self.pool.ref_count(id)
    }

    pub fn query(&self, query: Query<CustomBytesId>) -> Result<QueryResult<CustomBytesId>> {
        self.pool.query(query)
    }
}
