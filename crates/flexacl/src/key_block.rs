//! Key block catalog.
//!
//! A key block is a fixed-width hardware key segment exposing a set of basic
//! keys. Some blocks share hardware lanes and cannot be combined in one key
//! type; the catalog records those pairs as mutual exclusions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{AclError, Result};
use crate::types::BasicKey;

/// Identifier of a key block in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyBlockId(pub u16);

impl fmt::Display for KeyBlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KB{}", self.0)
    }
}

/// A hardware key segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlock {
    pub id: KeyBlockId,
    /// Block name (e.g., "IPV4_EX").
    pub name: String,
    pub fields: BTreeSet<BasicKey>,
    /// Blocks this one cannot be combined with.
    pub exclusive_with: BTreeSet<KeyBlockId>,
}

impl KeyBlock {
    pub fn new(
        id: u16,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = BasicKey>,
    ) -> Self {
        Self {
            id: KeyBlockId(id),
            name: name.into(),
            fields: fields.into_iter().collect(),
            exclusive_with: BTreeSet::new(),
        }
    }

    /// Adds mutual exclusions with the given block ids.
    pub fn with_exclusions(mut self, ids: impl IntoIterator<Item = u16>) -> Self {
        self.exclusive_with.extend(ids.into_iter().map(KeyBlockId));
        self
    }

    pub fn exposes(&self, field: BasicKey) -> bool {
        self.fields.contains(&field)
    }
}

impl fmt::Display for KeyBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}): ", self.id, self.name)?;
        let fields: Vec<_> = self.fields.iter().map(|k| k.to_string()).collect();
        write!(f, "{}", fields.join(","))
    }
}

/// Immutable catalog of key blocks, ordered by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBlockCatalog {
    blocks: BTreeMap<KeyBlockId, KeyBlock>,
}

impl KeyBlockCatalog {
    /// Builds a catalog from custom blocks.
    ///
    /// Ids must be unique, every block must expose at least one field and
    /// exclusions must name blocks in the catalog. Exclusions are made
    /// symmetric.
    pub fn new(blocks: impl IntoIterator<Item = KeyBlock>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for block in blocks {
            if block.fields.is_empty() {
                return Err(AclError::invalid(format!("{} exposes no fields", block.id)));
            }
            if block.exclusive_with.contains(&block.id) {
                return Err(AclError::invalid(format!("{} excludes itself", block.id)));
            }
            let id = block.id;
            if map.insert(id, block).is_some() {
                return Err(AclError::invalid(format!("duplicate key block {}", id)));
            }
        }
        for block in map.values() {
            if let Some(unknown) = block.exclusive_with.iter().find(|b| !map.contains_key(b)) {
                return Err(AclError::invalid(format!(
                    "{} excludes unknown block {}",
                    block.id, unknown
                )));
            }
        }
        Ok(Self::symmetric(map))
    }

    fn symmetric(mut blocks: BTreeMap<KeyBlockId, KeyBlock>) -> Self {
        let pairs: Vec<(KeyBlockId, KeyBlockId)> = blocks
            .values()
            .flat_map(|b| b.exclusive_with.iter().map(move |other| (*other, b.id)))
            .collect();
        for (target, excluded) in pairs {
            if let Some(block) = blocks.get_mut(&target) {
                block.exclusive_with.insert(excluded);
            }
        }
        Self { blocks }
    }

    /// The device's built-in key blocks.
    pub fn builtin() -> Self {
        use BasicKey::*;

        let blocks = [
            KeyBlock::new(0, "L2_DMAC", [Dmac, Ethertype, VlanId, Pcp]),
            KeyBlock::new(1, "L2_SMAC", [Smac, Ethertype, VlanId]),
            KeyBlock::new(2, "L2_VLAN", [VlanId, Pcp, InnerVlanId, SrcPort]),
            KeyBlock::new(3, "IPV4_EX", [SrcIp, DstIp, IpProto, Dscp, Ecn]).with_exclusions([8, 9]),
            KeyBlock::new(4, "IPV4_SIP", [SrcIp, IpProto, Ttl]),
            KeyBlock::new(5, "IPV4_DIP", [DstIp, IpProto, Ttl]),
            KeyBlock::new(6, "L4", [L4SrcPort, L4DstPort, TcpFlags, IpProto]),
            KeyBlock::new(7, "L4_RANGE", [L4PortRange, IpProto, IpFragmented]),
            KeyBlock::new(8, "IPV6_SIP", [SrcIpv6]),
            KeyBlock::new(9, "IPV6_DIP", [DstIpv6]),
            KeyBlock::new(10, "IPV6_EX", [IpProto, Dscp, Ecn, Ttl, IpLength]),
            KeyBlock::new(11, "RX_PORTS", [SrcPort, RxList, IrifId]).with_exclusions([12]),
            KeyBlock::new(12, "TX_PORTS", [TxList, ErifId]),
            KeyBlock::new(13, "CUSTOM_0", [CustomBytes0]),
            KeyBlock::new(14, "CUSTOM_1", [CustomBytes1]),
        ];
        Self::symmetric(blocks.into_iter().map(|b| (b.id, b)).collect())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: KeyBlockId) -> Option<&KeyBlock> {
        self.blocks.get(&id)
    }

    /// Iterates blocks in ascending id order.
    pub fn blocks(&self) -> impl Iterator<Item = &KeyBlock> {
        self.blocks.values()
    }

    /// Returns true if some block exposes `field`.
    pub fn exposes(&self, field: BasicKey) -> bool {
        self.blocks.values().any(|b| b.exposes(field))
    }

    pub fn are_exclusive(&self, a: KeyBlockId, b: KeyBlockId) -> bool {
        self.blocks
            .get(&a)
            .is_some_and(|block| block.exclusive_with.contains(&b))
    }

    /// Union of the fields exposed by `ids`.
    pub fn fields_of(&self, ids: &[KeyBlockId]) -> BTreeSet<BasicKey> {
        ids.iter()
            .filter_map(|id| self.blocks.get(id))
            .flat_map(|b| b.fields.iter().copied())
            .collect()
    }
}

impl Default for KeyBlockCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
