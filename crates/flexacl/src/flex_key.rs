//! Flex key compilation and key-type interning.
//!
//! [`FlexKeyCompiler`] turns a set of requested basic keys into the smallest
//! set of compatible key blocks covering them. A greedy pass (most uncovered
//! fields first, lowest id on ties) gives an upper bound; an exhaustive pass
//! over smaller block counts then proves the result minimal or finds a
//! smaller cover. The exhaustive pass gives up after
//! [`MAX_EXACT_COMBINATIONS`] candidate sets and the greedy cover is used.
//! Results are deterministic for a given catalog.
//!
//! [`KeyTypeRegistry`] interns compiled covers by their canonical field set
//! so repeated requests for the same fields return the same key type.

use std::collections::BTreeSet;

use flexacl_common::{Arena, HasRefCount, Query, QueryResult};
use flexacl_hw::{KeyTypeId, KeyTypeKind};
use log::{debug, info};

use crate::error::{AclError, Result};
use crate::key_block::{KeyBlockCatalog, KeyBlockId};
use crate::types::BasicKey;

/// Block combinations the exhaustive pass examines before settling for the
/// greedy cover.
pub const MAX_EXACT_COMBINATIONS: usize = 1 << 16;

/// Pure cover computation over a catalog.
#[derive(Debug, Clone, Copy)]
pub struct FlexKeyCompiler<'a> {
    catalog: &'a KeyBlockCatalog,
    max_blocks: usize,
}

impl<'a> FlexKeyCompiler<'a> {
    pub fn new(catalog: &'a KeyBlockCatalog, max_blocks: usize) -> Self {
        Self {
            catalog,
            max_blocks,
        }
    }

    /// Computes a minimal cover of `fields`, blocks in ascending id order.
    pub fn compile(&self, fields: &BTreeSet<BasicKey>) -> Result<Vec<KeyBlockId>> {
        self.cover(fields, None)
    }

    /// Computes a minimal cover that starts with `first`.
    pub fn compile_with_first(
        &self,
        fields: &BTreeSet<BasicKey>,
        first: KeyBlockId,
    ) -> Result<Vec<KeyBlockId>> {
        self.cover(fields, Some(first))
    }

    fn cover(
        &self,
        fields: &BTreeSet<BasicKey>,
        forced: Option<KeyBlockId>,
    ) -> Result<Vec<KeyBlockId>> {
        if fields.is_empty() {
            return Err(AclError::invalid("key type needs at least one field"));
        }
        if let Some(field) = fields.iter().find(|f| !self.catalog.exposes(**f)) {
            return Err(AclError::invalid(format!(
                "no key block exposes field {}",
                field
            )));
        }

        let mut remaining = fields.clone();
        let mut budget = self.max_blocks;
        if let Some(first) = forced {
            let block = self
                .catalog
                .get(first)
                .ok_or_else(|| AclError::invalid(format!("unknown key block {}", first)))?;
            if budget == 0 {
                return Err(AclError::exhausted("key block budget is zero"));
            }
            remaining.retain(|f| !block.exposes(*f));
            budget -= 1;
        }

        let candidates: Vec<KeyBlockId> = self
            .catalog
            .blocks()
            .filter(|b| Some(b.id) != forced)
            .filter(|b| forced.map_or(true, |f| !self.catalog.are_exclusive(f, b.id)))
            .filter(|b| b.fields.iter().any(|f| remaining.contains(f)))
            .map(|b| b.id)
            .collect();

        let chosen = if remaining.is_empty() {
            Vec::new()
        } else {
            let greedy = self.greedy(&remaining, &candidates);
            let limit = match &greedy {
                Some(g) => g.len().saturating_sub(1).min(budget),
                None => budget,
            };
            match self.exact(&remaining, &candidates, limit) {
                Some(smaller) => smaller,
                None => match greedy {
                    Some(g) if g.len() <= budget => g,
                    _ => {
                        return Err(AclError::exhausted(format!(
                            "no cover of {} fields within {} key blocks",
                            fields.len(),
                            self.max_blocks
                        )))
                    }
                },
            }
        };

        let mut result: Vec<KeyBlockId> = forced.into_iter().collect();
        let mut rest = chosen;
        rest.sort_unstable();
        result.extend(rest);
        Ok(result)
    }

    fn greedy(
        &self,
        fields: &BTreeSet<BasicKey>,
        candidates: &[KeyBlockId],
    ) -> Option<Vec<KeyBlockId>> {
        let mut uncovered = fields.clone();
        let mut chosen: Vec<KeyBlockId> = Vec::new();

        while !uncovered.is_empty() {
            let mut best: Option<(usize, KeyBlockId)> = None;
            for id in candidates {
                if chosen.contains(id) || chosen.iter().any(|c| self.catalog.are_exclusive(*c, *id))
                {
                    continue;
                }
                let Some(block) = self.catalog.get(*id) else {
                    continue;
                };
                let gain = block.fields.iter().filter(|f| uncovered.contains(f)).count();
                // Candidates are in ascending id order, so strict > keeps the lowest id.
                if gain > 0 && best.map_or(true, |(g, _)| gain > g) {
                    best = Some((gain, *id));
                }
            }
            let (_, id) = best?;
            if let Some(block) = self.catalog.get(id) {
                uncovered.retain(|f| !block.exposes(*f));
            }
            chosen.push(id);
        }
        Some(chosen)
    }

    /// Returns the first valid cover of at most `limit` blocks, trying block
    /// counts from one upwards and combinations in lexicographic order.
    /// Gives up with `None` after `MAX_EXACT_COMBINATIONS` combinations.
    fn exact(
        &self,
        fields: &BTreeSet<BasicKey>,
        candidates: &[KeyBlockId],
        limit: usize,
    ) -> Option<Vec<KeyBlockId>> {
        let n = candidates.len();
        let mut examined = 0usize;
        for k in 1..=limit.min(n) {
            let mut idx: Vec<usize> = (0..k).collect();
            loop {
                examined += 1;
                if examined > MAX_EXACT_COMBINATIONS {
                    debug!(
                        "exact cover search stopped after {} combinations of {} blocks",
                        MAX_EXACT_COMBINATIONS, n
                    );
                    return None;
                }
                let combo: Vec<KeyBlockId> = idx.iter().map(|i| candidates[*i]).collect();
                if self.is_valid_cover(fields, &combo) {
                    return Some(combo);
                }
                // Advance to the next k-combination of 0..n.
                let Some(pos) = (0..k).rev().find(|&i| idx[i] < n - k + i) else {
                    break;
                };
                idx[pos] += 1;
                for j in pos + 1..k {
                    idx[j] = idx[j - 1] + 1;
                }
            }
        }
        None
    }

    fn is_valid_cover(&self, fields: &BTreeSet<BasicKey>, combo: &[KeyBlockId]) -> bool {
        for (i, a) in combo.iter().enumerate() {
            if combo[i + 1..].iter().any(|b| self.catalog.are_exclusive(*a, *b)) {
                return false;
            }
        }
        let covered = self.catalog.fields_of(combo);
        fields.is_subset(&covered)
    }
}

/// An interned key type: the requested fields and the blocks realising them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyType {
    pub id: KeyTypeId,
    /// Canonical (sorted, deduplicated) requested fields.
    pub fields: BTreeSet<BasicKey>,
    /// Key blocks, first block first.
    pub blocks: Vec<KeyBlockId>,
    regions: u32,
}

impl KeyType {
    /// Number of key blocks, the hardware width of each rule row.
    pub fn width(&self) -> u32 {
        self.blocks.len() as u32
    }

    pub fn first_block(&self) -> Option<KeyBlockId> {
        self.blocks.first().copied()
    }
}

impl HasRefCount for KeyType {
    fn increment_ref(&mut self) -> u32 {
        self.regions += 1;
        self.regions
    }

    fn decrement_ref(&mut self) -> Option<u32> {
        self.regions = self.regions.checked_sub(1)?;
        Some(self.regions)
    }

    fn ref_count(&self) -> u32 {
        self.regions
    }
}

/// Registry of interned key types, reference counted by regions.
#[derive(Debug, Clone)]
pub struct KeyTypeRegistry {
    types: Arena<KeyType, KeyTypeKind>,
    interned: flexacl_common::SyncMap<Vec<BasicKey>, KeyTypeId>,
    max_blocks: usize,
}

impl KeyTypeRegistry {
    pub fn new(max_key_types: usize, max_blocks: usize) -> Self {
        Self {
            types: Arena::with_limit(max_key_types),
            interned: flexacl_common::SyncMap::new(),
            max_blocks,
        }
    }

    /// Returns the key type for `fields`, compiling and registering it if
    /// needed.
    ///
    /// With a `hint`, an existing key type whose first block is the hint and
    /// whose fields include the request is preferred; otherwise a cover
    /// starting with the hinted block is compiled.
    pub fn intern(
        &mut self,
        catalog: &KeyBlockCatalog,
        fields: &[BasicKey],
        hint: Option<KeyBlockId>,
    ) -> Result<KeyTypeId> {
        let canonical: BTreeSet<BasicKey> = fields.iter().copied().collect();
        let key: Vec<BasicKey> = canonical.iter().copied().collect();
        let compiler = FlexKeyCompiler::new(catalog, self.max_blocks);

        let blocks = match hint {
            None => {
                if let Some(id) = self.interned.get(&key) {
                    debug!("key type {:?} reused for {} fields", id, key.len());
                    return Ok(*id);
                }
                compiler.compile(&canonical)?
            }
            Some(first) => {
                if let Some(id) = self.find_hinted(&canonical, first) {
                    debug!("key type {:?} reused through hint {}", id, first);
                    return Ok(id);
                }
                let blocks = compiler.compile_with_first(&canonical, first)?;
                if let Some(id) = self
                    .interned
                    .get(&key)
                    .filter(|id| self.types.get(**id).is_some_and(|kt| kt.blocks == blocks))
                {
                    return Ok(*id);
                }
                blocks
            }
        };

        let id = self
            .types
            .insert_with(|id| KeyType {
                id,
                fields: canonical,
                blocks,
                regions: 0,
            })
            .ok_or_else(|| AclError::exhausted("key type table is full"))?;
        if !self.interned.contains_key(&key) {
            self.interned.insert(key, id);
        }
        info!("key type {:?} created", id);
        Ok(id)
    }

    fn find_hinted(&self, fields: &BTreeSet<BasicKey>, first: KeyBlockId) -> Option<KeyTypeId> {
        let compatible = |kt: &KeyType| kt.first_block() == Some(first) && fields.is_subset(&kt.fields);
        self.types
            .iter()
            .find(|(_, kt)| compatible(kt) && kt.fields == *fields)
            .or_else(|| self.types.iter().find(|(_, kt)| compatible(kt)))
            .map(|(id, _)| id)
    }

    /// Removes a key type no region uses.
    pub fn destroy(&mut self, id: KeyTypeId) -> Result<()> {
        let kt = self.get(id)?;
        if kt.ref_count() > 0 {
            return Err(AclError::in_use(format!(
                "{:?} is used by {} region(s)",
                id,
                kt.ref_count()
            )));
        }
        let key: Vec<BasicKey> = kt.fields.iter().copied().collect();
        self.types.remove(id);
        if self.interned.get(&key) == Some(&id) {
            self.interned.remove(&key);
        }
        info!("key type {:?} destroyed", id);
        Ok(())
    }

    pub fn get(&self, id: KeyTypeId) -> Result<&KeyType> {
        self.types.get(id).ok_or_else(|| AclError::not_found(format!("{:?}", id)))
    }

    pub(crate) fn acquire(&mut self, id: KeyTypeId) -> Result<u32> {
        self.types
            .increment_ref(id)
            .map_err(|e| AclError::from_ref_count(e, format!("{:?}", id)))
    }

    pub(crate) fn release(&mut self, id: KeyTypeId) -> Result<u32> {
        self.types
            .decrement_ref(id)
            .map_err(|e| AclError::from_ref_count(e, format!("{:?}", id)))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn query(&self, query: Query<KeyTypeId>) -> Result<QueryResult<KeyTypeId>> {
        query
            .select(self.types.handles())
            .ok_or_else(|| AclError::not_found("key type"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::key_block::KeyBlock;
    use pretty_assertions::assert_eq;
    use BasicKey::*;

    fn set(fields: &[BasicKey]) -> BTreeSet<BasicKey> {
        fields.iter().copied().collect()
    }

    fn ids(raw: &[u16]) -> Vec<KeyBlockId> {
        raw.iter().map(|i| KeyBlockId(*i)).collect()
    }

    #[test]
    fn test_ipv4_five_tuple_cover() {
        let catalog = KeyBlockCatalog::builtin();
        let compiler = FlexKeyCompiler::new(&catalog, 6);
        let blocks = compiler.compile(&set(&[SrcIp, DstIp, L4DstPort])).unwrap();
        assert_eq!(blocks, ids(&[3, 6]));
    }

    #[test]
    fn test_single_field_prefers_lowest_id() {
        let catalog = KeyBlockCatalog::builtin();
        let compiler = FlexKeyCompiler::new(&catalog, 6);
        assert_eq!(compiler.compile(&set(&[IpProto])).unwrap(), ids(&[3]));
    }

    #[test]
    fn test_exclusion_forces_alternative_blocks() {
        let catalog = KeyBlockCatalog::builtin();
        let compiler = FlexKeyCompiler::new(&catalog, 6);
        // IPV4_EX cannot sit next to the IPv6 address blocks.
        let blocks = compiler.compile(&set(&[SrcIp, DstIp, SrcIpv6])).unwrap();
        assert_eq!(blocks, ids(&[4, 5, 8]));
    }

    #[test]
    fn test_exact_pass_beats_greedy() {
        // Greedy takes block 1 (three fields) and then needs two more;
        // blocks 2 and 3 alone cover everything.
        let catalog = KeyBlockCatalog::new([
            KeyBlock::new(1, "WIDE", [SrcIp, DstIp, Dscp]),
            KeyBlock::new(2, "LEFT", [SrcIp, Dscp, Ttl]),
            KeyBlock::new(3, "RIGHT", [DstIp, Ecn]),
            KeyBlock::new(4, "TTL", [Ttl]),
            KeyBlock::new(5, "ECN", [Ecn]),
        ])
        .unwrap();
        let compiler = FlexKeyCompiler::new(&catalog, 4);
        let blocks = compiler.compile(&set(&[SrcIp, DstIp, Dscp, Ttl, Ecn])).unwrap();
        assert_eq!(blocks, ids(&[2, 3]));
    }

    #[test]
    fn test_large_catalog_falls_back_to_greedy() {
        let pool = [SrcIp, DstIp, IpProto, L4SrcPort, L4DstPort, VlanId];
        let catalog = KeyBlockCatalog::new(
            (0..60u16).map(|id| KeyBlock::new(id, format!("B{}", id), [pool[id as usize % 6]])),
        )
        .unwrap();
        let compiler = FlexKeyCompiler::new(&catalog, 6);
        let blocks = compiler.compile(&pool.into_iter().collect()).unwrap();
        assert_eq!(blocks, ids(&[0, 1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_over_budget_is_exhausted() {
        let catalog = KeyBlockCatalog::builtin();
        let compiler = FlexKeyCompiler::new(&catalog, 2);
        let err = compiler
            .compile(&set(&[SrcIpv6, DstIpv6, Smac, Dmac]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_exclusive_only_cover_is_exhausted() {
        let catalog = KeyBlockCatalog::builtin();
        let compiler = FlexKeyCompiler::new(&catalog, 6);
        // RX_PORTS and TX_PORTS are the only blocks for these fields.
        let err = compiler.compile(&set(&[RxList, TxList])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn test_empty_and_unexposed_fields_are_invalid() {
        let catalog = KeyBlockCatalog::new([KeyBlock::new(0, "IP", [SrcIp])]).unwrap();
        let compiler = FlexKeyCompiler::new(&catalog, 6);
        assert_eq!(
            compiler.compile(&BTreeSet::new()).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
        assert_eq!(
            compiler.compile(&set(&[DstIp])).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
    }

    #[test]
    fn test_forced_first_block() {
        let catalog = KeyBlockCatalog::builtin();
        let compiler = FlexKeyCompiler::new(&catalog, 6);
        let blocks = compiler
            .compile_with_first(&set(&[SrcIp, DstIp]), KeyBlockId(4))
            .unwrap();
        assert_eq!(blocks, ids(&[4, 3]));
    }

    #[test]
    fn test_intern_is_idempotent_and_order_insensitive() {
        let catalog = KeyBlockCatalog::builtin();
        let mut registry = KeyTypeRegistry::new(8, 6);
        let a = registry.intern(&catalog, &[DstIp, SrcIp], None).unwrap();
        let b = registry.intern(&catalog, &[SrcIp, DstIp, SrcIp], None).unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_hint_reuses_compatible_key_type() {
        let catalog = KeyBlockCatalog::builtin();
        let mut registry = KeyTypeRegistry::new(8, 6);
        let wide = registry
            .intern(&catalog, &[SrcIp, DstIp, Dscp], None)
            .unwrap();
        assert_eq!(registry.get(wide).unwrap().first_block(), Some(KeyBlockId(3)));

        let hinted = registry
            .intern(&catalog, &[SrcIp], Some(KeyBlockId(3)))
            .unwrap();
        assert_eq!(hinted, wide);

        let other = registry
            .intern(&catalog, &[SrcIp, DstIp], Some(KeyBlockId(4)))
            .unwrap();
        assert_ne!(other, wide);
        assert_eq!(registry.get(other).unwrap().blocks, ids(&[4, 3]));
    }

    #[test]
    fn test_destroy_respects_region_references() {
        let catalog = KeyBlockCatalog::builtin();
        let mut registry = KeyTypeRegistry::new(8, 6);
        let id = registry.intern(&catalog, &[Dmac], None).unwrap();
        registry.acquire(id).unwrap();
        assert_eq!(registry.destroy(id).unwrap_err().kind(), ErrorKind::ResourceInUse);

        registry.release(id).unwrap();
        registry.destroy(id).unwrap();
        assert_eq!(registry.get(id).unwrap_err().kind(), ErrorKind::EntryNotFound);

        let again = registry.intern(&catalog, &[Dmac], None).unwrap();
        assert_ne!(again, id);
    }

    #[test]
    fn test_registry_limit() {
        let catalog = KeyBlockCatalog::builtin();
        let mut registry = KeyTypeRegistry::new(1, 6);
        registry.intern(&catalog, &[Dmac], None).unwrap();
        let err = registry.intern(&catalog, &[Smac], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }
}
