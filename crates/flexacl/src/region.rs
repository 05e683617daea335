//! Regions: hardware rule tables of one key type and fixed capacity.

use flexacl_common::{Arena, Query, QueryResult};
use flexacl_hw::{KeyTypeId, RegionId, RegionKind};
use log::debug;

use crate::config::AclCoreConfig;
use crate::error::{AclError, Result};
use crate::rule::RuleTable;

/// Summary of a region, as returned by region queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
    pub key_type: KeyTypeId,
    pub capacity: u32,
    pub hw_size: u32,
    /// Occupied offsets.
    pub used: usize,
}

/// A region and the rules it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    id: RegionId,
    key_type: KeyTypeId,
    width: u32,
    capacity: u32,
    hw_size: u32,
    rules: RuleTable,
}

impl Region {
    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn key_type(&self) -> KeyTypeId {
        self.key_type
    }

    /// Key blocks per hardware row.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Physical size, `capacity` rounded up to a power of two.
    pub fn hw_size(&self) -> u32 {
        self.hw_size
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub(crate) fn rules_mut(&mut self) -> &mut RuleTable {
        &mut self.rules
    }

    pub fn info(&self) -> RegionInfo {
        RegionInfo {
            key_type: self.key_type,
            capacity: self.capacity,
            hw_size: self.hw_size,
            used: self.rules.len(),
        }
    }

    fn cost(&self) -> u64 {
        row_cost(self.hw_size, self.width)
    }
}

fn row_cost(hw_size: u32, width: u32) -> u64 {
    u64::from(hw_size) * u64::from(width)
}

/// A region creation that passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionPlan {
    pub id: RegionId,
    pub hw_size: u32,
}

/// Owner of all regions and of the hardware row budget.
#[derive(Debug, Clone)]
pub struct RegionAllocator {
    regions: Arena<Region, RegionKind>,
    max_rules_per_region: u32,
    hw_rule_budget: u64,
    hw_used: u64,
}

impl RegionAllocator {
    pub fn new(config: &AclCoreConfig) -> Self {
        Self {
            regions: Arena::with_limit(config.max_regions),
            max_rules_per_region: config.max_rules_per_region,
            hw_rule_budget: config.hw_rule_budget,
            hw_used: 0,
        }
    }

    fn hw_size_for(&self, capacity: u32) -> Result<u32> {
        if capacity == 0 {
            return Err(AclError::invalid("region capacity must be > 0"));
        }
        if capacity > self.max_rules_per_region {
            return Err(AclError::exhausted(format!(
                "capacity {} exceeds {} rules per region",
                capacity, self.max_rules_per_region
            )));
        }
        capacity
            .checked_next_power_of_two()
            .ok_or_else(|| AclError::exhausted(format!("capacity {} cannot be rounded", capacity)))
    }

    /// Checks that releasing `released` rows and taking `needed` rows stays
    /// within the hardware budget.
    fn check_budget(&self, released: u64, needed: u64) -> Result<()> {
        let kept = self.hw_used.checked_sub(released).ok_or_else(|| {
            AclError::invalid(format!(
                "cannot release {} hardware rows, {} in use",
                released, self.hw_used
            ))
        })?;
        match kept.checked_add(needed) {
            Some(after) if after <= self.hw_rule_budget => Ok(()),
            _ => Err(AclError::exhausted(format!(
                "hardware rows exhausted: {} of {} in use, {} more needed",
                kept, self.hw_rule_budget, needed
            ))),
        }
    }

    /// Validates a creation and predicts the id the region will get.
    pub fn plan_create(&self, width: u32, capacity: u32) -> Result<RegionPlan> {
        let hw_size = self.hw_size_for(capacity)?;
        self.check_budget(0, row_cost(hw_size, width))?;
        let id = self
            .regions
            .next_handle()
            .ok_or_else(|| AclError::exhausted("region table is full"))?;
        Ok(RegionPlan { id, hw_size })
    }

    pub(crate) fn insert(
        &mut self,
        key_type: KeyTypeId,
        width: u32,
        capacity: u32,
        hw_size: u32,
    ) -> Result<RegionId> {
        let id = self
            .regions
            .insert_with(|id| Region {
                id,
                key_type,
                width,
                capacity,
                hw_size,
                rules: RuleTable::new(capacity),
            })
            .ok_or_else(|| AclError::exhausted("region table is full"))?;
        self.hw_used += row_cost(hw_size, width);
        Ok(id)
    }

    /// Validates a resize and returns the new hardware size.
    ///
    /// Every occupied offset must stay below the new capacity.
    pub fn plan_resize(&self, id: RegionId, capacity: u32) -> Result<u32> {
        let region = self.get(id)?;
        let hw_size = self.hw_size_for(capacity)?;
        if let Some(highest) = region.rules.highest_used() {
            if highest >= capacity {
                return Err(AclError::exhausted(format!(
                    "{:?} holds a rule at offset {}, cannot shrink to {}",
                    id, highest, capacity
                )));
            }
        }
        self.check_budget(region.cost(), row_cost(hw_size, region.width))?;
        Ok(hw_size)
    }

    pub(crate) fn commit_resize(&mut self, id: RegionId, capacity: u32, hw_size: u32) -> Result<()> {
        let region = self
            .regions
            .get_mut(id)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))?;
        region.rules.resize(capacity)?;
        let old_cost = region.cost();
        region.capacity = capacity;
        region.hw_size = hw_size;
        let new_cost = region.cost();
        self.hw_used = self.hw_used - old_cost + new_cost;
        debug!("{:?} resized to {} (hw {})", id, capacity, hw_size);
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: RegionId) -> Result<Region> {
        let region = self
            .regions
            .remove(id)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))?;
        self.hw_used -= region.cost();
        Ok(region)
    }

    pub fn get(&self, id: RegionId) -> Result<&Region> {
        self.regions
            .get(id)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))
    }

    pub(crate) fn get_mut(&mut self, id: RegionId) -> Result<&mut Region> {
        self.regions
            .get_mut(id)
            .ok_or_else(|| AclError::not_found(format!("{:?}", id)))
    }

    pub fn contains(&self, id: RegionId) -> bool {
        self.regions.contains(id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Hardware rows times width currently allocated.
    pub fn hw_used(&self) -> u64 {
        self.hw_used
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &Region)> {
        self.regions.iter()
    }

    pub fn query(&self, query: Query<RegionId>) -> Result<QueryResult<RegionId>> {
        query
            .select(self.regions.handles())
            .ok_or_else(|| AclError::not_found("region"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::rule::Rule;

    fn key_type() -> KeyTypeId {
        KeyTypeId::from_parts(0, 1)
    }

    fn allocator(budget: u64) -> RegionAllocator {
        let config = AclCoreConfig {
            hw_rule_budget: budget,
            max_rules_per_region: 1000,
            ..AclCoreConfig::default()
        };
        RegionAllocator::new(&config)
    }

    fn create(alloc: &mut RegionAllocator, width: u32, capacity: u32) -> Result<RegionId> {
        let plan = alloc.plan_create(width, capacity)?;
        let id = alloc.insert(key_type(), width, capacity, plan.hw_size)?;
        assert_eq!(id, plan.id);
        Ok(id)
    }

    #[test]
    fn test_hw_size_rounding() {
        let mut alloc = allocator(10_000);
        let id = create(&mut alloc, 2, 100).unwrap();
        let region = alloc.get(id).unwrap();
        assert_eq!(region.capacity(), 100);
        assert_eq!(region.hw_size(), 128);
        assert_eq!(alloc.hw_used(), 256);

        let exact = create(&mut alloc, 1, 64).unwrap();
        assert_eq!(alloc.get(exact).unwrap().hw_size(), 64);
    }

    #[test]
    fn test_capacity_limits() {
        let mut alloc = allocator(10_000);
        assert_eq!(
            alloc.plan_create(1, 0).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
        assert_eq!(
            alloc.plan_create(1, 1001).unwrap_err().kind(),
            ErrorKind::ResourceExhausted
        );
        create(&mut alloc, 1, 1000).unwrap();
    }

    #[test]
    fn test_budget_exhaustion() {
        let mut alloc = allocator(512);
        create(&mut alloc, 2, 128).unwrap();
        assert_eq!(
            alloc.plan_create(2, 200).unwrap_err().kind(),
            ErrorKind::ResourceExhausted
        );
        create(&mut alloc, 2, 128).unwrap();
        assert_eq!(alloc.hw_used(), 512);
    }

    #[test]
    fn test_resize_checks_occupied_offsets() {
        let mut alloc = allocator(10_000);
        let id = create(&mut alloc, 1, 32).unwrap();
        alloc.get_mut(id).unwrap().rules_mut().set(20, Rule::new(1)).unwrap();

        let err = alloc.plan_resize(id, 20).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);

        let hw_size = alloc.plan_resize(id, 21).unwrap();
        assert_eq!(hw_size, 32);
        alloc.commit_resize(id, 21, hw_size).unwrap();
        assert_eq!(alloc.get(id).unwrap().info().used, 1);

        let hw_size = alloc.plan_resize(id, 200).unwrap();
        alloc.commit_resize(id, 200, hw_size).unwrap();
        assert_eq!(alloc.hw_used(), 256);
    }

    #[test]
    fn test_resize_within_budget_counts_released_rows() {
        let mut alloc = allocator(256);
        let id = create(&mut alloc, 1, 200).unwrap();
        assert!(alloc.plan_resize(id, 256).is_ok());
        assert!(alloc.plan_resize(id, 257).is_err());
    }

    #[test]
    fn test_budget_check_arithmetic() {
        let mut alloc = allocator(256);
        create(&mut alloc, 1, 128).unwrap();
        assert!(alloc.check_budget(128, 256).is_ok());
        assert_eq!(
            alloc.check_budget(0, u64::MAX).unwrap_err().kind(),
            ErrorKind::ResourceExhausted
        );
        assert_eq!(
            alloc.check_budget(129, 0).unwrap_err().kind(),
            ErrorKind::InvalidParam
        );
    }

    #[test]
    fn test_remove_returns_rows() {
        let mut alloc = allocator(1024);
        let id = create(&mut alloc, 4, 100).unwrap();
        assert_eq!(alloc.hw_used(), 512);
        alloc.remove(id).unwrap();
        assert_eq!(alloc.hw_used(), 0);
        assert_eq!(alloc.get(id).unwrap_err().kind(), ErrorKind::EntryNotFound);
    }
}
