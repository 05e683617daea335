//! The ACL core of one device.
//!
//! `AclCore` owns every ACL object of a device and is the only place that
//! talks to the [`AclDevice`]. Mutating operations follow one pattern:
//!
//! 1. Validate the request against the in-memory model.
//! 2. Issue a single device call.
//! 3. Commit the change to the in-memory model, adjust reference counts and
//!    emit the event, only once the device accepted it.
//!
//! A device error therefore leaves the model exactly as it was before the
//! call.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use flexacl_common::{Query, QueryResult};
use flexacl_hw::{
    AclDevice, AclId, CustomBytesId, FlowCounterId, GroupId, HwResult, KeyTypeId, PbsId,
    PortListId, RangeId, RegionId, VlanGroupId,
};
use log::{debug, info, warn};

use crate::acl::{Acl, AclStore};
use crate::binding::{
    raw_targets, BindTarget, BindingKey, BindingList, BindingState, BindingTable, BoundEntry,
};
use crate::config::AclCoreConfig;
use crate::error::{AclError, Result};
use crate::events::{AclEvent, EventHub, EventKind, EventSink};
use crate::flex_key::KeyTypeRegistry;
use crate::group::{AclGroup, GroupManager};
use crate::key_block::{KeyBlockCatalog, KeyBlockId};
use crate::pools::{PoolRefs, Pools};
use crate::region::{Region, RegionAllocator, RegionInfo};
use crate::rule::Rule;
use crate::types::{AclType, AttachPoint, BasicKey, Direction, DirectionSet, ObjectKind};

/// ACL core statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AclCoreStats {
    /// Number of key types compiled.
    pub key_types_created: u64,
    /// Number of regions created.
    pub regions_created: u64,
    /// Number of regions destroyed.
    pub regions_destroyed: u64,
    /// Number of rules written.
    pub rules_set: u64,
    /// Number of rules cleared.
    pub rules_deleted: u64,
    /// Number of bind and add operations.
    pub binds: u64,
    /// Number of unbind and delete operations.
    pub unbinds: u64,
    /// Number of device calls that failed. The change each carried was
    /// discarded.
    pub hw_failures: u64,
}

/// How `get_rules` selects offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleLookup<'a> {
    /// Occupied offsets from the start of the region, at most `max`.
    /// `max == 0` returns the count only.
    Scan { max: usize },
    /// Exactly these offsets, occupied or not.
    Targeted(&'a [u32]),
}

/// One offset of a rule listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub offset: u32,
    pub occupied: bool,
    /// The rule, when keys and actions were requested.
    pub rule: Option<Rule>,
}

/// Result of `get_rules`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleListing {
    /// Occupied offsets in the region.
    pub total: usize,
    pub entries: Vec<RuleEntry>,
}

fn rule_entry(offset: u32, rule: Option<&Rule>, want: bool) -> RuleEntry {
    RuleEntry {
        offset,
        occupied: rule.is_some(),
        rule: if want { rule.cloned() } else { None },
    }
}

/// A satellite pool entry, for deletion through the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEntry {
    Pbs(PbsId),
    Range(RangeId),
    CustomBytes(CustomBytesId),
    PortList(PortListId),
    VlanGroup(VlanGroupId),
}

/// ACL key compiler and resource manager of one device.
pub struct AclCore {
    config: AclCoreConfig,
    device: Arc<dyn AclDevice>,
    catalog: KeyBlockCatalog,
    key_types: KeyTypeRegistry,
    regions: RegionAllocator,
    acls: AclStore,
    groups: GroupManager,
    bindings: BindingTable,
    pools: Pools,
    events: EventHub,
    stats: AclCoreStats,
}

impl AclCore {
    /// Creates a core using the built-in key-block catalog.
    pub fn new(config: AclCoreConfig, device: Arc<dyn AclDevice>) -> Result<Self> {
        Self::with_catalog(config, device, KeyBlockCatalog::builtin())
    }

    pub fn with_catalog(
        config: AclCoreConfig,
        device: Arc<dyn AclDevice>,
        catalog: KeyBlockCatalog,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| AclError::invalid(e.to_string()))?;
        info!(
            "ACL core starting: {} key blocks, {} regions max, {} hw rows",
            catalog.len(),
            config.max_regions,
            config.hw_rule_budget
        );
        Ok(Self {
            key_types: KeyTypeRegistry::new(config.max_key_types, config.max_key_blocks),
            regions: RegionAllocator::new(&config),
            acls: AclStore::new(config.max_acls),
            groups: GroupManager::new(
                config.max_groups,
                config.max_acls_per_group,
                config.group_priority,
            ),
            bindings: BindingTable::new(),
            pools: Pools::new(&config),
            events: EventHub::default(),
            stats: AclCoreStats::default(),
            config,
            device,
            catalog,
        })
    }

    pub fn config(&self) -> &AclCoreConfig {
        &self.config
    }

    pub fn catalog(&self) -> &KeyBlockCatalog {
        &self.catalog
    }

    pub fn stats(&self) -> &AclCoreStats {
        &self.stats
    }

    /// Converts a device result, counting and logging failures.
    fn hw<T>(&mut self, operation: &str, result: HwResult<T>) -> Result<T> {
        result.map_err(|err| {
            self.stats.hw_failures += 1;
            warn!("{} rejected by device, change discarded: {}", operation, err);
            AclError::from(err)
        })
    }

    fn deleted(&self, kind: ObjectKind, id: u64) {
        self.events.emit(AclEvent::ObjectDeleted { kind, id });
    }

    // ============ Events ============

    pub fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.events.set_sink(sink);
    }

    pub fn subscribe(&mut self, kind: EventKind) {
        self.events.subscribe(kind);
    }

    pub fn unsubscribe(&mut self, kind: EventKind) {
        self.events.unsubscribe(kind);
    }

    // ============ Key Types ============

    /// Compiles (or reuses) the key type covering `fields`.
    pub fn create_key_type(
        &mut self,
        fields: &[BasicKey],
        hint: Option<KeyBlockId>,
    ) -> Result<KeyTypeId> {
        let before = self.key_types.len();
        let id = self.key_types.intern(&self.catalog, fields, hint)?;
        if self.key_types.len() > before {
            self.stats.key_types_created += 1;
        }
        Ok(id)
    }

    pub fn destroy_key_type(&mut self, id: KeyTypeId) -> Result<()> {
        self.key_types.destroy(id)?;
        self.deleted(ObjectKind::KeyType, id.as_raw());
        Ok(())
    }

    pub fn key_type_fields(&self, id: KeyTypeId) -> Result<&BTreeSet<BasicKey>> {
        Ok(&self.key_types.get(id)?.fields)
    }

    pub fn key_type_blocks(&self, id: KeyTypeId) -> Result<&[KeyBlockId]> {
        Ok(&self.key_types.get(id)?.blocks)
    }

    pub fn key_types(&self, query: Query<KeyTypeId>) -> Result<QueryResult<KeyTypeId>> {
        self.key_types.query(query)
    }

    // ============ Regions ============

    pub fn create_region(&mut self, key_type: KeyTypeId, capacity: u32) -> Result<RegionId> {
        let kt = self.key_types.get(key_type)?;
        let width = kt.width();
        let blocks: Vec<u16> = kt.blocks.iter().map(|b| b.0).collect();
        let plan = self.regions.plan_create(width, capacity)?;

        let result = self.device.create_region(plan.id, &blocks, plan.hw_size);
        self.hw("create_region", result)?;

        let id = self.regions.insert(key_type, width, capacity, plan.hw_size)?;
        self.key_types.acquire(key_type)?;
        self.stats.regions_created += 1;
        info!(
            "{:?} created with {:?}: capacity {} hw size {}",
            id, key_type, capacity, plan.hw_size
        );
        Ok(id)
    }

    /// Changes the capacity of a region, keeping every rule at its offset.
    /// Returns the new hardware size.
    pub fn resize_region(&mut self, region: RegionId, capacity: u32) -> Result<u32> {
        let hw_size = self.regions.plan_resize(region, capacity)?;

        let result = self.device.resize_region(region, hw_size);
        self.hw("resize_region", result)?;

        self.regions.commit_resize(region, capacity, hw_size)?;
        info!("{:?} resized: capacity {} hw size {}", region, capacity, hw_size);
        self.events.emit(AclEvent::RegionResized {
            region: region.as_raw(),
            hw_size,
        });
        Ok(hw_size)
    }

    /// Destroys a region no ACL uses. Its rules are dropped with it.
    pub fn destroy_region(&mut self, region: RegionId) -> Result<()> {
        self.regions.get(region)?;
        if let Some(acl) = self.acls.user_of(region) {
            return Err(AclError::in_use(format!("{:?} is used by {:?}", region, acl)));
        }

        let result = self.device.destroy_region(region);
        self.hw("destroy_region", result)?;

        let removed = self.regions.remove(region)?;
        self.key_types.release(removed.key_type())?;
        let mut refs = PoolRefs::default();
        for (_, rule) in removed.rules().occupied() {
            refs.extend(rule.pool_refs());
        }
        self.pools.release(&refs)?;
        self.stats.regions_destroyed += 1;
        info!("{:?} destroyed with {} rules", region, removed.rules().len());
        self.deleted(ObjectKind::Region, region.as_raw());
        Ok(())
    }

    pub fn region(&self, region: RegionId) -> Result<&Region> {
        self.regions.get(region)
    }

    pub fn region_hw_size(&self, region: RegionId) -> Result<u32> {
        Ok(self.regions.get(region)?.hw_size())
    }

    pub fn region_info(&self, region: RegionId) -> Result<RegionInfo> {
        Ok(self.regions.get(region)?.info())
    }

    pub fn regions(&self, query: Query<RegionId>) -> Result<QueryResult<RegionId>> {
        self.regions.query(query)
    }

    // ============ Rules ============

    /// Writes `rules[i]` at `offsets[i]`, all or nothing.
    pub fn set_rules(&mut self, region: RegionId, offsets: &[u32], rules: &[Rule]) -> Result<()> {
        let target = self.regions.get(region)?;
        if offsets.len() != rules.len() {
            return Err(AclError::invalid(format!(
                "{} offsets given for {} rules",
                offsets.len(),
                rules.len()
            )));
        }
        if rules.len() > self.config.max_rule_batch {
            return Err(AclError::exhausted(format!(
                "batch of {} rules exceeds {}",
                rules.len(),
                self.config.max_rule_batch
            )));
        }
        let fields = &self.key_types.get(target.key_type())?.fields;
        let mut seen = HashSet::new();
        let mut refs = PoolRefs::default();
        for (offset, rule) in offsets.iter().zip(rules) {
            target.rules().check_offset(*offset)?;
            if !seen.insert(*offset) {
                return Err(AclError::invalid(format!("offset {} given twice", offset)));
            }
            rule.validate(fields, &self.config.rule_priority)?;
            refs.extend(rule.pool_refs());
        }
        self.pools.check_refs(&refs)?;
        if rules.is_empty() {
            return Ok(());
        }

        let images: Vec<_> = offsets
            .iter()
            .zip(rules)
            .map(|(offset, rule)| rule.to_image(*offset))
            .collect();
        let result = self.device.write_rules(region, &images);
        self.hw("write_rules", result)?;

        self.pools.acquire(&refs)?;
        let table = self.regions.get_mut(region)?.rules_mut();
        let mut replaced = PoolRefs::default();
        for (offset, rule) in offsets.iter().zip(rules) {
            if let Some(old) = table.set(*offset, rule.clone())? {
                replaced.extend(old.pool_refs());
            }
        }
        self.pools.release(&replaced)?;
        self.stats.rules_set += rules.len() as u64;
        debug!("{:?}: {} rules set ({})", region, rules.len(), refs);
        Ok(())
    }

    /// Clears the given offsets. Offsets that are already empty are skipped.
    pub fn delete_rules(&mut self, region: RegionId, offsets: &[u32]) -> Result<()> {
        let table = self.regions.get(region)?.rules();
        let mut occupied = Vec::new();
        for offset in offsets {
            if table.get(*offset)?.is_some() && !occupied.contains(offset) {
                occupied.push(*offset);
            }
        }
        if occupied.is_empty() {
            return Ok(());
        }

        let result = self.device.clear_rules(region, &occupied);
        self.hw("clear_rules", result)?;

        let table = self.regions.get_mut(region)?.rules_mut();
        let mut released = PoolRefs::default();
        for offset in &occupied {
            if let Some(rule) = table.clear(*offset)? {
                released.extend(rule.pool_refs());
            }
        }
        self.pools.release(&released)?;
        self.stats.rules_deleted += occupied.len() as u64;
        debug!("{:?}: {} rules deleted", region, occupied.len());
        Ok(())
    }

    pub fn delete_all_rules(&mut self, region: RegionId) -> Result<()> {
        let offsets: Vec<u32> = self
            .regions
            .get(region)?
            .rules()
            .occupied()
            .map(|(offset, _)| offset)
            .collect();
        self.delete_rules(region, &offsets)
    }

    /// Lists rules of a region. With `want` false only offsets and occupancy
    /// are returned.
    pub fn get_rules(
        &self,
        region: RegionId,
        lookup: RuleLookup<'_>,
        want: bool,
    ) -> Result<RuleListing> {
        let table = self.regions.get(region)?.rules();
        let entries = match lookup {
            RuleLookup::Scan { max } => table
                .occupied()
                .take(max)
                .map(|(offset, rule)| rule_entry(offset, Some(rule), want))
                .collect(),
            RuleLookup::Targeted(offsets) => offsets
                .iter()
                .map(|offset| -> Result<RuleEntry> {
                    Ok(rule_entry(*offset, table.get(*offset)?, want))
                })
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(RuleListing {
            total: table.len(),
            entries,
        })
    }

    /// Moves `size` slots from `src` to `dst`. Rules at the destination take
    /// over the vacated source slots.
    pub fn move_block(&mut self, region: RegionId, src: u32, size: u32, dst: u32) -> Result<()> {
        self.regions.get(region)?.rules().check_block(src, size, dst)?;

        let result = self.device.move_rules(region, src, size, dst);
        self.hw("move_rules", result)?;

        self.regions
            .get_mut(region)?
            .rules_mut()
            .move_block(src, size, dst)?;
        debug!("{:?}: moved {} slots {} -> {}", region, size, src, dst);
        Ok(())
    }

    /// ACLs enforced by some binding, directly or through a group chain.
    fn bound_acls(&self) -> HashSet<AclId> {
        let mut acls = HashSet::new();
        for (_, entry) in self.bindings.iter() {
            match entry.target {
                BindTarget::Acl(id) => {
                    acls.insert(id);
                }
                BindTarget::Group(head) => {
                    for id in self.groups.chain_from(head) {
                        if let Ok(group) = self.groups.get(id) {
                            acls.extend(group.acls.iter().copied());
                        }
                    }
                }
            }
        }
        acls
    }

    /// Returns true if a bound ACL searches `region`.
    pub fn is_region_bound(&self, region: RegionId) -> bool {
        self.bound_acls()
            .into_iter()
            .any(|id| self.acls.get(id).is_ok_and(|acl| acl.uses_region(region)))
    }

    fn check_activity(&self, region: RegionId, offsets: &[u32]) -> Result<()> {
        let table = self.regions.get(region)?.rules();
        for offset in offsets {
            table.check_offset(*offset)?;
        }
        if !self.is_region_bound(region) {
            return Err(AclError::invalid(format!(
                "{:?} is not bound, activity is undefined",
                region
            )));
        }
        Ok(())
    }

    /// Reads the activity bit of a rule in a bound region, clearing it when
    /// `clear` is set.
    pub fn activity(&mut self, region: RegionId, offset: u32, clear: bool) -> Result<bool> {
        self.check_activity(region, &[offset])?;
        self.read_activity(region, offset, clear)
    }

    pub fn activity_bulk(
        &mut self,
        region: RegionId,
        offsets: &[u32],
        clear: bool,
    ) -> Result<Vec<bool>> {
        self.check_activity(region, offsets)?;
        offsets
            .iter()
            .map(|offset| self.read_activity(region, *offset, clear))
            .collect()
    }

    /// Reads activity bits without clearing them. Runs under a shared
    /// borrow, so concurrent readers of an [`AclCoreHandle`] may use it.
    ///
    /// [`AclCoreHandle`]: crate::handle::AclCoreHandle
    pub fn peek_activity(&self, region: RegionId, offsets: &[u32]) -> Result<Vec<bool>> {
        self.check_activity(region, offsets)?;
        offsets
            .iter()
            .map(|offset| {
                self.device
                    .read_activity(region, *offset, false)
                    .map_err(AclError::from)
            })
            .collect()
    }

    fn read_activity(&mut self, region: RegionId, offset: u32, clear: bool) -> Result<bool> {
        let result = self.device.read_activity(region, offset, clear);
        let active = self.hw("read_activity", result)?;
        if clear && active {
            self.events.emit(AclEvent::ActivityCleared {
                region: region.as_raw(),
                offset,
            });
        }
        Ok(active)
    }

    /// Adds `delta` to the priority of every rule with priority in
    /// `[min, max]`.
    pub fn shift_priority(&mut self, region: RegionId, min: u32, max: u32, delta: i64) -> Result<()> {
        let updates = self.regions.get(region)?.rules().plan_shift(
            min,
            max,
            delta,
            &self.config.rule_priority,
        )?;
        if updates.is_empty() {
            return Ok(());
        }

        let result = self.device.set_rule_priorities(region, &updates);
        self.hw("set_rule_priorities", result)?;

        self.regions
            .get_mut(region)?
            .rules_mut()
            .apply_priorities(&updates);
        debug!(
            "{:?}: {} rule priorities shifted by {}",
            region,
            updates.len(),
            delta
        );
        Ok(())
    }

    pub fn rule_flow_counter(&self, region: RegionId, offset: u32) -> Result<Option<FlowCounterId>> {
        let rule = self
            .regions
            .get(region)?
            .rules()
            .get(offset)?
            .ok_or_else(|| AclError::not_found(format!("rule at {:?}@{}", region, offset)))?;
        Ok(rule.flow_counter())
    }

    // ============ ACLs ============

    pub fn create_acl(
        &mut self,
        acl_type: AclType,
        direction: Direction,
        bitmap: DirectionSet,
        regions: &[RegionId],
    ) -> Result<AclId> {
        let planned = self
            .acls
            .plan_create(direction, bitmap, regions, &self.regions)?;

        let result = self.device.program_acl(planned, regions);
        self.hw("program_acl", result)?;

        let id = self
            .acls
            .insert(acl_type, direction, bitmap, regions.to_vec())?;
        info!("{:?} created: {} over {} regions", id, direction, regions.len());
        Ok(id)
    }

    /// Replaces the region list and, for a multi-point ACL whose bitmap is
    /// still empty, sets the bitmap.
    pub fn edit_acl(&mut self, acl: AclId, regions: &[RegionId], bitmap: DirectionSet) -> Result<()> {
        let bitmap = self.acls.plan_edit(acl, regions, bitmap, &self.regions)?;

        let result = self.device.program_acl(acl, regions);
        self.hw("program_acl", result)?;

        self.acls.commit_edit(acl, regions.to_vec(), bitmap)?;
        debug!("{:?} edited: {} regions", acl, regions.len());
        Ok(())
    }

    pub fn destroy_acl(&mut self, acl: AclId) -> Result<()> {
        self.acls.get(acl)?;
        if let Some(group) = self.groups.holder_of(acl) {
            return Err(AclError::in_use(format!("{:?} is a member of {:?}", acl, group)));
        }
        if self.bindings.is_bound(BindTarget::Acl(acl)) {
            return Err(AclError::in_use(format!("{:?} is bound", acl)));
        }

        let result = self.device.remove_acl(acl);
        self.hw("remove_acl", result)?;

        self.acls.remove(acl)?;
        info!("{:?} destroyed", acl);
        self.deleted(ObjectKind::Acl, acl.as_raw());
        Ok(())
    }

    pub fn acl(&self, acl: AclId) -> Result<&Acl> {
        self.acls.get(acl)
    }

    pub fn acls(&self, query: Query<AclId>) -> Result<QueryResult<AclId>> {
        self.acls.query(query)
    }

    // ============ Groups ============

    pub fn create_group(&mut self, direction: Direction) -> Result<GroupId> {
        let planned = self.groups.plan_create(direction)?;

        let result = self.device.program_group(planned, &[], None);
        self.hw("program_group", result)?;

        let id = self.groups.insert(direction)?;
        info!("{:?} created: {}", id, direction);
        Ok(id)
    }

    fn program_members(&mut self, group: GroupId, acls: Vec<AclId>) -> Result<()> {
        let next = self.groups.get(group)?.next;
        let result = self.device.program_group(group, &acls, next);
        self.hw("program_group", result)?;
        debug!("{:?} now holds {} ACLs", group, acls.len());
        self.groups.commit_members(group, acls)
    }

    /// Replaces the member list of a group.
    pub fn set_group_acls(&mut self, group: GroupId, acls: &[AclId]) -> Result<()> {
        self.groups.plan_members(group, acls, &self.acls)?;
        self.program_members(group, acls.to_vec())
    }

    /// Appends an ACL. Adding a member again is a no-op.
    pub fn add_group_acl(&mut self, group: GroupId, acl: AclId) -> Result<()> {
        match self.groups.plan_add(group, acl, &self.acls)? {
            Some(acls) => self.program_members(group, acls),
            None => Ok(()),
        }
    }

    pub fn delete_group_acl(&mut self, group: GroupId, acl: AclId) -> Result<()> {
        let acls = self.groups.plan_delete(group, acl)?;
        self.program_members(group, acls)
    }

    /// Returns true if `group` is part of a bound chain.
    pub fn is_group_bound(&self, group: GroupId) -> bool {
        self.bindings.iter().any(|(_, entry)| match entry.target {
            BindTarget::Group(head) => self.groups.chain_from(head).contains(&group),
            BindTarget::Acl(_) => false,
        })
    }

    /// Links `child` after `parent` for parallel search.
    pub fn chain_groups(&mut self, parent: GroupId, child: GroupId) -> Result<()> {
        let bindings = &self.bindings;
        self.groups
            .plan_chain(parent, child, |g| bindings.is_bound(BindTarget::Group(g)))?;
        let acls = self.groups.get(parent)?.acls.clone();

        let result = self.device.program_group(parent, &acls, Some(child));
        self.hw("program_group", result)?;

        self.groups.set_next(parent, Some(child))?;
        info!("{:?} chained after {:?}", child, parent);
        Ok(())
    }

    pub fn unchain_group(&mut self, parent: GroupId) -> Result<()> {
        let group = self.groups.get(parent)?;
        let child = group
            .next
            .ok_or_else(|| AclError::not_found(format!("successor of {:?}", parent)))?;
        let acls = group.acls.clone();

        let result = self.device.program_group(parent, &acls, None);
        self.hw("program_group", result)?;

        self.groups.set_next(parent, None)?;
        info!("{:?} unchained from {:?}", child, parent);
        Ok(())
    }

    pub fn group_chain_next(&self, group: GroupId) -> Result<Option<GroupId>> {
        self.groups.chain_next(group)
    }

    /// Sets the priority used the next time the group is bound. Existing
    /// bindings keep the priority they were made with.
    pub fn set_group_priority(&mut self, group: GroupId, priority: u32) -> Result<()> {
        self.groups.set_priority(group, priority)?;
        debug!("{:?} priority set to {}", group, priority);
        Ok(())
    }

    pub fn destroy_group(&mut self, group: GroupId) -> Result<()> {
        self.groups.get(group)?;
        if self.is_group_bound(group) {
            return Err(AclError::in_use(format!("{:?} is bound", group)));
        }
        if let Some(parent) = self.groups.parent_of(group) {
            return Err(AclError::in_use(format!("{:?} follows {:?}", group, parent)));
        }

        let result = self.device.remove_group(group);
        self.hw("remove_group", result)?;

        self.groups.remove(group)?;
        info!("{:?} destroyed", group);
        self.deleted(ObjectKind::Group, group.as_raw());
        Ok(())
    }

    pub fn group(&self, group: GroupId) -> Result<&AclGroup> {
        self.groups.get(group)
    }

    pub fn groups(&self, query: Query<GroupId>) -> Result<QueryResult<GroupId>> {
        self.groups.query(query)
    }

    // ============ Bindings ============

    fn check_binding_point(&self, point: AttachPoint, direction: Direction) -> Result<BindingKey> {
        BindingTable::check_point(point, direction)?;
        if let AttachPoint::VlanGroup(id) = point {
            if !self.pools.vlan_groups.contains(id) {
                return Err(AclError::not_found(format!("{:?}", id)));
            }
        }
        Ok((point, direction))
    }

    /// Validates `target` for `direction` and returns its binding priority.
    fn check_target(&self, direction: Direction, target: BindTarget) -> Result<u32> {
        match target {
            BindTarget::Acl(id) => {
                let acl = self.acls.get(id)?;
                if acl.is_multi_point() && acl.bitmap.is_empty() {
                    return Err(AclError::invalid(format!(
                        "direction bitmap of {:?} was never set",
                        id
                    )));
                }
                if !acl.serves(direction) {
                    return Err(AclError::invalid(format!("{:?} does not serve {}", id, direction)));
                }
                Ok(self.groups.default_priority())
            }
            BindTarget::Group(id) => {
                let group = self.groups.get(id)?;
                if group.direction != direction {
                    return Err(AclError::invalid(format!(
                        "{:?} is a {} group",
                        id, group.direction
                    )));
                }
                if let Some(parent) = self.groups.parent_of(id) {
                    return Err(AclError::invalid(format!(
                        "{:?} follows {:?} and is not a chain head",
                        id, parent
                    )));
                }
                Ok(group.priority)
            }
        }
    }

    fn apply_binding(&mut self, key: BindingKey, list: Vec<BoundEntry>) -> Result<()> {
        let was_bound = self.bindings.get(&key).is_some();
        let now_bound = !list.is_empty();

        let result = self.device.program_binding(key.0, key.1, &raw_targets(&list));
        self.hw("program_binding", result)?;

        if let AttachPoint::VlanGroup(id) = key.0 {
            match (was_bound, now_bound) {
                (false, true) => {
                    self.pools.vlan_groups.pool.acquire(id)?;
                }
                (true, false) => {
                    self.pools.vlan_groups.pool.release(id)?;
                }
                _ => {}
            }
        }
        info!("{} {}: {} entries bound", key.0, key.1, list.len());
        self.bindings.commit(key, list);
        self.events.emit(AclEvent::BindingChanged {
            point: key.0,
            direction: key.1,
        });
        Ok(())
    }

    /// Binds `target` as the only entry, replacing any previous binding.
    pub fn bind(&mut self, point: AttachPoint, direction: Direction, target: BindTarget) -> Result<()> {
        let key = self.check_binding_point(point, direction)?;
        let priority = self.check_target(direction, target)?;
        self.apply_binding(key, vec![BoundEntry::new(target, priority)])?;
        self.stats.binds += 1;
        Ok(())
    }

    /// Removes every entry bound on `(point, direction)`.
    pub fn unbind(&mut self, point: AttachPoint, direction: Direction) -> Result<()> {
        let key = self.check_binding_point(point, direction)?;
        if self.bindings.get(&key).is_none() {
            return Err(AclError::not_found(format!("binding on {} {}", point, direction)));
        }
        self.apply_binding(key, Vec::new())?;
        self.stats.unbinds += 1;
        Ok(())
    }

    /// Adds a group chain in priority order. Adding a bound group is a no-op.
    pub fn bind_add(&mut self, point: AttachPoint, direction: Direction, group: GroupId) -> Result<()> {
        let key = self.check_binding_point(point, direction)?;
        let target = BindTarget::Group(group);
        let priority = self.check_target(direction, target)?;
        match self.bindings.plan_add(&key, BoundEntry::new(target, priority))? {
            Some(list) => {
                self.apply_binding(key, list)?;
                self.stats.binds += 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn bind_delete(
        &mut self,
        point: AttachPoint,
        direction: Direction,
        group: GroupId,
    ) -> Result<()> {
        let key = self.check_binding_point(point, direction)?;
        let list = self.bindings.plan_delete(&key, group)?;
        self.apply_binding(key, list)?;
        self.stats.unbinds += 1;
        Ok(())
    }

    /// Highest-priority entry bound on `(point, direction)`.
    pub fn binding_primary(&self, point: AttachPoint, direction: Direction) -> Result<BindTarget> {
        self.bindings.primary(&(point, direction))
    }

    /// Entries in evaluation order, capped at `cap`.
    pub fn binding_all(
        &self,
        point: AttachPoint,
        direction: Direction,
        cap: Option<usize>,
    ) -> Result<BindingList> {
        self.bindings.all(&(point, direction), cap)
    }

    pub fn binding_state(&self, point: AttachPoint, direction: Direction) -> BindingState {
        self.bindings.state(&(point, direction))
    }

    // ============ Pools ============

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    /// Creation and edits of pool entries. Deletion goes through
    /// [`AclCore::destroy_pool_entry`].
    pub fn pools_mut(&mut self) -> &mut Pools {
        &mut self.pools
    }

    /// Deletes an unreferenced pool entry.
    pub fn destroy_pool_entry(&mut self, entry: PoolEntry) -> Result<()> {
        let (kind, raw) = match entry {
            PoolEntry::Pbs(id) => {
                self.pools.pbs.destroy(id)?;
                (ObjectKind::Pbs, id.as_raw())
            }
            PoolEntry::Range(id) => {
                self.pools.ranges.destroy(id)?;
                (ObjectKind::Range, id.as_raw())
            }
            PoolEntry::CustomBytes(id) => {
                self.pools.custom_bytes.destroy(id)?;
                (ObjectKind::CustomBytes, id.as_raw())
            }
            PoolEntry::PortList(id) => {
                self.pools.port_lists.destroy(id)?;
                (ObjectKind::PortList, id.as_raw())
            }
            PoolEntry::VlanGroup(id) => {
                self.pools.vlan_groups.destroy(id)?;
                (ObjectKind::VlanGroup, id.as_raw())
            }
        };
        self.deleted(kind, raw);
        Ok(())
    }
}
