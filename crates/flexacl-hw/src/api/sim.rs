//! In-memory ACL device.
//!
//! `SimDevice` keeps the programmed state in a mutex-guarded model so tests
//! can inspect what was written, record packet hits and inject failures.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use parking_lot::Mutex;

use super::device::{block_relocations, AclDevice, HwRuleImage};
use crate::error::{HwError, HwResult, HwStatus};
use crate::types::{AclId, AttachPoint, Direction, GroupId, RawHandle, RegionId};

/// Device operations that can be targeted by fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    CreateRegion,
    ResizeRegion,
    DestroyRegion,
    WriteRules,
    ClearRules,
    MoveRules,
    SetRulePriorities,
    ReadActivity,
    ProgramAcl,
    RemoveAcl,
    ProgramGroup,
    RemoveGroup,
    ProgramBinding,
}

impl SimOp {
    fn name(&self) -> &'static str {
        match self {
            SimOp::CreateRegion => "create_region",
            SimOp::ResizeRegion => "resize_region",
            SimOp::DestroyRegion => "destroy_region",
            SimOp::WriteRules => "write_rules",
            SimOp::ClearRules => "clear_rules",
            SimOp::MoveRules => "move_rules",
            SimOp::SetRulePriorities => "set_rule_priorities",
            SimOp::ReadActivity => "read_activity",
            SimOp::ProgramAcl => "program_acl",
            SimOp::RemoveAcl => "remove_acl",
            SimOp::ProgramGroup => "program_group",
            SimOp::RemoveGroup => "remove_group",
            SimOp::ProgramBinding => "program_binding",
        }
    }
}

#[derive(Debug, Default)]
struct SimRegion {
    key_blocks: Vec<u16>,
    hw_size: u32,
    rules: BTreeMap<u32, HwRuleImage>,
    hits: BTreeSet<u32>,
}

#[derive(Debug, Default)]
struct SimState {
    regions: HashMap<RegionId, SimRegion>,
    acls: HashMap<AclId, Vec<RegionId>>,
    groups: HashMap<GroupId, (Vec<AclId>, Option<GroupId>)>,
    bindings: HashMap<(AttachPoint, Direction), Vec<RawHandle>>,
    faults: HashMap<SimOp, HwStatus>,
    calls: u64,
}

impl SimState {
    fn enter(&mut self, op: SimOp) -> HwResult<()> {
        self.calls += 1;
        match self.faults.remove(&op) {
            Some(status) => {
                debug!("sim: injected {} on {}", status, op.name());
                Err(HwError::Status {
                    operation: op.name(),
                    status,
                })
            }
            None => Ok(()),
        }
    }

    fn region_mut(&mut self, region: RegionId) -> HwResult<&mut SimRegion> {
        self.regions
            .get_mut(&region)
            .ok_or(HwError::UnknownObject {
                raw: region.as_raw(),
            })
    }
}

/// In-memory implementation of [`AclDevice`].
#[derive(Debug, Default)]
pub struct SimDevice {
    state: Mutex<SimState>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `op` fail with `status`.
    pub fn fail_next(&self, op: SimOp, status: HwStatus) {
        self.state.lock().faults.insert(op, status);
    }

    /// Marks the rule at `offset` as hit by a packet.
    ///
    /// Returns false if no rule is programmed there.
    pub fn record_hit(&self, region: RegionId, offset: u32) -> bool {
        let mut state = self.state.lock();
        match state.regions.get_mut(&region) {
            Some(r) if r.rules.contains_key(&offset) => {
                r.hits.insert(offset);
                true
            }
            _ => false,
        }
    }

    /// Total number of device calls made so far, failed ones included.
    pub fn call_count(&self) -> u64 {
        self.state.lock().calls
    }

    pub fn region_hw_size(&self, region: RegionId) -> Option<u32> {
        self.state.lock().regions.get(&region).map(|r| r.hw_size)
    }

    pub fn region_key_blocks(&self, region: RegionId) -> Option<Vec<u16>> {
        self.state
            .lock()
            .regions
            .get(&region)
            .map(|r| r.key_blocks.clone())
    }

    pub fn rule_at(&self, region: RegionId, offset: u32) -> Option<HwRuleImage> {
        self.state
            .lock()
            .regions
            .get(&region)
            .and_then(|r| r.rules.get(&offset).cloned())
    }

    pub fn rule_count(&self, region: RegionId) -> usize {
        self.state
            .lock()
            .regions
            .get(&region)
            .map_or(0, |r| r.rules.len())
    }

    pub fn acl_regions(&self, acl: AclId) -> Option<Vec<RegionId>> {
        self.state.lock().acls.get(&acl).cloned()
    }

    pub fn group_members(&self, group: GroupId) -> Option<(Vec<AclId>, Option<GroupId>)> {
        self.state.lock().groups.get(&group).cloned()
    }

    /// Returns the programmed targets of a binding, empty if unbound.
    pub fn binding(&self, point: AttachPoint, direction: Direction) -> Vec<RawHandle> {
        self.state
            .lock()
            .bindings
            .get(&(point, direction))
            .cloned()
            .unwrap_or_default()
    }
}

fn check_offset(region: &SimRegion, offset: u32) -> HwResult<()> {
    if offset >= region.hw_size {
        return Err(HwError::OutOfBounds {
            offset,
            hw_size: region.hw_size,
        });
    }
    Ok(())
}

impl AclDevice for SimDevice {
    fn create_region(&self, region: RegionId, key_blocks: &[u16], hw_size: u32) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::CreateRegion)?;
        if state.regions.contains_key(&region) {
            return Err(HwError::Status {
                operation: SimOp::CreateRegion.name(),
                status: HwStatus::ItemAlreadyExists,
            });
        }
        state.regions.insert(
            region,
            SimRegion {
                key_blocks: key_blocks.to_vec(),
                hw_size,
                ..Default::default()
            },
        );
        Ok(())
    }

    fn resize_region(&self, region: RegionId, hw_size: u32) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::ResizeRegion)?;
        let r = state.region_mut(region)?;
        if let Some((&highest, _)) = r.rules.last_key_value() {
            if highest >= hw_size {
                return Err(HwError::OutOfBounds {
                    offset: highest,
                    hw_size,
                });
            }
        }
        r.hw_size = hw_size;
        Ok(())
    }

    fn destroy_region(&self, region: RegionId) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::DestroyRegion)?;
        state
            .regions
            .remove(&region)
            .map(|_| ())
            .ok_or(HwError::UnknownObject {
                raw: region.as_raw(),
            })
    }

    fn write_rules(&self, region: RegionId, rules: &[HwRuleImage]) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::WriteRules)?;
        let r = state.region_mut(region)?;
        for image in rules {
            check_offset(r, image.offset)?;
        }
        for image in rules {
            r.hits.remove(&image.offset);
            r.rules.insert(image.offset, image.clone());
        }
        Ok(())
    }

    fn clear_rules(&self, region: RegionId, offsets: &[u32]) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::ClearRules)?;
        let r = state.region_mut(region)?;
        for offset in offsets {
            r.rules.remove(offset);
            r.hits.remove(offset);
        }
        Ok(())
    }

    fn move_rules(&self, region: RegionId, src: u32, size: u32, dst: u32) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::MoveRules)?;
        let r = state.region_mut(region)?;
        let end = |start: u32| start.checked_add(size).filter(|e| *e <= r.hw_size);
        if end(src).is_none() || end(dst).is_none() {
            return Err(HwError::OutOfBounds {
                offset: src.max(dst).saturating_add(size),
                hw_size: r.hw_size,
            });
        }

        let mut moved = Vec::new();
        for (from, to) in block_relocations(src, size, dst) {
            if let Some(mut image) = r.rules.remove(&from) {
                let hit = r.hits.remove(&from);
                image.offset = to;
                moved.push((image, hit));
            }
        }
        for (image, hit) in moved {
            if hit {
                r.hits.insert(image.offset);
            }
            r.rules.insert(image.offset, image);
        }
        Ok(())
    }

    fn set_rule_priorities(&self, region: RegionId, updates: &[(u32, u32)]) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::SetRulePriorities)?;
        let r = state.region_mut(region)?;
        for (offset, _) in updates {
            if !r.rules.contains_key(offset) {
                return Err(HwError::Status {
                    operation: SimOp::SetRulePriorities.name(),
                    status: HwStatus::ItemNotFound,
                });
            }
        }
        for (offset, priority) in updates {
            if let Some(image) = r.rules.get_mut(offset) {
                image.priority = *priority;
            }
        }
        Ok(())
    }

    fn read_activity(&self, region: RegionId, offset: u32, clear: bool) -> HwResult<bool> {
        let mut state = self.state.lock();
        state.enter(SimOp::ReadActivity)?;
        let r = state.region_mut(region)?;
        check_offset(r, offset)?;
        let hit = if clear {
            r.hits.remove(&offset)
        } else {
            r.hits.contains(&offset)
        };
        Ok(hit)
    }

    fn program_acl(&self, acl: AclId, regions: &[RegionId]) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::ProgramAcl)?;
        if let Some(missing) = regions.iter().find(|r| !state.regions.contains_key(r)) {
            return Err(HwError::UnknownObject {
                raw: missing.as_raw(),
            });
        }
        state.acls.insert(acl, regions.to_vec());
        Ok(())
    }

    fn remove_acl(&self, acl: AclId) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::RemoveAcl)?;
        state
            .acls
            .remove(&acl)
            .map(|_| ())
            .ok_or(HwError::UnknownObject { raw: acl.as_raw() })
    }

    fn program_group(
        &self,
        group: GroupId,
        acls: &[AclId],
        next: Option<GroupId>,
    ) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::ProgramGroup)?;
        state.groups.insert(group, (acls.to_vec(), next));
        Ok(())
    }

    fn remove_group(&self, group: GroupId) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::RemoveGroup)?;
        state
            .groups
            .remove(&group)
            .map(|_| ())
            .ok_or(HwError::UnknownObject {
                raw: group.as_raw(),
            })
    }

    fn program_binding(
        &self,
        point: AttachPoint,
        direction: Direction,
        targets: &[RawHandle],
    ) -> HwResult<()> {
        let mut state = self.state.lock();
        state.enter(SimOp::ProgramBinding)?;
        if targets.is_empty() {
            state.bindings.remove(&(point, direction));
        } else {
            state.bindings.insert((point, direction), targets.to_vec());
        }
        Ok(())
    }
}
