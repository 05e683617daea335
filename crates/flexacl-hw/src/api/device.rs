//! The device trait the ACL core programs through.
//!
//! Calls are synchronous and each one is all-or-nothing on the device side:
//! a failed call leaves the device as it was before the call.

use crate::error::HwResult;
use crate::types::{AclId, AttachPoint, Direction, GroupId, RawHandle, RegionId};

/// One match field of a rule image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HwKeyWord {
    /// Basic key code.
    pub field: u16,
    pub value: u128,
    pub mask: u128,
}

/// One action of a rule image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HwActionWord {
    pub opcode: u16,
    pub arg: u64,
}

/// A fully lowered rule ready to be written at `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HwRuleImage {
    pub offset: u32,
    pub priority: u32,
    pub keys: Vec<HwKeyWord>,
    pub actions: Vec<HwActionWord>,
}

/// Slot relocations of a block move, as `(from, to)` pairs.
///
/// The block `src..src + size` lands on `dst..dst + size`. Destination slots
/// outside the source fill the vacated source slots in offset order, so the
/// move is a permutation of `src..src + size` and `dst..dst + size` combined.
/// Both ranges must fit in `u32`.
pub fn block_relocations(src: u32, size: u32, dst: u32) -> Vec<(u32, u32)> {
    let source = src..src + size;
    let target = dst..dst + size;
    let vacated = source.clone().filter(|o| !target.contains(o));
    let displaced = target.clone().filter(|o| !source.contains(o));
    source
        .clone()
        .zip(target.clone())
        .chain(displaced.zip(vacated))
        .collect()
}

/// Programming interface of an ACL-capable forwarding device.
pub trait AclDevice: Send + Sync {
    /// Allocates a region of `hw_size` entries built from `key_blocks`.
    fn create_region(&self, region: RegionId, key_blocks: &[u16], hw_size: u32) -> HwResult<()>;

    /// Changes the hardware size of a region, keeping its rules in place.
    fn resize_region(&self, region: RegionId, hw_size: u32) -> HwResult<()>;

    fn destroy_region(&self, region: RegionId) -> HwResult<()>;

    /// Writes a batch of rules, overwriting whatever is at each offset.
    fn write_rules(&self, region: RegionId, rules: &[HwRuleImage]) -> HwResult<()>;

    fn clear_rules(&self, region: RegionId, offsets: &[u32]) -> HwResult<()>;

    /// Moves `size` slots from `src` to `dst`, activity bits included.
    ///
    /// Slots are relocated as given by [`block_relocations`]: rules previously
    /// at the destination take over the vacated source slots.
    fn move_rules(&self, region: RegionId, src: u32, size: u32, dst: u32) -> HwResult<()>;

    /// Rewrites rule priorities given as `(offset, priority)` pairs.
    fn set_rule_priorities(&self, region: RegionId, updates: &[(u32, u32)]) -> HwResult<()>;

    /// Reads the activity bit of one rule, optionally clearing it.
    fn read_activity(&self, region: RegionId, offset: u32, clear: bool) -> HwResult<bool>;

    /// Creates or updates an ACL as an ordered list of regions.
    fn program_acl(&self, acl: AclId, regions: &[RegionId]) -> HwResult<()>;

    fn remove_acl(&self, acl: AclId) -> HwResult<()>;

    /// Creates or updates a group with its member ACLs and chain successor.
    fn program_group(&self, group: GroupId, acls: &[AclId], next: Option<GroupId>)
        -> HwResult<()>;

    fn remove_group(&self, group: GroupId) -> HwResult<()>;

    /// Replaces the ordered target list of a binding. An empty list unbinds.
    fn program_binding(
        &self,
        point: AttachPoint,
        direction: Direction,
        targets: &[RawHandle],
    ) -> HwResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_disjoint_relocation_swaps_blocks() {
        assert_eq!(
            block_relocations(5, 3, 20),
            vec![(5, 20), (6, 21), (7, 22), (20, 5), (21, 6), (22, 7)]
        );
    }

    #[test]
    fn test_overlapping_relocation_rotates() {
        assert_eq!(
            block_relocations(0, 3, 1),
            vec![(0, 1), (1, 2), (2, 3), (3, 0)]
        );
        assert_eq!(block_relocations(4, 2, 4), vec![(4, 4), (5, 5)]);
    }
}
