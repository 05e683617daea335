//! Command-style operations.
//!
//! Each resource kind has a tagged operation type built from an
//! [`AccessCmd`] and a parameter set. Commands that mean nothing for the
//! resource are rejected with `Unsupported`; a missing required parameter is
//! `InvalidParam`. `AclCore::execute_*` dispatches the operation onto the
//! typed core methods.
//!
//! `GET`, `GET_FIRST` and `GETNEXT` are not tied to one resource: an
//! [`ObjectQuery`] names the object kind and carries raw handles.

use flexacl_common::{Query, QueryResult};
use flexacl_hw::{AclId, GroupId, Handle, HandleKind, KeyTypeId, PortId, RawHandle, RegionId};

use crate::acl_core::{AclCore, PoolEntry};
use crate::binding::BindTarget;
use crate::error::{AclError, Result};
use crate::key_block::KeyBlockId;
use crate::pools::{CustomByteSet, PbsDestination, RangeComparator};
use crate::rule::Rule;
use crate::types::{
    AccessCmd, AclType, AttachPoint, BasicKey, Direction, DirectionSet, ObjectKind,
};

/// Result of an executed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    /// Raw handle of the created object.
    Created(u64),
    /// New hardware size of a resized region.
    Resized(u32),
    /// Activity bits, one per requested offset.
    Activity(Vec<bool>),
    /// Raw handles selected by a query, with the live total.
    Listing { total: usize, items: Vec<u64> },
    Done,
}

fn unsupported(cmd: AccessCmd, resource: &str) -> AclError {
    AclError::Unsupported(format!("{} on {}", cmd, resource))
}

fn required<T>(value: Option<T>, name: &str, cmd: AccessCmd) -> Result<T> {
    value.ok_or_else(|| AclError::invalid(format!("{} requires {}", cmd, name)))
}

/// Exactly one ACL, for group ADD and DELETE.
fn single_acl(acls: &[AclId], cmd: AccessCmd) -> Result<AclId> {
    match acls {
        [acl] => Ok(*acl),
        _ => Err(AclError::invalid(format!(
            "{} takes exactly one ACL, {} given",
            cmd,
            acls.len()
        ))),
    }
}

// ============ Key Types ============

#[derive(Debug, Clone, Default)]
pub struct KeyTypeParams {
    pub id: Option<KeyTypeId>,
    pub fields: Vec<BasicKey>,
    pub hint: Option<KeyBlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyTypeOp {
    Create {
        fields: Vec<BasicKey>,
        hint: Option<KeyBlockId>,
    },
    Destroy {
        id: KeyTypeId,
    },
}

impl KeyTypeOp {
    pub fn cmd(&self) -> AccessCmd {
        match self {
            KeyTypeOp::Create { .. } => AccessCmd::Create,
            KeyTypeOp::Destroy { .. } => AccessCmd::Destroy,
        }
    }

    pub fn from_cmd(cmd: AccessCmd, params: KeyTypeParams) -> Result<Self> {
        match cmd {
            AccessCmd::Create => Ok(KeyTypeOp::Create {
                fields: params.fields,
                hint: params.hint,
            }),
            AccessCmd::Destroy => Ok(KeyTypeOp::Destroy {
                id: required(params.id, "a key type", cmd)?,
            }),
            _ => Err(unsupported(cmd, "key type")),
        }
    }
}

// ============ Regions ============

#[derive(Debug, Clone, Default)]
pub struct RegionParams {
    pub region: Option<RegionId>,
    pub key_type: Option<KeyTypeId>,
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOp {
    Create { key_type: KeyTypeId, capacity: u32 },
    /// `EDIT` of a region changes its capacity.
    Resize { region: RegionId, new_capacity: u32 },
    Destroy { region: RegionId },
}

impl RegionOp {
    pub fn cmd(&self) -> AccessCmd {
        match self {
            RegionOp::Create { .. } => AccessCmd::Create,
            RegionOp::Resize { .. } => AccessCmd::Edit,
            RegionOp::Destroy { .. } => AccessCmd::Destroy,
        }
    }

    pub fn from_cmd(cmd: AccessCmd, params: RegionParams) -> Result<Self> {
        match cmd {
            AccessCmd::Create => Ok(RegionOp::Create {
                key_type: required(params.key_type, "a key type", cmd)?,
                capacity: required(params.capacity, "a capacity", cmd)?,
            }),
            AccessCmd::Edit => Ok(RegionOp::Resize {
                region: required(params.region, "a region", cmd)?,
                new_capacity: required(params.capacity, "a capacity", cmd)?,
            }),
            AccessCmd::Destroy => Ok(RegionOp::Destroy {
                region: required(params.region, "a region", cmd)?,
            }),
            _ => Err(unsupported(cmd, "region")),
        }
    }
}

// ============ ACLs ============

#[derive(Debug, Clone, Default)]
pub struct AclParams {
    pub acl: Option<AclId>,
    pub acl_type: AclType,
    pub direction: Option<Direction>,
    pub bitmap: DirectionSet,
    pub regions: Vec<RegionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclOp {
    Create {
        acl_type: AclType,
        direction: Direction,
        bitmap: DirectionSet,
        regions: Vec<RegionId>,
    },
    Edit {
        acl: AclId,
        regions: Vec<RegionId>,
        bitmap: DirectionSet,
    },
    Destroy {
        acl: AclId,
    },
}

impl AclOp {
    pub fn cmd(&self) -> AccessCmd {
        match self {
            AclOp::Create { .. } => AccessCmd::Create,
            AclOp::Edit { .. } => AccessCmd::Edit,
            AclOp::Destroy { .. } => AccessCmd::Destroy,
        }
    }

    pub fn from_cmd(cmd: AccessCmd, params: AclParams) -> Result<Self> {
        match cmd {
            AccessCmd::Create => Ok(AclOp::Create {
                acl_type: params.acl_type,
                direction: required(params.direction, "a direction", cmd)?,
                bitmap: params.bitmap,
                regions: params.regions,
            }),
            AccessCmd::Edit => Ok(AclOp::Edit {
                acl: required(params.acl, "an ACL", cmd)?,
                regions: params.regions,
                bitmap: params.bitmap,
            }),
            AccessCmd::Destroy => Ok(AclOp::Destroy {
                acl: required(params.acl, "an ACL", cmd)?,
            }),
            _ => Err(unsupported(cmd, "ACL")),
        }
    }
}

// ============ Rules ============

/// A block of `size` rules moved from `src` to `dst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMove {
    pub src: u32,
    pub size: u32,
    pub dst: u32,
}

/// `delta` added to every priority in `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityShift {
    pub min: u32,
    pub max: u32,
    pub delta: i64,
}

#[derive(Debug, Clone, Default)]
pub struct RuleParams {
    pub region: Option<RegionId>,
    pub offsets: Vec<u32>,
    pub rules: Vec<Rule>,
    /// `EDIT` takes exactly one of `block` and `shift`.
    pub block: Option<BlockMove>,
    pub shift: Option<PriorityShift>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOp {
    Set {
        region: RegionId,
        offsets: Vec<u32>,
        rules: Vec<Rule>,
    },
    Delete {
        region: RegionId,
        offsets: Vec<u32>,
    },
    DeleteAll {
        region: RegionId,
    },
    Move {
        region: RegionId,
        block: BlockMove,
    },
    ShiftPriority {
        region: RegionId,
        shift: PriorityShift,
    },
}

impl RuleOp {
    pub fn cmd(&self) -> AccessCmd {
        match self {
            RuleOp::Set { .. } => AccessCmd::Set,
            RuleOp::Delete { .. } => AccessCmd::Delete,
            RuleOp::DeleteAll { .. } => AccessCmd::DeleteAll,
            RuleOp::Move { .. } | RuleOp::ShiftPriority { .. } => AccessCmd::Edit,
        }
    }

    pub fn from_cmd(cmd: AccessCmd, params: RuleParams) -> Result<Self> {
        let region = || required(params.region, "a region", cmd);
        match cmd {
            AccessCmd::Set => Ok(RuleOp::Set {
                region: region()?,
                offsets: params.offsets,
                rules: params.rules,
            }),
            AccessCmd::Delete => Ok(RuleOp::Delete {
                region: region()?,
                offsets: params.offsets,
            }),
            AccessCmd::DeleteAll => Ok(RuleOp::DeleteAll { region: region()? }),
            AccessCmd::Edit => match (params.block, params.shift) {
                (Some(block), None) => Ok(RuleOp::Move {
                    region: region()?,
                    block,
                }),
                (None, Some(shift)) => Ok(RuleOp::ShiftPriority {
                    region: region()?,
                    shift,
                }),
                _ => Err(AclError::invalid(
                    "rule EDIT takes either a block move or a priority shift",
                )),
            },
            _ => Err(unsupported(cmd, "rule")),
        }
    }
}

// ============ Groups ============

#[derive(Debug, Clone, Default)]
pub struct GroupParams {
    pub group: Option<GroupId>,
    pub direction: Option<Direction>,
    pub acls: Vec<AclId>,
    /// Successor for `BIND`.
    pub next: Option<GroupId>,
    /// New priority for `EDIT`.
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOp {
    Create { direction: Direction },
    Set { group: GroupId, acls: Vec<AclId> },
    Add { group: GroupId, acl: AclId },
    Delete { group: GroupId, acl: AclId },
    /// `BIND` of a group links `child` after it.
    Chain { parent: GroupId, child: GroupId },
    Unchain { parent: GroupId },
    SetPriority { group: GroupId, priority: u32 },
    Destroy { group: GroupId },
}

impl GroupOp {
    pub fn cmd(&self) -> AccessCmd {
        match self {
            GroupOp::Create { .. } => AccessCmd::Create,
            GroupOp::Set { .. } => AccessCmd::Set,
            GroupOp::Add { .. } => AccessCmd::Add,
            GroupOp::Delete { .. } => AccessCmd::Delete,
            GroupOp::Chain { .. } => AccessCmd::Bind,
            GroupOp::Unchain { .. } => AccessCmd::Unbind,
            GroupOp::SetPriority { .. } => AccessCmd::Edit,
            GroupOp::Destroy { .. } => AccessCmd::Destroy,
        }
    }

    pub fn from_cmd(cmd: AccessCmd, params: GroupParams) -> Result<Self> {
        let group = || required(params.group, "a group", cmd);
        match cmd {
            AccessCmd::Create => Ok(GroupOp::Create {
                direction: required(params.direction, "a direction", cmd)?,
            }),
            AccessCmd::Set => Ok(GroupOp::Set {
                group: group()?,
                acls: params.acls.clone(),
            }),
            AccessCmd::Add => Ok(GroupOp::Add {
                group: group()?,
                acl: single_acl(&params.acls, cmd)?,
            }),
            AccessCmd::Delete => Ok(GroupOp::Delete {
                group: group()?,
                acl: single_acl(&params.acls, cmd)?,
            }),
            AccessCmd::Bind => Ok(GroupOp::Chain {
                parent: group()?,
                child: required(params.next, "a successor group", cmd)?,
            }),
            AccessCmd::Unbind => Ok(GroupOp::Unchain { parent: group()? }),
            AccessCmd::Edit => Ok(GroupOp::SetPriority {
                group: group()?,
                priority: required(params.priority, "a priority", cmd)?,
            }),
            AccessCmd::Destroy => Ok(GroupOp::Destroy { group: group()? }),
            _ => Err(unsupported(cmd, "ACL group")),
        }
    }
}

// ============ Bindings ============

#[derive(Debug, Clone, Default)]
pub struct BindParams {
    pub point: Option<AttachPoint>,
    pub direction: Option<Direction>,
    pub target: Option<BindTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOp {
    Bind {
        point: AttachPoint,
        direction: Direction,
        target: BindTarget,
    },
    Unbind {
        point: AttachPoint,
        direction: Direction,
    },
    Add {
        point: AttachPoint,
        direction: Direction,
        group: GroupId,
    },
    Delete {
        point: AttachPoint,
        direction: Direction,
        group: GroupId,
    },
}

impl BindOp {
    pub fn cmd(&self) -> AccessCmd {
        match self {
            BindOp::Bind { .. } => AccessCmd::Bind,
            BindOp::Unbind { .. } => AccessCmd::Unbind,
            BindOp::Add { .. } => AccessCmd::Add,
            BindOp::Delete { .. } => AccessCmd::Delete,
        }
    }

    pub fn from_cmd(cmd: AccessCmd, params: BindParams) -> Result<Self> {
        if !matches!(
            cmd,
            AccessCmd::Bind | AccessCmd::Unbind | AccessCmd::Add | AccessCmd::Delete
        ) {
            return Err(unsupported(cmd, "binding"));
        }
        let point = required(params.point, "an attachment point", cmd)?;
        let direction = required(params.direction, "a direction", cmd)?;
        let group = || match required(params.target, "a target", cmd)? {
            BindTarget::Group(group) => Ok(group),
            BindTarget::Acl(acl) => Err(AclError::invalid(format!(
                "{} takes a group, {:?} given",
                cmd, acl
            ))),
        };
        Ok(match cmd {
            AccessCmd::Bind => BindOp::Bind {
                point,
                direction,
                target: required(params.target, "a target", cmd)?,
            },
            AccessCmd::Unbind => BindOp::Unbind { point, direction },
            AccessCmd::Add => BindOp::Add {
                point,
                direction,
                group: group()?,
            },
            _ => BindOp::Delete {
                point,
                direction,
                group: group()?,
            },
        })
    }
}

// ============ Pools ============

/// Contents of a pool entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolValue {
    Pbs(PbsDestination),
    Range(RangeComparator),
    CustomBytes(CustomByteSet),
    PortList(Vec<PortId>),
    VlanGroup(Vec<u16>),
}

#[derive(Debug, Clone, Default)]
pub struct PoolParams {
    pub entry: Option<PoolEntry>,
    pub value: Option<PoolValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolOp {
    Create { value: PoolValue },
    /// Replaces the contents of an entry. VLAN groups only take `ADD` and
    /// `DELETE`.
    Edit { entry: PoolEntry, value: PoolValue },
    /// Adds members to a port list or VLAN group.
    Add { entry: PoolEntry, value: PoolValue },
    /// Removes members from a port list or VLAN group.
    Delete { entry: PoolEntry, value: PoolValue },
    Destroy { entry: PoolEntry },
}

impl PoolOp {
    pub fn cmd(&self) -> AccessCmd {
        match self {
            PoolOp::Create { .. } => AccessCmd::Create,
            PoolOp::Edit { .. } => AccessCmd::Edit,
            PoolOp::Add { .. } => AccessCmd::Add,
            PoolOp::Delete { .. } => AccessCmd::Delete,
            PoolOp::Destroy { .. } => AccessCmd::Destroy,
        }
    }

    pub fn from_cmd(cmd: AccessCmd, params: PoolParams) -> Result<Self> {
        let entry = params.entry;
        let entry = || required(entry, "a pool entry", cmd);
        match cmd {
            AccessCmd::Create => Ok(PoolOp::Create {
                value: required(params.value, "a value", cmd)?,
            }),
            AccessCmd::Edit => Ok(PoolOp::Edit {
                entry: entry()?,
                value: required(params.value, "a value", cmd)?,
            }),
            AccessCmd::Add => Ok(PoolOp::Add {
                entry: entry()?,
                value: required(params.value, "members", cmd)?,
            }),
            AccessCmd::Delete => Ok(PoolOp::Delete {
                entry: entry()?,
                value: required(params.value, "members", cmd)?,
            }),
            AccessCmd::Destroy => Ok(PoolOp::Destroy { entry: entry()? }),
            _ => Err(unsupported(cmd, "pool entry")),
        }
    }
}

fn mismatched(entry: PoolEntry) -> AclError {
    AclError::invalid(format!("value does not fit {:?}", entry))
}

// ============ Activity ============

#[derive(Debug, Clone, Default)]
pub struct ActivityParams {
    pub region: Option<RegionId>,
    pub offsets: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityOp {
    Read { region: RegionId, offsets: Vec<u32> },
    /// Reads and clears the hit bits.
    ReadClear { region: RegionId, offsets: Vec<u32> },
}

impl ActivityOp {
    pub fn cmd(&self) -> AccessCmd {
        match self {
            ActivityOp::Read { .. } => AccessCmd::Read,
            ActivityOp::ReadClear { .. } => AccessCmd::ReadClear,
        }
    }

    pub fn from_cmd(cmd: AccessCmd, params: ActivityParams) -> Result<Self> {
        let region = required(params.region, "a region", cmd);
        match cmd {
            AccessCmd::Read => Ok(ActivityOp::Read {
                region: region?,
                offsets: params.offsets,
            }),
            AccessCmd::ReadClear => Ok(ActivityOp::ReadClear {
                region: region?,
                offsets: params.offsets,
            }),
            _ => Err(unsupported(cmd, "rule activity")),
        }
    }
}

// ============ Queries ============

#[derive(Debug, Clone, Copy)]
pub struct QueryParams {
    pub kind: ObjectKind,
    /// Raw handle for `GET` and `GETNEXT`. `GET` without a key counts.
    pub key: Option<RawHandle>,
    /// Page size for `GET_FIRST` and `GETNEXT`.
    pub count: Option<usize>,
}

impl QueryParams {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            key: None,
            count: None,
        }
    }
}

/// Iteration over one kind of object by raw handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectQuery {
    pub kind: ObjectKind,
    pub query: Query<RawHandle>,
}

impl ObjectQuery {
    pub fn cmd(&self) -> AccessCmd {
        match self.query {
            Query::Count | Query::Get(_) => AccessCmd::Get,
            Query::GetFirst(_) => AccessCmd::GetFirst,
            Query::GetNext(..) => AccessCmd::GetNext,
        }
    }

    pub fn from_cmd(cmd: AccessCmd, params: QueryParams) -> Result<Self> {
        let count = || required(params.count, "a count", cmd);
        let query = match cmd {
            AccessCmd::Get => params.key.map_or(Query::Count, Query::Get),
            AccessCmd::GetFirst => Query::GetFirst(count()?),
            AccessCmd::GetNext => {
                Query::GetNext(required(params.key, "a reference key", cmd)?, count()?)
            }
            _ => return Err(unsupported(cmd, "object query")),
        };
        Ok(ObjectQuery {
            kind: params.kind,
            query,
        })
    }
}

fn typed<K: HandleKind>(query: Query<RawHandle>) -> Result<Query<Handle<K>>> {
    let decode = |raw: RawHandle| {
        Handle::<K>::from_raw(raw)
            .ok_or_else(|| AclError::invalid(format!("{:#x} is not a handle", raw)))
    };
    Ok(match query {
        Query::Count => Query::Count,
        Query::Get(raw) => Query::Get(decode(raw)?),
        Query::GetFirst(n) => Query::GetFirst(n),
        Query::GetNext(raw, n) => Query::GetNext(decode(raw)?, n),
    })
}

fn listing<K: HandleKind>(result: QueryResult<Handle<K>>) -> OpOutcome {
    OpOutcome::Listing {
        total: result.total,
        items: result.items.iter().map(|h| h.as_raw()).collect(),
    }
}

// ============ Dispatch ============

impl AclCore {
    pub fn execute_key_type(&mut self, op: KeyTypeOp) -> Result<OpOutcome> {
        match op {
            KeyTypeOp::Create { fields, hint } => {
                let id = self.create_key_type(&fields, hint)?;
                Ok(OpOutcome::Created(id.as_raw()))
            }
            KeyTypeOp::Destroy { id } => self.destroy_key_type(id).map(|_| OpOutcome::Done),
        }
    }

    pub fn execute_region(&mut self, op: RegionOp) -> Result<OpOutcome> {
        match op {
            RegionOp::Create { key_type, capacity } => {
                let id = self.create_region(key_type, capacity)?;
                Ok(OpOutcome::Created(id.as_raw()))
            }
            RegionOp::Resize {
                region,
                new_capacity,
            } => self.resize_region(region, new_capacity).map(OpOutcome::Resized),
            RegionOp::Destroy { region } => self.destroy_region(region).map(|_| OpOutcome::Done),
        }
    }

    pub fn execute_acl(&mut self, op: AclOp) -> Result<OpOutcome> {
        match op {
            AclOp::Create {
                acl_type,
                direction,
                bitmap,
                regions,
            } => {
                let id = self.create_acl(acl_type, direction, bitmap, &regions)?;
                Ok(OpOutcome::Created(id.as_raw()))
            }
            AclOp::Edit {
                acl,
                regions,
                bitmap,
            } => self.edit_acl(acl, &regions, bitmap).map(|_| OpOutcome::Done),
            AclOp::Destroy { acl } => self.destroy_acl(acl).map(|_| OpOutcome::Done),
        }
    }

    pub fn execute_rule(&mut self, op: RuleOp) -> Result<OpOutcome> {
        match op {
            RuleOp::Set {
                region,
                offsets,
                rules,
            } => self.set_rules(region, &offsets, &rules),
            RuleOp::Delete { region, offsets } => self.delete_rules(region, &offsets),
            RuleOp::DeleteAll { region } => self.delete_all_rules(region),
            RuleOp::Move { region, block } => {
                self.move_block(region, block.src, block.size, block.dst)
            }
            RuleOp::ShiftPriority { region, shift } => {
                self.shift_priority(region, shift.min, shift.max, shift.delta)
            }
        }
        .map(|_| OpOutcome::Done)
    }

    pub fn execute_group(&mut self, op: GroupOp) -> Result<OpOutcome> {
        match op {
            GroupOp::Create { direction } => {
                let id = self.create_group(direction)?;
                return Ok(OpOutcome::Created(id.as_raw()));
            }
            GroupOp::Set { group, acls } => self.set_group_acls(group, &acls),
            GroupOp::Add { group, acl } => self.add_group_acl(group, acl),
            GroupOp::Delete { group, acl } => self.delete_group_acl(group, acl),
            GroupOp::Chain { parent, child } => self.chain_groups(parent, child),
            GroupOp::Unchain { parent } => self.unchain_group(parent),
            GroupOp::SetPriority { group, priority } => self.set_group_priority(group, priority),
            GroupOp::Destroy { group } => self.destroy_group(group),
        }
        .map(|_| OpOutcome::Done)
    }

    pub fn execute_bind(&mut self, op: BindOp) -> Result<OpOutcome> {
        match op {
            BindOp::Bind {
                point,
                direction,
                target,
            } => self.bind(point, direction, target),
            BindOp::Unbind { point, direction } => self.unbind(point, direction),
            BindOp::Add {
                point,
                direction,
                group,
            } => self.bind_add(point, direction, group),
            BindOp::Delete {
                point,
                direction,
                group,
            } => self.bind_delete(point, direction, group),
        }
        .map(|_| OpOutcome::Done)
    }

    pub fn execute_pool(&mut self, op: PoolOp) -> Result<OpOutcome> {
        let pools = self.pools_mut();
        match op {
            PoolOp::Create { value } => {
                let raw = match value {
                    PoolValue::Pbs(destination) => pools.pbs.create(destination)?.as_raw(),
                    PoolValue::Range(range) => pools.ranges.create(range)?.as_raw(),
                    PoolValue::CustomBytes(set) => pools.custom_bytes.create(set)?.as_raw(),
                    PoolValue::PortList(ports) => pools.port_lists.create(&ports)?.as_raw(),
                    PoolValue::VlanGroup(vlans) => pools.vlan_groups.create(&vlans)?.as_raw(),
                };
                return Ok(OpOutcome::Created(raw));
            }
            PoolOp::Edit { entry, value } => match (entry, value) {
                (PoolEntry::Pbs(id), PoolValue::Pbs(destination)) => {
                    pools.pbs.edit(id, destination)
                }
                (PoolEntry::Range(id), PoolValue::Range(range)) => pools.ranges.edit(id, range),
                (PoolEntry::CustomBytes(id), PoolValue::CustomBytes(set)) => {
                    pools.custom_bytes.edit(id, set)
                }
                (PoolEntry::PortList(id), PoolValue::PortList(ports)) => {
                    pools.port_lists.set(id, &ports)
                }
                (PoolEntry::VlanGroup(_), _) => Err(unsupported(AccessCmd::Edit, "VLAN group")),
                (entry, _) => Err(mismatched(entry)),
            },
            PoolOp::Add { entry, value } => match (entry, value) {
                (PoolEntry::PortList(id), PoolValue::PortList(ports)) => {
                    pools.port_lists.add(id, &ports)
                }
                (PoolEntry::VlanGroup(id), PoolValue::VlanGroup(vlans)) => {
                    pools.vlan_groups.add_vlans(id, &vlans)
                }
                (entry, _) => Err(mismatched(entry)),
            },
            PoolOp::Delete { entry, value } => match (entry, value) {
                (PoolEntry::PortList(id), PoolValue::PortList(ports)) => {
                    pools.port_lists.delete(id, &ports)
                }
                (PoolEntry::VlanGroup(id), PoolValue::VlanGroup(vlans)) => {
                    pools.vlan_groups.delete_vlans(id, &vlans)
                }
                (entry, _) => Err(mismatched(entry)),
            },
            PoolOp::Destroy { entry } => self.destroy_pool_entry(entry),
        }
        .map(|_| OpOutcome::Done)
    }

    pub fn execute_activity(&mut self, op: ActivityOp) -> Result<OpOutcome> {
        let bits = match op {
            ActivityOp::Read { region, offsets } => self.activity_bulk(region, &offsets, false)?,
            ActivityOp::ReadClear { region, offsets } => {
                self.activity_bulk(region, &offsets, true)?
            }
        };
        Ok(OpOutcome::Activity(bits))
    }

    pub fn execute_query(&self, op: ObjectQuery) -> Result<OpOutcome> {
        let query = op.query;
        let pools = self.pools();
        Ok(match op.kind {
            ObjectKind::KeyType => listing(self.key_types(typed(query)?)?),
            ObjectKind::Region => listing(self.regions(typed(query)?)?),
            ObjectKind::Acl => listing(self.acls(typed(query)?)?),
            ObjectKind::Group => listing(self.groups(typed(query)?)?),
            ObjectKind::Pbs => listing(pools.pbs.query(typed(query)?)?),
            ObjectKind::Range => listing(pools.ranges.query(typed(query)?)?),
            ObjectKind::CustomBytes => listing(pools.custom_bytes.query(typed(query)?)?),
            ObjectKind::PortList => listing(pools.port_lists.query(typed(query)?)?),
            ObjectKind::VlanGroup => listing(pools.vlan_groups.query(typed(query)?)?),
        })
    }
}
