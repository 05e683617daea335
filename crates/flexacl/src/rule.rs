//! ACL rule types and the per-region rule table.
//!
//! A rule consists of:
//! - Key descriptors (what packets to match), each on a basic key of the
//!   region's key type
//! - Actions (what to do with matched packets), at most one per action class
//! - Priority (which rule wins on multiple matches)

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use flexacl_hw::{
    block_relocations, CustomBytesId, FlowCounterId, HwActionWord, HwKeyWord, HwRuleImage, PbsId,
    PortId, PortListId, RangeId,
};

use crate::config::PriorityRange;
use crate::error::{AclError, Result};
use crate::pools::PoolRefs;
use crate::types::BasicKey;

/// Match value of a key descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyMatch {
    /// IPv4 prefix.
    Ipv4 { addr: Ipv4Addr, prefix_len: u8 },
    /// IPv6 prefix.
    Ipv6 { addr: Ipv6Addr, prefix_len: u8 },
    /// MAC address with mask.
    Mac { addr: [u8; 6], mask: [u8; 6] },
    /// Ternary value for scalar fields (ports, protocol, DSCP, ...).
    Value { value: u64, mask: u64 },
    /// Range comparator.
    Range(RangeId),
    /// Port-list container.
    PortList(PortListId),
    /// Value extracted by a custom-byte set.
    CustomBytes {
        set: CustomBytesId,
        value: u32,
        mask: u32,
    },
}

impl KeyMatch {
    /// Exact match on a scalar value.
    pub fn exact(value: u64) -> Self {
        KeyMatch::Value {
            value,
            mask: u64::MAX,
        }
    }

    pub fn ipv4(addr: Ipv4Addr, prefix_len: u8) -> Self {
        KeyMatch::Ipv4 { addr, prefix_len }
    }

    fn describe(&self) -> &'static str {
        match self {
            KeyMatch::Ipv4 { .. } => "IPv4 prefix",
            KeyMatch::Ipv6 { .. } => "IPv6 prefix",
            KeyMatch::Mac { .. } => "MAC",
            KeyMatch::Value { .. } => "value",
            KeyMatch::Range(_) => "range",
            KeyMatch::PortList(_) => "port list",
            KeyMatch::CustomBytes { .. } => "custom bytes",
        }
    }

    fn fits(&self, key: BasicKey) -> bool {
        use BasicKey::*;
        match self {
            KeyMatch::Ipv4 { prefix_len, .. } => {
                matches!(key, SrcIp | DstIp) && *prefix_len <= 32
            }
            KeyMatch::Ipv6 { prefix_len, .. } => {
                matches!(key, SrcIpv6 | DstIpv6) && *prefix_len <= 128
            }
            KeyMatch::Mac { .. } => matches!(key, Smac | Dmac),
            KeyMatch::Range(_) => key == L4PortRange,
            KeyMatch::PortList(_) => matches!(key, RxList | TxList),
            KeyMatch::CustomBytes { .. } => matches!(key, CustomBytes0 | CustomBytes1),
            KeyMatch::Value { value, .. } => {
                let scalar = !matches!(
                    key,
                    SrcIp | DstIp | SrcIpv6 | DstIpv6 | Smac | Dmac | L4PortRange | RxList
                        | TxList | CustomBytes0 | CustomBytes1
                );
                let width = key.width_bits();
                scalar && (width >= 64 || *value >> width == 0)
            }
        }
    }
}

fn prefix_mask(prefix_len: u8, width: u32) -> u128 {
    let len = u32::from(prefix_len).min(width);
    if len == 0 {
        return 0;
    }
    let ones = if width == 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    };
    ones & !((1u128 << (width - len)).wrapping_sub(1) & ones)
}

fn mac_to_u128(bytes: &[u8; 6]) -> u128 {
    bytes.iter().fold(0u128, |acc, b| (acc << 8) | u128::from(*b))
}

/// One match condition of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyDescriptor {
    pub key: BasicKey,
    pub matcher: KeyMatch,
}

impl KeyDescriptor {
    pub fn new(key: BasicKey, matcher: KeyMatch) -> Self {
        Self { key, matcher }
    }

    fn to_word(self) -> HwKeyWord {
        let (value, mask) = match self.matcher {
            KeyMatch::Ipv4 { addr, prefix_len } => {
                (u128::from(u32::from(addr)), prefix_mask(prefix_len, 32))
            }
            KeyMatch::Ipv6 { addr, prefix_len } => {
                (u128::from(addr), prefix_mask(prefix_len, 128))
            }
            KeyMatch::Mac { addr, mask } => (mac_to_u128(&addr), mac_to_u128(&mask)),
            KeyMatch::Value { value, mask } => (u128::from(value), u128::from(mask)),
            KeyMatch::Range(id) => (u128::from(id.as_raw()), u128::from(u64::MAX)),
            KeyMatch::PortList(id) => (u128::from(id.as_raw()), u128::from(u64::MAX)),
            KeyMatch::CustomBytes { set, value, mask } => (
                (u128::from(set.as_raw()) << 32) | u128::from(value),
                (u128::from(u64::MAX) << 32) | u128::from(mask),
            ),
        };
        HwKeyWord {
            field: self.key.code(),
            value: value & mask,
            mask,
        }
    }
}

impl fmt::Display for KeyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.matcher {
            KeyMatch::Ipv4 { addr, prefix_len } => write!(f, "{}={}/{}", self.key, addr, prefix_len),
            KeyMatch::Ipv6 { addr, prefix_len } => write!(f, "{}={}/{}", self.key, addr, prefix_len),
            KeyMatch::Value { value, mask } => write!(f, "{}=0x{:x}/0x{:x}", self.key, value, mask),
            ref other => write!(f, "{}=<{}>", self.key, other.describe()),
        }
    }
}

/// Where a forward action sends the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardTarget {
    NextHop(u32),
    Port(PortId),
    Discard,
}

/// Rule action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Forward(ForwardTarget),
    /// Policy-based switching through a PBS entry.
    Pbs(PbsId),
    Mirror { session: u32 },
    MirrorSampled { session: u32, rate: u32 },
    /// Trap to the CPU, dropping the packet.
    Trap { trap_id: u16 },
    /// Copy to the CPU and keep forwarding.
    TrapForward { trap_id: u16 },
    Counter(FlowCounterId),
    SetDscp(u8),
    SetPcp(u8),
    SetVlan(u16),
    Policer(u32),
}

/// Actions of the same class are mutually exclusive within a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    Forward,
    Mirror,
    Trap,
    Counter,
    SetDscp,
    SetPcp,
    SetVlan,
    Policer,
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Forward => "FORWARD",
            Self::Mirror => "MIRROR",
            Self::Trap => "TRAP",
            Self::Counter => "COUNTER",
            Self::SetDscp => "SET_DSCP",
            Self::SetPcp => "SET_PCP",
            Self::SetVlan => "SET_VLAN",
            Self::Policer => "POLICER",
        };
        write!(f, "{}", s)
    }
}

impl Action {
    pub fn forward_next_hop(next_hop: u32) -> Self {
        Action::Forward(ForwardTarget::NextHop(next_hop))
    }

    pub fn class(&self) -> ActionClass {
        match self {
            Action::Forward(_) | Action::Pbs(_) => ActionClass::Forward,
            Action::Mirror { .. } | Action::MirrorSampled { .. } => ActionClass::Mirror,
            Action::Trap { .. } | Action::TrapForward { .. } => ActionClass::Trap,
            Action::Counter(_) => ActionClass::Counter,
            Action::SetDscp(_) => ActionClass::SetDscp,
            Action::SetPcp(_) => ActionClass::SetPcp,
            Action::SetVlan(_) => ActionClass::SetVlan,
            Action::Policer(_) => ActionClass::Policer,
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            Action::SetDscp(dscp) if dscp > 63 => {
                Err(AclError::invalid(format!("DSCP {} exceeds 63", dscp)))
            }
            Action::SetPcp(pcp) if pcp > 7 => {
                Err(AclError::invalid(format!("PCP {} exceeds 7", pcp)))
            }
            Action::SetVlan(vlan) if !(1..=4094).contains(&vlan) => {
                Err(AclError::invalid(format!("VLAN {} not in 1..=4094", vlan)))
            }
            Action::MirrorSampled { rate: 0, .. } => {
                Err(AclError::invalid("mirror sample rate must be > 0"))
            }
            _ => Ok(()),
        }
    }

    fn to_word(self) -> HwActionWord {
        let (opcode, arg) = match self {
            Action::Forward(ForwardTarget::NextHop(nh)) => (0x10, u64::from(nh)),
            Action::Forward(ForwardTarget::Port(port)) => (0x11, u64::from(port.0)),
            Action::Forward(ForwardTarget::Discard) => (0x12, 0),
            Action::Pbs(id) => (0x13, id.as_raw()),
            Action::Mirror { session } => (0x20, u64::from(session)),
            Action::MirrorSampled { session, rate } => {
                (0x21, (u64::from(session) << 32) | u64::from(rate))
            }
            Action::Trap { trap_id } => (0x30, u64::from(trap_id)),
            Action::TrapForward { trap_id } => (0x31, u64::from(trap_id)),
            Action::Counter(counter) => (0x40, u64::from(counter.0)),
            Action::SetDscp(dscp) => (0x50, u64::from(dscp)),
            Action::SetPcp(pcp) => (0x51, u64::from(pcp)),
            Action::SetVlan(vlan) => (0x52, u64::from(vlan)),
            Action::Policer(policer) => (0x60, u64::from(policer)),
        };
        HwActionWord { opcode, arg }
    }
}

/// An ACL rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub priority: u32,
    pub keys: Vec<KeyDescriptor>,
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn new(priority: u32) -> Self {
        Self {
            priority,
            keys: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: BasicKey, matcher: KeyMatch) -> Self {
        self.keys.push(KeyDescriptor::new(key, matcher));
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Checks the rule against the key type fields and priority bounds.
    pub fn validate(&self, fields: &BTreeSet<BasicKey>, priorities: &PriorityRange) -> Result<()> {
        if !priorities.contains(self.priority) {
            return Err(AclError::invalid(format!(
                "rule priority {} not in {}..={}",
                self.priority, priorities.min, priorities.max
            )));
        }

        let mut seen = HashSet::new();
        for desc in &self.keys {
            if !fields.contains(&desc.key) {
                return Err(AclError::invalid(format!(
                    "basic key {} is not part of the key type",
                    desc.key
                )));
            }
            if !seen.insert(desc.key) {
                return Err(AclError::invalid(format!("basic key {} given twice", desc.key)));
            }
            if !desc.matcher.fits(desc.key) {
                return Err(AclError::invalid(format!(
                    "{} match cannot be used on {}",
                    desc.matcher.describe(),
                    desc.key
                )));
            }
        }

        let mut classes = HashSet::new();
        for action in &self.actions {
            action.validate()?;
            if !classes.insert(action.class()) {
                return Err(AclError::invalid(format!(
                    "more than one {} action",
                    action.class()
                )));
            }
        }
        Ok(())
    }

    /// Pool entries this rule references.
    pub fn pool_refs(&self) -> PoolRefs {
        let mut refs = PoolRefs::default();
        for desc in &self.keys {
            match desc.matcher {
                KeyMatch::Range(id) => refs.ranges.push(id),
                KeyMatch::PortList(id) => refs.port_lists.push(id),
                KeyMatch::CustomBytes { set, .. } => refs.custom_bytes.push(set),
                _ => {}
            }
        }
        for action in &self.actions {
            if let Action::Pbs(id) = action {
                refs.pbs.push(*id);
            }
        }
        refs
    }

    pub fn flow_counter(&self) -> Option<FlowCounterId> {
        self.actions.iter().find_map(|a| match a {
            Action::Counter(id) => Some(*id),
            _ => None,
        })
    }

    /// Lowers the rule to the image written at `offset`.
    pub fn to_image(&self, offset: u32) -> HwRuleImage {
        HwRuleImage {
            offset,
            priority: self.priority,
            keys: self.keys.iter().map(|k| k.to_word()).collect(),
            actions: self.actions.iter().map(|a| a.to_word()).collect(),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prio={} keys={} actions={}",
            self.priority,
            self.keys.len(),
            self.actions.len()
        )
    }
}

/// Dense rule storage of one region, indexed by offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    slots: Vec<Option<Rule>>,
    used: usize,
}

impl RuleTable {
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: vec![None; capacity as usize],
            used: 0,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Number of occupied offsets.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn check_offset(&self, offset: u32) -> Result<()> {
        if offset >= self.capacity() {
            return Err(AclError::OutOfRange {
                offset,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    pub fn get(&self, offset: u32) -> Result<Option<&Rule>> {
        self.check_offset(offset)?;
        Ok(self.slots[offset as usize].as_ref())
    }

    pub fn highest_used(&self) -> Option<u32> {
        self.slots.iter().rposition(Option::is_some).map(|i| i as u32)
    }

    /// Occupied offsets in ascending order.
    pub fn occupied(&self) -> impl Iterator<Item = (u32, &Rule)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|r| (i as u32, r)))
    }

    /// Changes the capacity. Offsets at or beyond the new capacity must be empty.
    pub(crate) fn resize(&mut self, capacity: u32) -> Result<()> {
        if let Some(highest) = self.highest_used() {
            if highest >= capacity {
                return Err(AclError::exhausted(format!(
                    "rule at offset {} does not fit a capacity of {}",
                    highest, capacity
                )));
            }
        }
        self.slots.resize(capacity as usize, None);
        Ok(())
    }

    /// Stores a rule, returning the one it replaced.
    pub(crate) fn set(&mut self, offset: u32, rule: Rule) -> Result<Option<Rule>> {
        self.check_offset(offset)?;
        let old = self.slots[offset as usize].replace(rule);
        if old.is_none() {
            self.used += 1;
        }
        Ok(old)
    }

    pub(crate) fn clear(&mut self, offset: u32) -> Result<Option<Rule>> {
        self.check_offset(offset)?;
        let old = self.slots[offset as usize].take();
        if old.is_some() {
            self.used -= 1;
        }
        Ok(old)
    }

    /// Checks the bounds of a block move.
    pub fn check_block(&self, src: u32, size: u32, dst: u32) -> Result<()> {
        if size == 0 {
            return Err(AclError::invalid("block size must be > 0"));
        }
        let capacity = self.capacity();
        for start in [src, dst] {
            match start.checked_add(size) {
                Some(end) if end <= capacity => {}
                _ => {
                    return Err(AclError::OutOfRange {
                        offset: start.saturating_add(size - 1),
                        capacity,
                    })
                }
            }
        }
        Ok(())
    }

    /// Moves `size` slots from `src` to `dst`.
    ///
    /// Rules already at the destination take over the vacated source slots,
    /// so a disjoint move swaps the two blocks and no rule is dropped.
    pub(crate) fn move_block(&mut self, src: u32, size: u32, dst: u32) -> Result<()> {
        self.check_block(src, size, dst)?;
        let taken: Vec<(u32, Option<Rule>)> = block_relocations(src, size, dst)
            .into_iter()
            .map(|(from, to)| (to, self.slots[from as usize].take()))
            .collect();
        for (to, rule) in taken {
            self.slots[to as usize] = rule;
        }
        Ok(())
    }

    /// Computes the `(offset, priority)` updates of a priority shift.
    ///
    /// Rules with priority in `[min, max]` move by `delta`. The shift is
    /// refused if a resulting priority leaves `bounds` or collides with a
    /// rule outside the shifted band.
    pub fn plan_shift(
        &self,
        min: u32,
        max: u32,
        delta: i64,
        bounds: &PriorityRange,
    ) -> Result<Vec<(u32, u32)>> {
        if min > max {
            return Err(AclError::invalid(format!("priority band {}..={} is empty", min, max)));
        }
        let in_band = |p: u32| (min..=max).contains(&p);
        let fixed: HashSet<u32> = self
            .occupied()
            .filter(|(_, r)| !in_band(r.priority))
            .map(|(_, r)| r.priority)
            .collect();

        let mut updates = Vec::new();
        for (offset, rule) in self.occupied().filter(|(_, r)| in_band(r.priority)) {
            let shifted = i64::from(rule.priority) + delta;
            let priority = u32::try_from(shifted)
                .ok()
                .filter(|p| bounds.contains(*p))
                .ok_or_else(|| {
                    AclError::invalid(format!(
                        "priority {} shifted by {} leaves {}..={}",
                        rule.priority, delta, bounds.min, bounds.max
                    ))
                })?;
            if fixed.contains(&priority) {
                return Err(AclError::invalid(format!(
                    "shifted priority {} collides with an existing rule",
                    priority
                )));
            }
            updates.push((offset, priority));
        }
        Ok(updates)
    }

    pub(crate) fn apply_priorities(&mut self, updates: &[(u32, u32)]) {
        for (offset, priority) in updates {
            if let Some(Some(rule)) = self.slots.get_mut(*offset as usize) {
                rule.priority = *priority;
            }
        }
    }
}
