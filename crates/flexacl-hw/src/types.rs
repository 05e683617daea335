//! Typed object handles and attachment points.
//!
//! Every object the ACL core allocates is identified by a [`Handle`]. The
//! phantom type parameter keeps handles of different kinds apart at compile
//! time, and the generation tag makes a handle to a destroyed object stale
//! even after its slot has been reused.

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use bitflags::bitflags;

/// Raw handle value as handed to the device (`generation << 32 | index`).
pub type RawHandle = u64;

/// Marker trait for handle kinds.
pub trait HandleKind: Send + Sync + 'static {
    /// Returns the object kind name for debugging.
    fn type_name() -> &'static str;
}

/// A typed, generation-tagged object handle.
///
/// The generation of a live slot is never zero, so the raw value of a
/// valid handle is never zero either.
///
/// # Examples
///
/// ```
/// use flexacl_hw::{RegionId, AclId};
///
/// let region = RegionId::from_parts(3, 1);
/// assert_eq!(region.index(), 3);
/// assert_eq!(RegionId::from_raw(region.as_raw()), Some(region));
///
/// // This would fail to compile:
/// // fn takes_acl(a: AclId) {}
/// // takes_acl(region);
/// ```
pub struct Handle<T: HandleKind> {
    index: u32,
    generation: u32,
    _marker: PhantomData<T>,
}

impl<T: HandleKind> Handle<T> {
    /// Creates a handle from its slot index and generation.
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Decodes a raw handle.
    ///
    /// Returns `None` for a zero generation, which no live object carries.
    pub fn from_raw(raw: RawHandle) -> Option<Self> {
        let generation = (raw >> 32) as u32;
        if generation == 0 {
            None
        } else {
            Some(Self::from_parts(raw as u32, generation))
        }
    }

    /// Returns the raw value handed to the device.
    pub const fn as_raw(&self) -> RawHandle {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Returns the slot index.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the slot generation.
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl<T: HandleKind> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: HandleKind> Copy for Handle<T> {}

impl<T: HandleKind> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}#{})", T::type_name(), self.index, self.generation)
    }
}

impl<T: HandleKind> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:0x{:016x}", T::type_name(), self.as_raw())
    }
}

impl<T: HandleKind> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T: HandleKind> Eq for Handle<T> {}

impl<T: HandleKind> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_raw().hash(state);
    }
}

impl<T: HandleKind> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: HandleKind> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.index, self.generation).cmp(&(other.index, other.generation))
    }
}

// ============================================================================
// Handle Kind Markers
// ============================================================================

macro_rules! define_handle_kind {
    ($name:ident, $type_name:literal, $alias:ident) => {
        #[doc = concat!("Marker type for ", $type_name, " handles.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl HandleKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        #[doc = concat!("Handle to a ", $type_name, " object.")]
        pub type $alias = Handle<$name>;
    };
}

define_handle_kind!(KeyTypeKind, "KeyType", KeyTypeId);
define_handle_kind!(RegionKind, "Region", RegionId);
define_handle_kind!(AclKind, "Acl", AclId);
define_handle_kind!(GroupKind, "AclGroup", GroupId);
define_handle_kind!(PbsKind, "Pbs", PbsId);
define_handle_kind!(RangeKind, "Range", RangeId);
define_handle_kind!(CustomBytesKind, "CustomBytes", CustomBytesId);
define_handle_kind!(PortListKind, "PortList", PortListId);
define_handle_kind!(VlanGroupKind, "VlanGroup", VlanGroupId);

// ============================================================================
// External identifiers
// ============================================================================

macro_rules! define_external_id {
    ($name:ident, $label:literal) => {
        #[doc = concat!("Opaque ", $label, " identifier owned by the platform layer.")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "{}"), self.0)
            }
        }
    };
}

define_external_id!(PortId, "P");
define_external_id!(LagId, "LAG");
define_external_id!(RifId, "RIF");
define_external_id!(FlowCounterId, "FC");

// ============================================================================
// Directions and attachment points
// ============================================================================

/// Pipeline stage an ACL, group or binding applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Ingress,
    Egress,
    RifIngress,
    RifEgress,
    /// Pseudo-direction for ACLs that carry a bitmap of real directions.
    MultiPoints,
}

impl Direction {
    /// Returns the bitmap flag for a real direction, `None` for `MultiPoints`.
    pub fn flag(&self) -> Option<DirectionSet> {
        match self {
            Direction::Ingress => Some(DirectionSet::INGRESS),
            Direction::Egress => Some(DirectionSet::EGRESS),
            Direction::RifIngress => Some(DirectionSet::RIF_INGRESS),
            Direction::RifEgress => Some(DirectionSet::RIF_EGRESS),
            Direction::MultiPoints => None,
        }
    }

    pub fn is_rif(&self) -> bool {
        matches!(self, Direction::RifIngress | Direction::RifEgress)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Ingress => "INGRESS",
            Direction::Egress => "EGRESS",
            Direction::RifIngress => "RIF_INGRESS",
            Direction::RifEgress => "RIF_EGRESS",
            Direction::MultiPoints => "MULTI_POINTS",
        };
        write!(f, "{}", s)
    }
}

bitflags! {
    /// Set of real directions carried by a `MultiPoints` ACL.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirectionSet: u8 {
        const INGRESS = 0b0001;
        const EGRESS = 0b0010;
        const RIF_INGRESS = 0b0100;
        const RIF_EGRESS = 0b1000;
    }
}

impl DirectionSet {
    /// Returns true if `direction` is a member of the set.
    pub fn includes(&self, direction: Direction) -> bool {
        direction.flag().is_some_and(|flag| self.contains(flag))
    }
}

/// A hardware point an ACL or group chain can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttachPoint {
    Port(PortId),
    Lag(LagId),
    VlanGroup(VlanGroupId),
    Rif(RifId),
}

impl AttachPoint {
    /// Returns true if the point can carry bindings in `direction`.
    ///
    /// Port, LAG and VLAN-group points take `Ingress`/`Egress`; router
    /// interfaces take `RifIngress`/`RifEgress`.
    pub fn supports(&self, direction: Direction) -> bool {
        match self {
            AttachPoint::Rif(_) => direction.is_rif(),
            _ => matches!(direction, Direction::Ingress | Direction::Egress),
        }
    }
}

impl fmt::Display for AttachPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachPoint::Port(id) => write!(f, "{}", id),
            AttachPoint::Lag(id) => write!(f, "{}", id),
            AttachPoint::VlanGroup(id) => write!(f, "VLAN_GROUP({})", id.index()),
            AttachPoint::Rif(id) => write!(f, "{}", id),
        }
    }
}
