//! Flexible ACL key compiler and hardware ACL resource manager.
//!
//! `flexacl` keeps the control-plane model of a device's ACL pipeline and
//! programs it through an [`AclDevice`](flexacl_hw::AclDevice):
//!
//! ```text
//! [basic keys] ──> [FlexKeyCompiler] ──> KeyType ──> Region ──> Rules
//!                                                      │
//!                                   ACL (ordered regions)
//!                                                      │
//!                               ACL group ──next──> ACL group
//!                                                      │
//!                             Binding (port/LAG/VLAN group/RIF, direction)
//! ```
//!
//! # Key Components
//!
//! - [`flex_key`]: minimal key-block covers and key-type interning
//! - [`region`] and [`rule`]: hardware-sized regions and their rule slots
//! - [`acl`], [`group`], [`binding`]: lookup objects, chains and bindings
//! - [`pools`]: PBS, range, custom-byte, port-list and VLAN-group pools
//! - [`AclCore`]: the per-device command surface, [`AclCoreHandle`] for
//!   shared access
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//!
//! use flexacl::{
//!     Action, AclCore, AclCoreConfig, AclType, AttachPoint, BasicKey, BindTarget, Direction,
//!     DirectionSet, KeyMatch, Rule,
//! };
//! use flexacl_hw::{PortId, SimDevice};
//!
//! let sim = Arc::new(SimDevice::new());
//! let mut core = AclCore::new(AclCoreConfig::default(), sim.clone()).unwrap();
//!
//! let kt = core
//!     .create_key_type(&[BasicKey::SrcIp, BasicKey::DstIp, BasicKey::L4DstPort], None)
//!     .unwrap();
//! let region = core.create_region(kt, 100).unwrap();
//! assert_eq!(core.region_hw_size(region).unwrap(), 128);
//!
//! let rule = Rule::new(10)
//!     .with_key(BasicKey::DstIp, KeyMatch::ipv4(Ipv4Addr::new(10, 0, 0, 1), 32))
//!     .with_action(Action::forward_next_hop(42));
//! core.set_rules(region, &[0], &[rule]).unwrap();
//!
//! let acl = core
//!     .create_acl(AclType::Agnostic, Direction::Ingress, DirectionSet::empty(), &[region])
//!     .unwrap();
//! let port = AttachPoint::Port(PortId(100));
//! core.bind(port, Direction::Ingress, BindTarget::Acl(acl)).unwrap();
//! assert_eq!(core.binding_primary(port, Direction::Ingress).unwrap(), BindTarget::Acl(acl));
//! assert!(!core.activity(region, 0, false).unwrap());
//! ```

pub mod acl;
pub mod acl_core;
pub mod binding;
pub mod config;
pub mod error;
pub mod events;
pub mod flex_key;
pub mod group;
pub mod handle;
pub mod key_block;
pub mod ops;
pub mod pools;
pub mod region;
pub mod rule;
pub mod types;

pub use acl::{Acl, AclStore};
pub use acl_core::{AclCore, AclCoreStats, PoolEntry, RuleEntry, RuleListing, RuleLookup};
pub use binding::{BindTarget, BindingList, BindingState, BoundEntry};
pub use config::{AclCoreConfig, ConfigError, PriorityRange};
pub use error::{AclError, ErrorKind, Result};
pub use events::{AclEvent, ChannelSink, EventKind, EventSink, RecordingSink};
pub use flex_key::{FlexKeyCompiler, KeyType, KeyTypeRegistry};
pub use group::{AclGroup, GroupManager};
pub use handle::AclCoreHandle;
pub use key_block::{KeyBlock, KeyBlockCatalog, KeyBlockId};
pub use ops::{
    AclOp, AclParams, ActivityOp, ActivityParams, BindOp, BindParams, BlockMove, GroupOp,
    GroupParams, KeyTypeOp, KeyTypeParams, ObjectQuery, OpOutcome, PoolOp, PoolParams, PoolValue,
    PriorityShift, QueryParams, RegionOp, RegionParams, RuleOp, RuleParams,
};
pub use pools::{
    CustomByteSet, ExtractionPoint, PbsDestination, PoolRefs, Pools, RangeComparator, RangeField,
};
pub use region::{Region, RegionAllocator, RegionInfo};
pub use rule::{Action, ActionClass, ForwardTarget, KeyDescriptor, KeyMatch, Rule, RuleTable};
pub use types::{AccessCmd, AclType, AttachPoint, BasicKey, Direction, DirectionSet, ObjectKind};
