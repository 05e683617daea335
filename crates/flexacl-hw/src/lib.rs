//! Device-facing layer for flexible ACL hardware.
//!
//! This crate provides the pieces shared by everything that programs the
//! ACL pipeline:
//!
//! - [`types`]: generation-tagged typed handles, attachment points and directions
//! - [`error`]: device status codes and error handling
//! - [`api`]: the [`AclDevice`] programming trait and an in-memory [`SimDevice`]
//!
//! # Example
//!
//! ```
//! use flexacl_hw::{AclDevice, RegionId, SimDevice};
//!
//! let device = SimDevice::new();
//! let region = RegionId::from_parts(0, 1);
//! device.create_region(region, &[3, 6], 128).unwrap();
//! assert_eq!(device.region_hw_size(region), Some(128));
//! ```

pub mod api;
pub mod error;
pub mod types;

pub use api::{block_relocations, AclDevice, HwActionWord, HwKeyWord, HwRuleImage, SimDevice, SimOp};
pub use error::{HwError, HwResult, HwStatus};
pub use types::{
    AclId, AclKind, AttachPoint, CustomBytesId, CustomBytesKind, Direction, DirectionSet,
    FlowCounterId, GroupId, GroupKind, Handle, HandleKind, KeyTypeId, KeyTypeKind, LagId, PbsId,
    PbsKind, PortId, PortListId, PortListKind, RangeId, RangeKind, RawHandle, RegionId,
    RegionKind, RifId, VlanGroupId, VlanGroupKind,
};
