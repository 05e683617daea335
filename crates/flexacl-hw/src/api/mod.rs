//! Device programming interface.
//!
//! - [`device`]: the [`AclDevice`] trait and the rule images it consumes
//! - [`sim`]: an in-memory device used by tests and dry runs

pub mod device;
pub mod sim;

pub use device::{block_relocations, AclDevice, HwActionWord, HwKeyWord, HwRuleImage};
pub use sim::{SimDevice, SimOp};
