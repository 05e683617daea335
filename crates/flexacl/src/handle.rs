//! Shared access to one device's ACL core.

use std::sync::Arc;

use flexacl_hw::AclDevice;
use parking_lot::RwLock;

use crate::acl_core::AclCore;
use crate::config::AclCoreConfig;
use crate::error::Result;

/// Cloneable handle serialising mutations of an [`AclCore`].
///
/// `read` runs under the shared lock and `write` under the exclusive one, so
/// lookups may run concurrently while every change is applied alone.
#[derive(Clone)]
pub struct AclCoreHandle {
    inner: Arc<RwLock<AclCore>>,
}

impl AclCoreHandle {
    pub fn new(core: AclCore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(core)),
        }
    }

    pub fn open(config: AclCoreConfig, device: Arc<dyn AclDevice>) -> Result<Self> {
        AclCore::new(config, device).map(Self::new)
    }

    pub fn read<R>(&self, f: impl FnOnce(&AclCore) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut AclCore) -> R) -> R {
        f(&mut self.inner.write())
    }
}
