//! Common containers for the flexible ACL core.
//!
//! - [`Arena`]: handle-indexed object storage with generation checks
//! - [`SyncMap`]: ordered map that never creates entries implicitly
//! - [`HasRefCount`]: reference counting shared by both containers
//! - [`Query`]: COUNT / GET / GETFIRST / GETNEXT selection over ordered keys
//!
//! # Example
//!
//! ```
//! use flexacl_common::{Arena, Query};
//! use flexacl_hw::RegionKind;
//!
//! let mut regions: Arena<&str, RegionKind> = Arena::with_limit(4);
//! let a = regions.insert("a").unwrap();
//! let b = regions.insert("b").unwrap();
//!
//! let first = Query::GetFirst(1).select(regions.handles()).unwrap();
//! assert_eq!(first.total, 2);
//! assert_eq!(first.items, vec![a]);
//!
//! let next = Query::GetNext(a, 8).select(regions.handles()).unwrap();
//! assert_eq!(next.items, vec![b]);
//! ```

mod arena;
mod query;
mod refcount;
mod sync_map;

pub use arena::Arena;
pub use query::{Query, QueryResult};
pub use refcount::{HasRefCount, RefCountError, RefCounted};
pub use sync_map::SyncMap;
