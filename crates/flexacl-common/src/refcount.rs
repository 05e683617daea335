//! Explicit reference counting.
//!
//! Shared objects (key types, ranges, port lists, ...) are counted through
//! the containers that own them. Counts never change as a side effect of a
//! lookup, and a decrement below zero is an error rather than a wrap.

use thiserror::Error;

/// Error type for reference count operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefCountError {
    #[error("Key not found")]
    KeyNotFound,

    #[error("Reference count underflow")]
    RefCountUnderflow,
}

/// Trait for types that have a reference count.
pub trait HasRefCount {
    /// Increments the reference count and returns the new value.
    fn increment_ref(&mut self) -> u32;

    /// Decrements the reference count and returns the new value.
    ///
    /// Returns `None` if the count would underflow.
    fn decrement_ref(&mut self) -> Option<u32>;

    /// Returns the current reference count.
    fn ref_count(&self) -> u32;
}

/// A value paired with its reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefCounted<T> {
    pub value: T,
    refs: u32,
}

impl<T> RefCounted<T> {
    pub fn new(value: T) -> Self {
        Self { value, refs: 0 }
    }
}

impl<T> HasRefCount for RefCounted<T> {
    fn increment_ref(&mut self) -> u32 {
        self.refs = self.refs.saturating_add(1);
        self.refs
    }

    fn decrement_ref(&mut self) -> Option<u32> {
        self.refs = self.refs.checked_sub(1)?;
        Some(self.refs)
    }

    fn ref_count(&self) -> u32 {
        self.refs
    }
}
