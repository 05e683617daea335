//! Handle-indexed object storage.
//!
//! An `Arena` hands out [`Handle`]s into a dense slot vector. Freed slots are
//! reused, but every reuse bumps the slot generation, so handles to the
//! previous occupant stop resolving. The arena also enforces an object
//! limit; `insert` fails once `limit` live objects exist.

use std::marker::PhantomData;

use flexacl_hw::{Handle, HandleKind};

use crate::refcount::{HasRefCount, RefCountError};

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generation-checked storage for objects of kind `K`.
#[derive(Debug, Clone)]
pub struct Arena<T, K: HandleKind> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    limit: usize,
    _kind: PhantomData<K>,
}

impl<T, K: HandleKind> Arena<T, K> {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            limit,
            _kind: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.limit
    }

    /// Returns the handle the next `insert` will hand out, or `None` if full.
    pub fn next_handle(&self) -> Option<Handle<K>> {
        if self.is_full() {
            return None;
        }
        match self.free.last() {
            Some(&index) => {
                let slot = &self.slots[index as usize];
                Some(Handle::from_parts(index, slot.generation))
            }
            None => {
                let index = u32::try_from(self.slots.len()).ok()?;
                Some(Handle::from_parts(index, 1))
            }
        }
    }

    pub fn insert(&mut self, value: T) -> Option<Handle<K>> {
        self.insert_with(|_| value)
    }

    /// Inserts a value built from its own handle.
    pub fn insert_with<F>(&mut self, make: F) -> Option<Handle<K>>
    where
        F: FnOnce(Handle<K>) -> T,
    {
        let handle = self.next_handle()?;
        let value = make(handle);
        if self.free.pop().is_none() {
            self.slots.push(Slot {
                generation: handle.generation(),
                value: None,
            });
        }
        self.slots[handle.index() as usize].value = Some(value);
        self.len += 1;
        Some(handle)
    }

    fn slot(&self, handle: Handle<K>) -> Option<&Slot<T>> {
        self.slots
            .get(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())
    }

    pub fn contains(&self, handle: Handle<K>) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: Handle<K>) -> Option<&T> {
        self.slot(handle).and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, handle: Handle<K>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())
            .and_then(|s| s.value.as_mut())
    }

    /// Removes the object and retires its handle.
    pub fn remove(&mut self, handle: Handle<K>) -> Option<T> {
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|s| s.generation == handle.generation())?;
        let value = slot.value.take()?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        self.free.push(handle.index());
        self.len -= 1;
        Some(value)
    }

    /// Iterates live objects in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|v| (Handle::from_parts(index as u32, slot.generation), v))
        })
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle<K>> + '_ {
        self.iter().map(|(h, _)| h)
    }
}

impl<T: HasRefCount, K: HandleKind> Arena<T, K> {
    pub fn increment_ref(&mut self, handle: Handle<K>) -> Result<u32, RefCountError> {
        match self.get_mut(handle) {
            Some(entry) => Ok(entry.increment_ref()),
            None => Err(RefCountError::KeyNotFound),
        }
    }

    pub fn decrement_ref(&mut self, handle: Handle<K>) -> Result<u32, RefCountError> {
        match self.get_mut(handle) {
            Some(entry) => entry
                .decrement_ref()
                .ok_or(RefCountError::RefCountUnderflow),
            None => Err(RefCountError::KeyNotFound),
        }
    }

    pub fn ref_count(&self, handle: Handle<K>) -> Option<u32> {
        self.get(handle).map(|e| e.ref_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refcount::RefCounted;
    use flexacl_hw::{AclKind, RangeKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_and_get() {
        let mut arena: Arena<&str, AclKind> = Arena::with_limit(8);
        let a = arena.insert("a").unwrap();
        let b = arena.insert("b").unwrap();
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.len(), 2);
        assert_ne!(a.as_raw(), 0);
    }

    #[test]
    fn test_stale_handle_does_not_resolve_after_reuse() {
        let mut arena: Arena<u32, AclKind> = Arena::with_limit(8);
        let old = arena.insert(1).unwrap();
        assert_eq!(arena.remove(old), Some(1));
        let new = arena.insert(2).unwrap();

        assert_eq!(old.index(), new.index());
        assert_ne!(old, new);
        assert_eq!(arena.get(old), None);
        assert_eq!(arena.remove(old), None);
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn test_limit_is_enforced() {
        let mut arena: Arena<u32, AclKind> = Arena::with_limit(2);
        arena.insert(1).unwrap();
        let h = arena.insert(2).unwrap();
        assert!(arena.is_full());
        assert_eq!(arena.next_handle(), None);
        assert_eq!(arena.insert(3), None);

        arena.remove(h);
        assert!(arena.insert(3).is_some());
    }

    #[test]
    fn test_next_handle_matches_insert() {
        let mut arena: Arena<u32, AclKind> = Arena::with_limit(4);
        let first = arena.insert(0).unwrap();
        arena.remove(first);
        let predicted = arena.next_handle().unwrap();
        let actual = arena.insert_with(|h| h.generation()).unwrap();
        assert_eq!(predicted, actual);
        assert_eq!(arena.get(actual), Some(&2));
    }

    #[test]
    fn test_iteration_in_handle_order() {
        let mut arena: Arena<u32, AclKind> = Arena::with_limit(8);
        let handles: Vec<_> = (0..4).map(|i| arena.insert(i).unwrap()).collect();
        arena.remove(handles[1]);
        let seen: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(seen, vec![0, 2, 3]);
    }

    #[test]
    fn test_ref_counting_through_arena() {
        let mut arena: Arena<RefCounted<u16>, RangeKind> = Arena::with_limit(4);
        let h = arena.insert(RefCounted::new(80)).unwrap();
        assert_eq!(arena.increment_ref(h), Ok(1));
        assert_eq!(arena.decrement_ref(h), Ok(0));
        assert_eq!(
            arena.decrement_ref(h),
            Err(RefCountError::RefCountUnderflow)
        );

        arena.remove(h);
        assert_eq!(arena.increment_ref(h), Err(RefCountError::KeyNotFound));
    }
}
