//! Generational Arena
//!
//! Slot storage with a free list for bodies, fixtures, joints, contacts and
//! particle groups. Handles carry a generation counter so that a handle to a
//! destroyed object never aliases the object that later reuses its slot.
//!
//! # Features
//!
//! - **O(1) insert/remove**: vacant slots are recycled through a free list
//! - **Typed handles**: `BodyId`, `FixtureId`, ... cannot be mixed up
//! - **Stable iteration order**: slots are visited by index

use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// A typed handle into an [`Arena`]
pub trait ArenaId: Copy + Eq {
    /// Build a handle from its raw parts
    fn from_raw(index: u32, generation: u32) -> Self;
    /// Slot index
    fn slot(self) -> u32;
    /// Generation of the slot when the handle was issued
    fn generation(self) -> u32;
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl Default for $name {
            /// A handle that never resolves
            #[inline]
            fn default() -> Self {
                Self {
                    index: u32::MAX,
                    generation: 0,
                }
            }
        }

        impl ArenaId for $name {
            #[inline]
            fn from_raw(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }
            #[inline]
            fn slot(self) -> u32 {
                self.index
            }
            #[inline]
            fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

define_id!(
    /// Handle to a rigid body
    BodyId
);
define_id!(
    /// Handle to a fixture
    FixtureId
);
define_id!(
    /// Handle to a joint
    JointId
);
define_id!(
    /// Handle to a contact (valid until the contact is destroyed)
    ContactId
);
define_id!(
    /// Handle to a particle group
    ParticleGroupId
);

#[derive(Clone, Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational slot arena
#[derive(Clone, Debug)]
pub struct Arena<I, T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
    _marker: PhantomData<I>,
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    /// Create an empty arena
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Store a value and return its handle
    pub fn insert(&mut self, value: T) -> I {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            I::from_raw(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            I::from_raw(index, 0)
        }
    }

    /// Remove a value. Stale handles return `None`.
    pub fn remove(&mut self, id: I) -> Option<T> {
        let slot = self.slots.get_mut(id.slot() as usize)?;
        if slot.generation != id.generation() || slot.value.is_none() {
            return None;
        }
        let value = slot.value.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.slot());
        self.len -= 1;
        value
    }

    /// Shared access
    #[inline]
    pub fn get(&self, id: I) -> Option<&T> {
        self.slots
            .get(id.slot() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.value.as_ref())
    }

    /// Exclusive access
    #[inline]
    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots
            .get_mut(id.slot() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.value.as_mut())
    }

    /// Exclusive access to two distinct values
    pub fn get2_mut(&mut self, a: I, b: I) -> Option<(&mut T, &mut T)> {
        let (ia, ib) = (a.slot() as usize, b.slot() as usize);
        if ia == ib || self.get(a).is_none() || self.get(b).is_none() {
            return None;
        }
        let (lo, hi, swapped) = if ia < ib { (ia, ib, false) } else { (ib, ia, true) };
        let (head, tail) = self.slots.split_at_mut(hi);
        let first = head[lo].value.as_mut()?;
        let second = tail[0].value.as_mut()?;
        if swapped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    /// True if the handle refers to a live value
    #[inline]
    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    /// Number of live values
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no value is stored
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over live values in slot order
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value
                .as_ref()
                .map(|v| (I::from_raw(i as u32, s.generation), v))
        })
    }

    /// Iterate mutably over live values in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (I, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.value
                .as_mut()
                .map(move |v| (I::from_raw(i as u32, generation), v))
        })
    }

    /// Snapshot of the live handles, for loops that mutate the arena
    pub fn ids(&self) -> Vec<I> {
        self.iter().map(|(id, _)| id).collect()
    }
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
    type Output = T;

    #[inline]
    fn index(&self, id: I) -> &T {
        match self.get(id) {
            Some(v) => v,
            None => panic!("stale arena handle (slot {})", id.slot()),
        }
    }
}

impl<I: ArenaId, T> IndexMut<I> for Arena<I, T> {
    #[inline]
    fn index_mut(&mut self, id: I) -> &mut T {
        let slot = id.slot();
        match self.get_mut(id) {
            Some(v) => v,
            None => panic!("stale arena handle (slot {slot})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let mut arena: Arena<BodyId, i32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena[a], 1);
        assert_eq!(arena.remove(a), Some(1));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena[b], 2);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut arena: Arena<FixtureId, &str> = Arena::new();
        let a = arena.insert("a");
        arena.remove(a);
        let c = arena.insert("c");
        assert_eq!(a.slot(), c.slot());
        assert_ne!(a, c);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena[c], "c");
    }

    #[test]
    fn test_get2_mut() {
        let mut arena: Arena<JointId, i32> = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        {
            let (x, y) = arena.get2_mut(b, a).expect("distinct handles");
            *x += 10;
            *y += 20;
        }
        assert_eq!(arena[a], 21);
        assert_eq!(arena[b], 12);
        assert!(arena.get2_mut(a, a).is_none());
    }

    #[test]
    fn test_iteration_skips_vacant() {
        let mut arena: Arena<ContactId, u8> = Arena::new();
        let ids: Vec<_> = (0..5).map(|i| arena.insert(i)).collect();
        arena.remove(ids[1]);
        arena.remove(ids[3]);
        let values: Vec<u8> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 4]);
        assert_eq!(arena.ids().len(), 3);
    }
}
