//! Fixed-capacity slot arena with generation-checked handles
use alloc::{collections::VecDeque, vec::Vec};
use core::{fmt, marker::PhantomData, ops};

use crate::object::{Id, ObjectId};

/// Stores up to `capacity` values of type `T` and hands out handles of type
/// `K`.
///
/// Each slot carries a generation counter that is bumped whenever the slot is
/// vacated, so a handle to a removed value never resolves to the slot's next
/// occupant.
pub(crate) struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    /// Vacated slot indices, reused oldest-first.
    free: VecDeque<u16>,
    capacity: usize,
    len: usize,
    _key: PhantomData<fn(K) -> K>,
}

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

impl<K: ObjectId, T> Arena<K, T> {
    /// Construct an empty arena. `capacity` is clamped to the number of
    /// indices an [`Id`] can represent.
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(u16::MAX as usize + 1);
        Self {
            slots: Vec::with_capacity(capacity),
            free: VecDeque::with_capacity(capacity),
            capacity,
            len: 0,
            _key: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Insert a value constructed by `f`, which receives the handle the value
    /// will be stored under. Returns `None` if the arena is full.
    pub(crate) fn insert_with(&mut self, f: impl FnOnce(K) -> T) -> Option<K> {
        let index = if let Some(index) = self.free.pop_front() {
            index
        } else if self.slots.len() < self.capacity {
            self.slots.push(Slot {
                generation: 1,
                value: None,
            });
            (self.slots.len() - 1) as u16
        } else {
            return None;
        };

        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none());
        let key = K::from_raw(Id::new(index, slot.generation)?);
        slot.value = Some(f(key));
        self.len += 1;
        Some(key)
    }

    #[inline]
    pub(crate) fn insert(&mut self, value: T) -> Option<K> {
        self.insert_with(|_| value)
    }

    /// Remove the value referenced by `key`. Returns `None` if `key` is stale.
    pub(crate) fn remove(&mut self, key: K) -> Option<T> {
        let id = key.raw();
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            x => x,
        };
        self.free.push_back(id.index() as u16);
        self.len -= 1;
        Some(value)
    }

    #[inline]
    pub(crate) fn get(&self, key: K) -> Option<&T> {
        let id = key.raw();
        let slot = self.slots.get(id.index())?;
        if slot.generation == id.generation() {
            slot.value.as_ref()
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, key: K) -> Option<&mut T> {
        let id = key.raw();
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation == id.generation() {
            slot.value.as_mut()
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Iterate over the live values in slot order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            let value = slot.value.as_ref()?;
            Some((K::from_raw(Id::new(i as u16, slot.generation)?), value))
        })
    }

    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.slots.iter_mut().filter_map(|slot| slot.value.as_mut())
    }

    /// Collect the handles of the live values that satisfy `pred`. Used by the
    /// operations that mutate the arena while walking it.
    pub(crate) fn keys_where(&self, mut pred: impl FnMut(&T) -> bool) -> Vec<K> {
        self.iter()
            .filter(|(_, value)| pred(value))
            .map(|(key, _)| key)
            .collect()
    }
}

impl<K: ObjectId, T> ops::Index<K> for Arena<K, T> {
    type Output = T;

    #[inline]
    #[track_caller]
    fn index(&self, key: K) -> &T {
        match self.get(key) {
            Some(x) => x,
            None => panic!("stale handle {key:?} in a kernel structure"),
        }
    }
}

impl<K: ObjectId, T> ops::IndexMut<K> for Arena<K, T> {
    #[inline]
    #[track_caller]
    fn index_mut(&mut self, key: K) -> &mut T {
        match self.get_mut(key) {
            Some(x) => x,
            None => panic!("stale handle {key:?} in a kernel structure"),
        }
    }
}

impl<K: ObjectId, T: fmt::Debug> fmt::Debug for Arena<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
