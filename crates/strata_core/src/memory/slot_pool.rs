//! # Slot Pool
//!
//! Generational slot allocator. Freed slots go on a LIFO free list and are
//! handed out again with a bumped generation, so a handle to a destroyed
//! object never resolves to whatever later took its place.

/// Handle to an object in a [`SlotPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotHandle {
    /// Index into the pool.
    pub index: u32,
    /// Generation the slot had when this handle was issued.
    pub generation: u32,
}

struct Slot<T> {
    value: Option<T>,
    generation: u32,
}

/// A growable pool of generational slots.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: SlotPool<&str> = SlotPool::with_capacity(16);
///
/// let a = pool.insert("page a");
/// pool.remove(a);
///
/// // Same slot, new generation: `a` is now stale.
/// let b = pool.insert("page b");
/// assert_eq!(a.index, b.index);
/// assert!(pool.get(a).is_none());
/// ```
pub struct SlotPool<T> {
    slots: Vec<Slot<T>>,
    /// Free list - indices of vacant slots, most recently freed last.
    free_list: Vec<u32>,
    len: usize,
}

impl<T> SlotPool<T> {
    /// Creates an empty pool with room for `capacity` slots before growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Returns the number of live objects.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Checks if no objects are live.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns one past the highest slot index ever handed out.
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Inserts an object, reusing the most recently freed slot if any.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` slots would be needed.
    pub fn insert(&mut self, value: T) -> SlotHandle {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return SlotHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).expect("slot pool exceeded u32::MAX slots");
        self.slots.push(Slot {
            value: Some(value),
            generation: 0,
        });
        SlotHandle {
            index,
            generation: 0,
        }
    }

    /// Returns the handle an insert would produce right now, without inserting.
    #[must_use]
    pub fn peek_next(&self) -> SlotHandle {
        match self.free_list.last() {
            Some(&index) => SlotHandle {
                index,
                generation: self.slots[index as usize].generation,
            },
            None => SlotHandle {
                index: self.slots.len() as u32,
                generation: 0,
            },
        }
    }

    /// Removes an object. Stale handles return `None`.
    pub fn remove(&mut self, handle: SlotHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.len -= 1;
        Some(value)
    }

    /// Gets a reference to a live object.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: SlotHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Gets a mutable reference to a live object.
    #[inline]
    pub fn get_mut(&mut self, handle: SlotHandle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Iterates over all live objects.
    pub fn iter(&self) -> impl Iterator<Item = (SlotHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|v| {
                (
                    SlotHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    v,
                )
            })
        })
    }

    /// Iterates mutably over all live objects.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlotHandle, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value.as_mut().map(|v| {
                (
                    SlotHandle {
                        index: index as u32,
                        generation,
                    },
                    v,
                )
            })
        })
    }

    /// Removes every object, bumping each occupied slot's generation.
    pub fn clear(&mut self) {
        let occupied: Vec<SlotHandle> = self.iter().map(|(handle, _)| handle).collect();
        for handle in occupied {
            self.remove(handle);
        }
    }
}

impl<T> Default for SlotPool<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
