//! # Pool Allocator
//!
//! Fixed-capacity, generation-checked slots for bookkeeping records that are
//! created and destroyed constantly (tasks, timers, sound handles).

/// Fixed-capacity object pool with generation-checked handles.
///
/// Slots carry a generation counter that is bumped every time the slot is
/// freed, so a [`PoolHandle`] to a freed object never resolves to whatever
/// later reuses the slot.
///
/// # Threading
///
/// Single-threaded, like the scheduler that owns it.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool: PoolAllocator<TaskRecord> = PoolAllocator::new(1024);
///
/// // O(1), reuses a pre-allocated slot
/// let handle = pool.allocate(record)?;
///
/// // Free - O(1), handle is dead from here on
/// pool.free(handle);
/// assert!(pool.get(handle).is_none());
/// ```
#[derive(Debug)]
pub struct PoolAllocator<T> {
    /// Pre-allocated slots.
    slots: Box<[Slot<T>]>,
    /// Indices of empty slots, popped from the back.
    free_list: Vec<u32>,
    /// Occupied slots.
    allocated_count: usize,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// `Copy` handle to a pooled object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    /// Slot index.
    index: u32,
    /// Generation of the slot when the handle was issued.
    generation: u32,
}

impl PoolHandle {
    /// Returns the slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the slot generation.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl<T> PoolAllocator<T> {
    /// Creates a pool of `capacity` empty slots.
    ///
    /// All memory is pre-allocated upfront. A zero-capacity pool is valid
    /// and always full.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of objects (clamped to `u32::MAX`)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize) as u32;
        let slots: Vec<Slot<T>> = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                value: None,
            })
            .collect();

        Self {
            slots: slots.into_boxed_slice(),
            free_list: (0..capacity).rev().collect(),
            allocated_count: 0,
        }
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    #[inline]
    #[must_use]
    pub const fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// Number of empty slots.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Moves `value` into an empty slot, most recently freed first.
    ///
    /// # Returns
    ///
    /// A handle to the allocated object, or `None` if the pool is full.
    pub fn allocate(&mut self, value: T) -> Option<PoolHandle> {
        let index = self.free_list.pop()?;
        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.allocated_count += 1;

        Some(PoolHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Frees an allocated object and retires every handle to it.
    ///
    /// # Returns
    ///
    /// The freed object, or `None` if the handle was stale or invalid.
    pub fn free(&mut self, handle: PoolHandle) -> Option<T> {
        let slot = self.slot_mut(handle)?;
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        self.allocated_count -= 1;
        Some(value)
    }

    /// Whether the handle still refers to a live object.
    #[inline]
    #[must_use]
    pub fn contains(&self, handle: PoolHandle) -> bool {
        self.get(handle).is_some()
    }

    /// The object behind `handle`, if the handle is current.
    #[inline]
    #[must_use]
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?
            .value
            .as_ref()
    }

    /// Mutable access to the object behind `handle`.
    #[inline]
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.slot_mut(handle)?.value.as_mut()
    }

    /// Drops every object and retires every handle.
    ///
    /// Outstanding handles are retired. Memory is not freed.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
        }
        let capacity = self.slots.len() as u32;
        self.free_list.clear();
        self.free_list.extend((0..capacity).rev());
        self.allocated_count = 0;
    }

    /// Iterates over all allocated objects in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    PoolHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    fn slot_mut(&mut self, handle: PoolHandle) -> Option<&mut Slot<T>> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
    }
}
