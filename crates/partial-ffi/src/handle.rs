//! Generational handle table backing every object handed across the C ABI.
//!
//! A handle is `slot << 32 | generation`. Generations start at 1, so no live
//! handle is ever `0` and C callers can use `0` as "no object". Removing a
//! value bumps its slot's generation: stale and doubly-destroyed handles
//! resolve to `None` instead of someone else's arena.

pub(crate) type Handle = u64;

/// First generation issued for a fresh slot.
const FIRST_GENERATION: u32 = 1;

fn encode(slot: u32, generation: u32) -> Handle {
    (u64::from(slot) << 32) | u64::from(generation)
}

fn decode(handle: Handle) -> (u32, u32) {
    ((handle >> 32) as u32, handle as u32)
}

struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Maps `u64` handles to owned values with slot reuse.
pub(crate) struct HandleTable<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> HandleTable<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Store `value` and return its handle. Never returns `0`.
    pub fn insert(&mut self, value: T) -> Handle {
        self.live += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.entries[slot as usize];
            entry.value = Some(value);
            return encode(slot, entry.generation);
        }
        let slot = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: FIRST_GENERATION,
            value: Some(value),
        });
        encode(slot, FIRST_GENERATION)
    }

    fn entry(&self, handle: Handle) -> Option<&Entry<T>> {
        let (slot, generation) = decode(handle);
        self.entries
            .get(slot as usize)
            .filter(|e| e.generation == generation)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.entry(handle)?.value.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let (slot, generation) = decode(handle);
        let entry = self.entries.get_mut(slot as usize)?;
        if entry.generation != generation {
            return None;
        }
        entry.value.as_mut()
    }

    /// Take the value out and invalidate `handle`.
    ///
    /// A slot whose generation wraps back to 0 is retired for good: 0 is
    /// never a valid generation, and reissuing 1 would revive handles from
    /// the slot's first life.
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        let (slot, generation) = decode(handle);
        let entry = self.entries.get_mut(slot as usize)?;
        if entry.generation != generation {
            return None;
        }
        let value = entry.value.take()?;
        self.live -= 1;
        entry.generation = entry.generation.wrapping_add(1);
        if entry.generation != 0 {
            self.free.push(slot);
        }
        Some(value)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.live
    }
}
