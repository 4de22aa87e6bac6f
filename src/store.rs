//! Generational handle store for session state objects
//!
//! The host environment instantiates a single dispatcher object per call site, so distinct
//! decoder configurations must be kept alive side by side and named by opaque 64-bit handles
//! that travel through the host as plain integers. The [`HandleStore`] is a generational arena:
//! a handle packs a slot index and a generation counter, and a lookup validates the generation
//! recorded in the slot against the one presented in the handle. A stale handle (released slot,
//! possibly reused since) and a handle that never existed are reported identically as absent.

use std::fmt;

/// Opaque 64-bit handle naming one stored object.
///
/// The low 32 bits hold the slot index and the high 32 bits the slot generation at the time of
/// storage. The packing is an implementation detail: callers treat the value as opaque and only
/// ever round-trip it through [`Handle::raw`] and [`Handle::from_raw`].
#[derive(Clone, Eq, Hash, PartialEq, Debug, Copy)]
pub struct Handle(u64);

impl Handle {
    /// Returns the handle as a raw 64-bit value, suitable for crossing the host boundary.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Reconstructs a handle from a raw 64-bit value previously obtained from [`Handle::raw`].
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the handle for a given slot index and generation.
    fn pack(index: u32, generation: u32) -> Self {
        Self(u64::from(generation) << 32 | u64::from(index))
    }

    /// Returns the slot index encoded in the handle.
    #[allow(clippy::cast_possible_truncation)]
    fn index(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }

    /// Returns the generation encoded in the handle.
    #[allow(clippy::cast_possible_truncation)]
    fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// One arena slot: the generation that a handle must present, and the occupant (if any).
#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational arena mapping opaque handles to exclusively owned state objects.
///
/// # Examples
///
/// ```
/// use harqpool::HandleStore;
///
/// let mut store = HandleStore::new();
/// let handle = store.store(42u32);
/// assert_eq!(store.get(handle), Some(&42));
/// assert_eq!(store.release(handle), 1);
/// assert_eq!(store.release(handle), 0);
/// ```
#[derive(Debug)]
pub struct HandleStore<T> {
    /// All slots ever allocated, vacated ones included.
    slots: Vec<Slot<T>>,
    /// Indices of vacated slots available for reuse.
    free: Vec<u32>,
}

impl<T> Default for HandleStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleStore<T> {
    /// Returns an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// Stores a value and returns the handle that names it.
    ///
    /// The store owns the value exclusively until [`HandleStore::release`] is called with the
    /// returned handle or the store itself is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the number of simultaneously stored values exceeds `u32::MAX`, which cannot
    /// happen in practice.
    pub fn store(&mut self, value: T) -> Handle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::pack(index, slot.generation);
        }
        let index = u32::try_from(self.slots.len()).expect("slot index overflow");
        // Generations start at 1 so that the all-zero handle never validates.
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        Handle::pack(index, 1)
    }

    /// Returns a shared reference to the value named by `handle`, or `None` if the handle is
    /// absent or stale.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<&T> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Returns an exclusive reference to the value named by `handle`, or `None` if the handle is
    /// absent or stale.
    #[must_use]
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Releases the value named by `handle`.
    ///
    /// Returns the number of released values: 1 if the handle was live, 0 otherwise. Releasing
    /// an unknown or already-released handle is not an error; idempotent cleanup is expected
    /// from callers. The slot generation is bumped so that the released handle (and any copy of
    /// it) goes stale immediately, even once the slot is reused.
    pub fn release(&mut self, handle: Handle) -> u32 {
        let index = handle.index();
        let Some(slot) = self.slots.get_mut(index) else {
            return 0;
        };
        if slot.generation != handle.generation() || slot.value.is_none() {
            return 0;
        }
        slot.value = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free
            .push(u32::try_from(index).expect("slot index overflow"));
        1
    }

    /// Returns the number of live values in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Returns `true` if the store holds no live values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
