//! Circular slot addressing for the level index.
//!
//! A [`Slot`] can only be built already reduced into `0..capacity`, so the
//! signed-offset arithmetic of the ladder never produces a negative or
//! out-of-range array index.

/// Position in the circular level array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u32);

impl Slot {
    /// Checked construction from a plain index.
    #[inline]
    pub fn new(index: usize, capacity: usize) -> Option<Self> {
        (index < capacity).then_some(Slot(index as u32))
    }

    /// Reduce any signed position into the ring (euclidean modulo).
    #[inline]
    pub fn wrap(position: i64, capacity: usize) -> Self {
        debug_assert!(capacity > 0 && capacity <= u32::MAX as usize);
        Slot(position.rem_euclid(capacity as i64) as u32)
    }

    /// The slot `delta` steps away, wrapping in either direction.
    #[inline]
    pub fn offset(self, delta: i64, capacity: usize) -> Self {
        Self::wrap(self.0 as i64 + delta, capacity)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fixed mapping from tick numbers to slots.
///
/// `origin` is the tick that sits on the middle slot; every other tick
/// lands at its offset from there. The mapping only changes when the
/// book is re-anchored (empty) or rebuilt with a new capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotMap {
    origin: i64,
    capacity: usize,
}

impl SlotMap {
    pub fn new(origin: i64, capacity: usize) -> Self {
        Self { origin, capacity }
    }

    /// Slot that anchors the first order of an empty book.
    #[inline]
    pub fn anchor(&self) -> Slot {
        Slot(self.capacity as u32 / 2)
    }

    #[inline]
    pub fn slot_of(&self, tick: i64) -> Slot {
        self.anchor().offset(tick - self.origin, self.capacity)
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn origin(&self) -> i64 {
        self.origin
    }
}
