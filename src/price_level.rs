//! Price Level - a FIFO queue of orders at a single price tick.
//!
//! Implements a doubly-linked list through the node pool for O(1)
//! append, removal from head, and removal from an arbitrary position.
//! Levels are pre-allocated slots of the ladder; only their contents
//! change.

use crate::arena::{ArenaIndex, NodePool, NULL_INDEX};

/// A queue of orders at one price tick.
///
/// Orders are processed in FIFO order (price-time priority).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceLevel {
    /// Index of the oldest order (highest priority, first to match)
    pub head: ArenaIndex,
    /// Index of the newest order (last to match)
    pub tail: ArenaIndex,
    /// Total quantity across all orders at this level
    pub total_qty: u64,
    /// Number of orders at this level
    pub count: u32,
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceLevel {
    /// Create a new empty price level
    #[inline]
    pub const fn new() -> Self {
        Self {
            head: NULL_INDEX,
            tail: NULL_INDEX,
            total_qty: 0,
            count: 0,
        }
    }

    /// Returns true if there are no orders at this level
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append an order to the tail of the queue (newest order).
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn push_back(&mut self, pool: &mut NodePool, index: ArenaIndex) {
        let qty = pool.get(index).order.size();

        if self.tail == NULL_INDEX {
            debug_assert!(self.head == NULL_INDEX);
            self.head = index;
            self.tail = index;
            let node = pool.get_mut(index);
            node.prev = NULL_INDEX;
            node.next = NULL_INDEX;
        } else {
            pool.get_mut(self.tail).next = index;
            let node = pool.get_mut(index);
            node.prev = self.tail;
            node.next = NULL_INDEX;
            self.tail = index;
        }

        self.count += 1;
        self.total_qty += qty;
    }

    /// Remove and return the head order (oldest/highest priority).
    ///
    /// The node is NOT returned to the pool; caller must do that.
    #[inline]
    pub fn pop_front(&mut self, pool: &mut NodePool) -> Option<ArenaIndex> {
        if self.head == NULL_INDEX {
            return None;
        }
        let index = self.head;
        self.remove(pool, index);
        Some(index)
    }

    /// Unlink an order from anywhere in the queue.
    ///
    /// Returns `true` if the level is now empty. The node is NOT
    /// returned to the pool; caller must do that.
    ///
    /// # Complexity
    /// O(1)
    #[inline]
    pub fn remove(&mut self, pool: &mut NodePool, index: ArenaIndex) -> bool {
        let node = pool.get(index);
        let prev_idx = node.prev;
        let next_idx = node.next;
        let qty = node.order.size();

        if prev_idx == NULL_INDEX {
            debug_assert!(self.head == index);
            self.head = next_idx;
        } else {
            pool.get_mut(prev_idx).next = next_idx;
        }

        if next_idx == NULL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev_idx;
        } else {
            pool.get_mut(next_idx).prev = prev_idx;
        }

        debug_assert!(self.count > 0 && self.total_qty >= qty);
        self.count -= 1;
        self.total_qty -= qty;

        let node = pool.get_mut(index);
        node.prev = NULL_INDEX;
        node.next = NULL_INDEX;

        self.count == 0
    }

    /// Peek at the head order without removing it.
    ///
    /// # Returns
    /// Index of the head order, or `NULL_INDEX` if empty.
    #[inline]
    pub const fn peek_head(&self) -> ArenaIndex {
        self.head
    }

    /// Update total quantity after a partial fill.
    ///
    /// Call this after reducing an order's size in place.
    #[inline]
    pub fn subtract_qty(&mut self, qty: u64) {
        debug_assert!(self.total_qty >= qty);
        self.total_qty -= qty;
    }

    /// Iterate the resident node indices in FIFO order.
    pub fn indices<'a>(&self, pool: &'a NodePool) -> LevelIndices<'a> {
        LevelIndices { pool, next: self.head }
    }
}

/// FIFO walk over a level's resident nodes.
pub struct LevelIndices<'a> {
    pool: &'a NodePool,
    next: ArenaIndex,
}

impl Iterator for LevelIndices<'_> {
    type Item = ArenaIndex;

    fn next(&mut self) -> Option<ArenaIndex> {
        if self.next == NULL_INDEX {
            return None;
        }
        let index = self.next;
        self.next = self.pool.get(index).next;
        Some(index)
    }
}
