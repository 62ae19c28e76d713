//! Node Pool - O(1) slab allocator for resting order nodes.
//!
//! Nodes live in one contiguous vector that grows a slab at a time, only
//! when the free list runs dry. Steady-state trading recycles nodes
//! through the free list and never touches the general allocator.
//!
//! Callers outside the book hold [`NodeHandle`]s, not raw indices. A
//! handle carries the pool id and the slot's generation, so a handle that
//! outlived its node (double cancel) or came from another book is
//! reported instead of silently aliasing a recycled node.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::command::Order;
use crate::error::BookError;

/// Sentinel value representing a null/invalid index (like nullptr)
pub const NULL_INDEX: u32 = u32::MAX;

/// Index of a node inside the pool - our "compressed pointer".
/// Only used for the intrusive level links; never handed out.
pub type ArenaIndex = u32;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Stable reference to a resting order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    pool: u32,
    index: ArenaIndex,
    generation: u32,
}

impl NodeHandle {
    #[inline]
    pub fn index(&self) -> ArenaIndex {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// A resting order plus its FIFO links - 32 bytes, two per cache line.
///
/// # Memory Layout
///
/// | Field      | Type  | Offset | Size |
/// |------------|-------|--------|------|
/// | order      | Order | 0      | 16   |
/// | next       | u32   | 16     | 4    |
/// | prev       | u32   | 20     | 4    |
/// | generation | u32   | 24     | 4    |
/// | live       | bool  | 28     | 1    |
/// | (padding)  | -     | 29     | 3    |
#[repr(C)]
#[repr(align(32))]
#[derive(Clone, Copy)]
pub struct OrderNode {
    /// Price and signed remaining quantity
    pub order: Order,

    /// Index of next order at same price level (free list link when dead)
    pub next: ArenaIndex,

    /// Index of previous order (enables O(1) cancel)
    pub prev: ArenaIndex,

    generation: u32,
    live: bool,
}

const _: () = assert!(
    std::mem::size_of::<OrderNode>() == 32,
    "OrderNode must be exactly 32 bytes"
);

impl OrderNode {
    const fn vacant(next: ArenaIndex) -> Self {
        Self {
            order: Order { price: 0, qty: 0 },
            next,
            prev: NULL_INDEX,
            generation: 0,
            live: false,
        }
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.live
    }
}

impl fmt::Debug for OrderNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderNode")
            .field("price", &self.order.price)
            .field("qty", &self.order.qty)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .field("generation", &self.generation)
            .field("live", &self.live)
            .finish()
    }
}

/// Growable node pool with O(1) allocation and deallocation.
///
/// Uses a free list threaded through the `next` field of unused nodes.
pub struct NodePool {
    id: u32,
    nodes: Vec<OrderNode>,
    /// Head of the free list (index of first available node)
    free_head: ArenaIndex,
    free_count: usize,
    slab_size: usize,
    slabs: usize,
}

impl NodePool {
    /// Create a pool holding one slab of `slab_size` nodes.
    ///
    /// # Panics
    /// Panics if `slab_size` is zero or exceeds the index range.
    pub fn new(slab_size: usize) -> Self {
        assert!(slab_size > 0, "slab size must be positive");
        assert!(slab_size < NULL_INDEX as usize, "slab size exceeds index range");

        let mut pool = Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::with_capacity(slab_size),
            free_head: NULL_INDEX,
            free_count: 0,
            slab_size,
            slabs: 0,
        };
        pool.link_slab();
        pool
    }

    /// Append one slab and thread it onto the free list.
    fn grow(&mut self) -> Result<(), BookError> {
        if self.nodes.len() + self.slab_size >= NULL_INDEX as usize {
            return Err(BookError::AllocationFailed);
        }
        self.nodes
            .try_reserve_exact(self.slab_size)
            .map_err(|_| BookError::AllocationFailed)?;
        self.link_slab();
        tracing::debug!(
            pool = self.id,
            slabs = self.slabs,
            capacity = self.nodes.len(),
            "node pool grew"
        );
        Ok(())
    }

    fn link_slab(&mut self) {
        let start = self.nodes.len() as ArenaIndex;
        let end = start + self.slab_size as ArenaIndex;
        for i in start..end {
            let next = if i + 1 == end { self.free_head } else { i + 1 };
            self.nodes.push(OrderNode::vacant(next));
        }
        self.free_head = start;
        self.free_count += self.slab_size;
        self.slabs += 1;
    }

    /// Make sure the next `alloc` cannot fail.
    ///
    /// The book calls this before mutating anything so an allocation
    /// failure never leaves a half-applied operation behind.
    #[inline]
    pub fn reserve(&mut self) -> Result<(), BookError> {
        if self.free_head == NULL_INDEX {
            self.grow()?;
        }
        Ok(())
    }

    /// Grow until at least `nodes` nodes exist (warm-up).
    pub fn preallocate(&mut self, nodes: usize) -> Result<(), BookError> {
        while self.nodes.len() < nodes {
            self.grow()?;
        }
        Ok(())
    }

    /// Take a node from the free list and store `order` in it.
    ///
    /// # Complexity
    /// O(1) - pops from head of free list (amortized when a slab is added)
    #[inline]
    pub fn alloc(&mut self, order: Order) -> Result<NodeHandle, BookError> {
        self.reserve()?;

        let index = self.free_head;
        let node = &mut self.nodes[index as usize];
        self.free_head = node.next;
        self.free_count -= 1;

        node.order = order;
        node.next = NULL_INDEX;
        node.prev = NULL_INDEX;
        node.live = true;

        Ok(NodeHandle {
            pool: self.id,
            index,
            generation: node.generation,
        })
    }

    /// Return a node to the free list.
    ///
    /// The caller must already have unlinked it from its level. Bumping
    /// the generation invalidates every outstanding copy of `handle`.
    #[inline]
    pub fn dealloc(&mut self, handle: NodeHandle) -> Result<Order, BookError> {
        let index = self.resolve(handle)?;
        Ok(self.release(index))
    }

    /// Free by raw index. Used by the book for nodes it just unlinked.
    #[inline]
    pub(crate) fn release(&mut self, index: ArenaIndex) -> Order {
        let free_head = self.free_head;
        let node = &mut self.nodes[index as usize];
        debug_assert!(node.live, "double free of node {}", index);

        let order = node.order;
        node.live = false;
        node.generation = node.generation.wrapping_add(1);
        node.prev = NULL_INDEX;
        node.next = free_head;

        self.free_head = index;
        self.free_count += 1;
        order
    }

    /// Free every live node, invalidating all handles.
    pub fn release_all(&mut self) {
        for index in 0..self.nodes.len() as ArenaIndex {
            if self.nodes[index as usize].live {
                self.release(index);
            }
        }
    }

    /// Map a handle to its node index, rejecting stale or foreign handles.
    #[inline]
    pub fn resolve(&self, handle: NodeHandle) -> Result<ArenaIndex, BookError> {
        if handle.pool != self.id {
            return Err(BookError::InvalidHandle);
        }
        match self.nodes.get(handle.index as usize) {
            Some(node) if node.live && node.generation == handle.generation => Ok(handle.index),
            _ => Err(BookError::InvalidHandle),
        }
    }

    /// Current handle for a live node.
    #[inline]
    pub(crate) fn handle_of(&self, index: ArenaIndex) -> NodeHandle {
        NodeHandle {
            pool: self.id,
            index,
            generation: self.nodes[index as usize].generation,
        }
    }

    #[inline]
    pub fn get(&self, index: ArenaIndex) -> &OrderNode {
        debug_assert!((index as usize) < self.nodes.len(), "Index out of bounds");
        &self.nodes[index as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, index: ArenaIndex) -> &mut OrderNode {
        debug_assert!((index as usize) < self.nodes.len(), "Index out of bounds");
        &mut self.nodes[index as usize]
    }

    /// Number of nodes on the free list.
    #[inline]
    pub fn free_len(&self) -> usize {
        self.free_count
    }

    /// Number of nodes currently holding orders.
    #[inline]
    pub fn allocated(&self) -> usize {
        self.nodes.len() - self.free_count
    }

    /// Total nodes across all slabs.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn slabs(&self) -> usize {
        self.slabs
    }

    #[inline]
    pub fn slab_size(&self) -> usize {
        self.slab_size
    }
}

impl fmt::Debug for NodePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("id", &self.id)
            .field("capacity", &self.nodes.len())
            .field("free", &self.free_count)
            .field("slabs", &self.slabs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_node_size() {
        assert_eq!(std::mem::size_of::<OrderNode>(), 32);
        assert_eq!(std::mem::align_of::<OrderNode>(), 32);
    }

    #[test]
    fn test_pool_creation() {
        let pool = NodePool::new(100);
        assert_eq!(pool.capacity(), 100);
        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.free_len(), 100);
        assert_eq!(pool.slabs(), 1);
    }

    #[test]
    fn test_alloc_dealloc_reuses_slot() {
        let mut pool = NodePool::new(3);

        let h0 = pool.alloc(Order::buy(100, 1)).unwrap();
        let h1 = pool.alloc(Order::buy(101, 1)).unwrap();
        let h2 = pool.alloc(Order::buy(102, 1)).unwrap();
        assert_eq!(pool.free_len(), 0);

        assert_eq!(pool.dealloc(h1), Ok(Order::buy(101, 1)));
        let h3 = pool.alloc(Order::sell(200, 5)).unwrap();
        assert_eq!(h3.index(), h1.index(), "Should reuse freed slot");
        assert_ne!(h3, h1, "Reused slot must carry a new generation");

        pool.dealloc(h0).unwrap();
        pool.dealloc(h2).unwrap();
        pool.dealloc(h3).unwrap();
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn test_grows_by_slab_when_exhausted() {
        let mut pool = NodePool::new(2);
        let handles: Vec<_> = (0..5).map(|i| pool.alloc(Order::buy(i, 1)).unwrap()).collect();

        assert_eq!(pool.slabs(), 3);
        assert_eq!(pool.capacity(), 6);
        assert_eq!(pool.free_len(), 1);

        for h in handles {
            pool.dealloc(h).unwrap();
        }
        assert_eq!(pool.free_len(), 6);
    }

    #[test]
    fn test_double_free_detected() {
        let mut pool = NodePool::new(4);
        let h = pool.alloc(Order::buy(100, 1)).unwrap();
        pool.dealloc(h).unwrap();

        assert_eq!(pool.dealloc(h), Err(BookError::InvalidHandle));
        assert_eq!(pool.free_len(), 4);
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        let mut pool = NodePool::new(1);
        let old = pool.alloc(Order::buy(100, 1)).unwrap();
        pool.dealloc(old).unwrap();
        let new = pool.alloc(Order::buy(100, 2)).unwrap();

        assert_eq!(pool.resolve(old), Err(BookError::InvalidHandle));
        assert_eq!(pool.resolve(new), Ok(new.index()));
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut a = NodePool::new(4);
        let mut b = NodePool::new(4);
        let ha = a.alloc(Order::buy(1, 1)).unwrap();
        b.alloc(Order::buy(1, 1)).unwrap();

        assert_eq!(b.resolve(ha), Err(BookError::InvalidHandle));
        assert_eq!(b.dealloc(ha), Err(BookError::InvalidHandle));
    }

    #[test]
    fn test_release_all() {
        let mut pool = NodePool::new(8);
        let h = pool.alloc(Order::sell(10, 1)).unwrap();
        pool.alloc(Order::sell(11, 1)).unwrap();

        pool.release_all();
        assert_eq!(pool.free_len(), 8);
        assert_eq!(pool.resolve(h), Err(BookError::InvalidHandle));
    }

    #[test]
    fn test_preallocate() {
        let mut pool = NodePool::new(10);
        pool.preallocate(35).unwrap();
        assert_eq!(pool.capacity(), 40);
        assert_eq!(pool.slabs(), 4);
    }
}
