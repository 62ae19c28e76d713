//! Price Ladder - the circular index of price levels.
//!
//! A fixed array of `capacity` levels covers a window of consecutive
//! ticks. Tick `t` always lives in slot `anchor + (t - origin)` modulo the
//! capacity, so a level's price is implied by its position and moving the
//! window never moves an order.
//!
//! ```text
//!   bottom                boundary                 top
//!     |  buy space  ...  best_bid | best_ask  ...  sell space  |
//!   outlier                                                 outlier
//! ```
//!
//! The two ends of the window are outlier sentinels that never hold
//! orders. Buy space runs from just above `bottom` up to `boundary - 1`,
//! sell space from `boundary` up to just below `top`. After each mutation
//! the window is slid one tick at a time until both sides have the same
//! room (within one tick) between their best level and their outlier.

use crate::arena::{ArenaIndex, NodePool};
use crate::command::Side;
use crate::error::BookError;
use crate::price_level::PriceLevel;
use crate::slot::SlotMap;

/// Placement of the window over the tick axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Window {
    /// Buy-side outlier tick (lowest tick of the window)
    bottom: i64,
    /// First tick of sell space
    boundary: i64,
}

/// Circular array of levels plus per-side best pointers.
pub struct PriceLadder {
    levels: Box<[PriceLevel]>,
    map: SlotMap,
    /// `None` while the book is empty; the next order re-anchors.
    window: Option<Window>,
    best: [Option<i64>; 2],
}

impl PriceLadder {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= crate::config::MIN_INDEX_SIZE);
        Self {
            levels: vec![PriceLevel::new(); capacity].into_boxed_slice(),
            map: SlotMap::new(0, capacity),
            window: None,
            best: [None, None],
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    fn span(&self) -> i64 {
        self.levels.len() as i64
    }

    /// Usable ticks are strictly between the outliers.
    #[inline]
    fn usable(&self) -> i64 {
        self.span() - 2
    }

    #[inline]
    fn top(&self, window: Window) -> i64 {
        window.bottom + self.span() - 1
    }

    // ========================================================================
    // Level Access
    // ========================================================================

    #[inline]
    pub fn level(&self, tick: i64) -> &PriceLevel {
        &self.levels[self.map.slot_of(tick).index()]
    }

    #[inline]
    pub fn level_mut(&mut self, tick: i64) -> &mut PriceLevel {
        &mut self.levels[self.map.slot_of(tick).index()]
    }

    #[inline]
    fn occupied(&self, tick: i64) -> bool {
        !self.level(tick).is_empty()
    }

    /// Most aggressive non-empty tick on `side`.
    #[inline]
    pub fn best(&self, side: Side) -> Option<i64> {
        self.best[side.index()]
    }

    /// Outlier tick of `side`, `None` while unanchored.
    #[inline]
    pub fn outlier(&self, side: Side) -> Option<i64> {
        let window = self.window?;
        Some(match side {
            Side::Bid => window.bottom,
            Side::Ask => self.top(window),
        })
    }

    /// First tick of sell space, `None` while unanchored.
    #[inline]
    pub fn boundary(&self) -> Option<i64> {
        self.window.map(|w| w.boundary)
    }

    /// Lowest and highest tick an order may currently rest at.
    pub fn window(&self) -> Option<(i64, i64)> {
        self.window.map(|w| (w.bottom + 1, self.top(w) - 1))
    }

    /// Distance from `side`'s best (or the boundary, if the side is
    /// empty) to its outlier.
    pub fn room(&self, side: Side) -> Option<i64> {
        let window = self.window?;
        Some(match side {
            Side::Bid => self.effective_best(window, Side::Bid) - window.bottom,
            Side::Ask => self.top(window) - self.effective_best(window, Side::Ask),
        })
    }

    #[inline]
    fn effective_best(&self, window: Window, side: Side) -> i64 {
        match side {
            Side::Bid => self.best[0].unwrap_or(window.boundary - 1),
            Side::Ask => self.best[1].unwrap_or(window.boundary),
        }
    }

    /// True when `tick` can rest without moving the window.
    #[inline]
    pub fn fits(&self, tick: i64) -> bool {
        match self.window {
            None => true,
            Some(w) => tick > w.bottom && tick < self.top(w),
        }
    }

    /// Least aggressive non-empty tick on `side` (scan from the outlier).
    pub fn deepest(&self, side: Side) -> Option<i64> {
        let best = self.best(side)?;
        let window = self.window?;
        let found = match side {
            Side::Bid => (window.bottom + 1..=best).find(|&t| self.occupied(t)),
            Side::Ask => (best..self.top(window)).rev().find(|&t| self.occupied(t)),
        };
        debug_assert!(found.is_some());
        found
    }

    /// Next non-empty tick strictly beyond `tick`, moving away from the
    /// inside of the book toward `side`'s outlier.
    pub fn next_outward(&self, side: Side, tick: i64) -> Option<i64> {
        let outlier = self.outlier(side)?;
        match side {
            Side::Bid => (outlier + 1..tick).rev().find(|&t| self.occupied(t)),
            Side::Ask => (tick + 1..outlier).find(|&t| self.occupied(t)),
        }
    }

    /// Total resting quantity on `side`, saturating at `u64::MAX`.
    pub fn side_qty(&self, side: Side) -> u64 {
        let mut total = 0;
        let mut cursor = self.best(side);
        while let Some(tick) = cursor {
            total = self.level(tick).total_qty.saturating_add(total);
            cursor = self.next_outward(side, tick);
        }
        total
    }

    /// Lowest and highest resident ticks across both sides.
    pub fn extent(&self) -> Option<(i64, i64)> {
        let lo = self.deepest(Side::Bid).or(self.best(Side::Ask))?;
        let hi = self.deepest(Side::Ask).or(self.best(Side::Bid))?;
        Some((lo, hi))
    }

    // ========================================================================
    // Window Management
    // ========================================================================

    /// Position the window so `side` can rest at `tick`.
    ///
    /// Must be called with no opposite order crossing `tick`.
    pub fn make_room(&mut self, side: Side, tick: i64) -> Result<(), BookError> {
        let Some(window) = self.window else {
            self.anchor(side, tick);
            return Ok(());
        };
        if !self.fits(tick) {
            self.relocate(window, tick)?;
        }

        let Some(window) = self.window.as_mut() else {
            return Ok(());
        };
        match side {
            Side::Bid if tick >= window.boundary => window.boundary = tick + 1,
            Side::Ask if tick < window.boundary => window.boundary = tick,
            _ => {}
        }
        Ok(())
    }

    /// First order into an empty book lands on the middle slot.
    fn anchor(&mut self, side: Side, tick: i64) {
        debug_assert!(self.best.iter().all(Option::is_none));
        let half = self.span() / 2;
        self.map = SlotMap::new(tick, self.capacity());
        let boundary = match side {
            Side::Bid => tick + 1,
            Side::Ask => tick,
        };
        self.window = Some(Window { bottom: tick - half, boundary });
        tracing::debug!(tick, %side, slot = self.map.anchor().index(), "ladder anchored");
    }

    /// Jump the window so it covers `tick` together with every resting
    /// order. Slots entering the window are necessarily empty: each slot
    /// holds at most one tick of any window, and every resident tick
    /// stays inside.
    fn relocate(&mut self, window: Window, tick: i64) -> Result<(), BookError> {
        let (lo, hi) = match self.extent() {
            Some((lo, hi)) => (lo.min(tick), hi.max(tick)),
            None => (tick, tick),
        };
        if hi - lo > self.usable() - 1 {
            return Err(self.out_of_range(tick));
        }

        let top = self.top(window);
        let bottom = if tick >= top {
            tick + 2 - self.span()
        } else {
            tick - 1
        };
        let new_top = bottom + self.span() - 1;
        debug_assert!(lo > bottom && hi < new_top);

        let boundary = window.boundary.clamp(bottom + 1, new_top);
        self.window = Some(Window { bottom, boundary });
        tracing::debug!(tick, from = window.bottom, to = bottom, "ladder window relocated");
        Ok(())
    }

    /// Error for a tick that cannot share the window with the residents,
    /// in tick units; the book converts to prices.
    pub fn out_of_range(&self, tick: i64) -> BookError {
        let reach = self.usable() - 1;
        let (low, high) = match self.extent() {
            Some((lo, hi)) => (hi - reach, lo + reach),
            None => (tick, tick),
        };
        BookError::PriceOutOfRange { price: tick, low, high }
    }

    /// Slide the window one tick at a time toward the side with less
    /// room. Stops early rather than relabel a slot that holds orders.
    pub fn rebalance(&mut self) {
        let mut shifted = 0i64;
        while let Some(mut window) = self.window {
            let top = self.top(window);
            let bid_room = self.effective_best(window, Side::Bid) - window.bottom;
            let ask_room = top - self.effective_best(window, Side::Ask);
            let imbalance = bid_room - ask_room;

            if imbalance > 1 {
                // bids have spare room below: slide up
                if self.occupied(window.bottom + 1) {
                    break;
                }
                window.bottom += 1;
                shifted += 1;
            } else if imbalance < -1 {
                // asks have spare room above: slide down
                if self.occupied(top - 1) {
                    break;
                }
                window.bottom -= 1;
                shifted -= 1;
            } else {
                break;
            }
            self.window = Some(window);
        }
        if shifted != 0 {
            tracing::trace!(shifted, "ladder rebalanced");
        }
    }

    /// Rebuild with a larger capacity, keeping the window centred on the
    /// same ticks. Levels move wholesale, so node links and handles are
    /// untouched.
    pub fn widen(&mut self, capacity: usize) -> Result<(), BookError> {
        debug_assert!(capacity > self.capacity());
        let mut levels = Vec::new();
        levels
            .try_reserve_exact(capacity)
            .map_err(|_| BookError::AllocationFailed)?;
        levels.resize(capacity, PriceLevel::new());

        let map = SlotMap::new(self.map.origin(), capacity);
        let window = self.window.map(|w| {
            for tick in w.bottom + 1..self.top(w) {
                let level = self.level(tick);
                if !level.is_empty() {
                    levels[map.slot_of(tick).index()] = *level;
                }
            }
            let extra = (capacity - self.capacity()) as i64;
            Window { bottom: w.bottom - extra / 2, boundary: w.boundary }
        });

        tracing::debug!(from = self.capacity(), to = capacity, "ladder widened");
        self.levels = levels.into_boxed_slice();
        self.map = map;
        self.window = window;
        self.rebalance();
        Ok(())
    }

    /// Forget all levels (the pool is cleared separately).
    pub fn reset(&mut self) {
        self.levels.fill(PriceLevel::new());
        self.window = None;
        self.best = [None, None];
    }

    // ========================================================================
    // Order Linkage
    // ========================================================================

    /// Append a node at `tick` and update the best pointer.
    /// The window must already admit `tick` on `side`.
    pub fn insert(&mut self, pool: &mut NodePool, side: Side, tick: i64, index: ArenaIndex) {
        self.level_mut(tick).push_back(pool, index);

        let better = match (side, self.best[side.index()]) {
            (_, None) => true,
            (Side::Bid, Some(best)) => tick > best,
            (Side::Ask, Some(best)) => tick < best,
        };
        if better {
            self.best[side.index()] = Some(tick);
        }
    }

    /// Unlink a node resting at `tick`.
    pub fn remove(&mut self, pool: &mut NodePool, side: Side, tick: i64, index: ArenaIndex) {
        if self.level_mut(tick).remove(pool, index) {
            self.level_emptied(side, tick);
        }
    }

    /// Bookkeeping after the level at `tick` lost its last order.
    pub fn level_emptied(&mut self, side: Side, tick: i64) {
        if self.best(side) == Some(tick) {
            self.best[side.index()] = self.next_outward(side, tick);
        }
        if self.best.iter().all(Option::is_none) {
            self.window = None;
        }
    }
}

impl std::fmt::Debug for PriceLadder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceLadder")
            .field("capacity", &self.capacity())
            .field("window", &self.window())
            .field("boundary", &self.boundary())
            .field("best_bid", &self.best(Side::Bid))
            .field("best_ask", &self.best(Side::Ask))
            .finish()
    }
}
