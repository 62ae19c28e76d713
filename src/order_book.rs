//! Order Book - one instrument's resting orders and matching.
//!
//! Composes the node pool and the price ladder. Placement runs the
//! cross/rest algorithm:
//! 1. CROSSING: consume opposite levels best-first, FIFO within a level
//! 2. RESTING: append whatever is left to its level's tail
//!
//! Every check that can fail (quantity, tick grid, pool growth, window
//! room) runs before the first fill, so an `Err` means nothing changed.

use std::fmt;

use arrayvec::ArrayVec;

use crate::arena::{NodeHandle, NodePool};
use crate::command::{Order, Price, PriceQty, Side, MAX_ORDER_SIZE};
use crate::config::{BookConfig, TickRules, MAX_INDEX_SIZE};
use crate::error::{BookError, ConfigError};
use crate::ladder::PriceLadder;
use crate::view::{LevelSnapshot, Levels};

/// One execution produced while an incoming order crosses the book.
///
/// `resting_handle` identifies the maker; it is already stale when
/// `resting_remaining` is zero because the node went back to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fill {
    /// Execution price (the resting level's price)
    pub price: Price,
    /// Executed size
    pub qty: u64,
    /// Incoming order as submitted
    pub aggressor: Order,
    /// Aggressor size still unfilled after this execution
    pub aggressor_remaining: u64,
    /// Resting order before this execution
    pub resting: Order,
    /// Resting size left after this execution
    pub resting_remaining: u64,
    pub resting_handle: NodeHandle,
}

impl Fill {
    #[inline]
    pub fn taker_side(&self) -> Side {
        self.aggressor.side()
    }
}

/// Fixed-capacity limit order book for a single instrument.
pub struct OrderBook {
    pool: NodePool,
    ladder: PriceLadder,
    rules: TickRules,
    config: BookConfig,
}

impl OrderBook {
    pub fn new(config: BookConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            pool: NodePool::new(config.slab_size),
            ladder: PriceLadder::new(config.index_size),
            rules: config.rules(),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &BookConfig {
        &self.config
    }

    #[inline]
    pub fn rules(&self) -> &TickRules {
        &self.rules
    }

    #[inline]
    pub fn index_size(&self) -> usize {
        self.ladder.capacity()
    }

    /// Read-only access to the level index.
    #[inline]
    pub fn ladder(&self) -> &PriceLadder {
        &self.ladder
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Best level of `side`: price and aggregate size. O(1).
    #[inline]
    pub fn best(&self, side: Side) -> Option<PriceQty> {
        let tick = self.ladder.best(side)?;
        Some(PriceQty::new(
            self.rules.to_price(tick),
            self.ladder.level(tick).total_qty,
        ))
    }

    #[inline]
    pub fn best_bid(&self) -> Option<PriceQty> {
        self.best(Side::Bid)
    }

    #[inline]
    pub fn best_ask(&self) -> Option<PriceQty> {
        self.best(Side::Ask)
    }

    /// Calculate spread (best_ask - best_bid)
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Place an order, discarding fill notifications.
    #[inline]
    pub fn place(&mut self, order: Order) -> Result<Option<NodeHandle>, BookError> {
        self.place_with(order, |_| {})
    }

    /// Match `order` against the opposite side, then rest the remainder.
    ///
    /// `on_fill` runs once per resting order touched, in execution order.
    /// Returns the handle of the resting remainder, or `None` when the
    /// order filled completely.
    pub fn place_with<F>(&mut self, order: Order, mut on_fill: F) -> Result<Option<NodeHandle>, BookError>
    where
        F: FnMut(&Fill),
    {
        let side = order.side();
        let size = order.size();
        if size == 0 {
            return Err(BookError::ZeroQuantity);
        }
        if size > MAX_ORDER_SIZE {
            return Err(BookError::SizeTooLarge(size));
        }
        let tick = self.rules.to_tick(order.price)?;
        self.pool.reserve()?;
        self.check_room(side, tick, size)?;
        self.check_level_qty(side, tick, size, order.price)?;

        let remaining = self.cross(order, tick, &mut on_fill);
        if remaining == 0 {
            tracing::trace!(price = order.price, %side, size, "order filled on entry");
            self.ladder.rebalance();
            return Ok(None);
        }

        self.ladder
            .make_room(side, tick)
            .map_err(|e| self.price_error(e))?;
        let handle = self.pool.alloc(order.with_size(remaining))?;
        self.ladder.insert(&mut self.pool, side, tick, handle.index());
        self.ladder.rebalance();

        tracing::trace!(price = order.price, %side, remaining, "order resting");
        Ok(Some(handle))
    }

    /// Reject up front an order whose remainder could not rest.
    ///
    /// Only reached when `tick` lies outside the current window. From
    /// there it either crosses the whole opposite side or none of it.
    fn check_room(&self, side: Side, tick: i64, size: u64) -> Result<(), BookError> {
        if self.ladder.fits(tick) {
            return Ok(());
        }
        let opposite = side.opposite();
        let crosses = self
            .ladder
            .best(opposite)
            .is_some_and(|best| self.rules.crosses(side, tick, best));

        let mut sides = ArrayVec::<Side, 2>::new();
        sides.push(side);
        if crosses {
            if self.ladder.side_qty(opposite) >= size {
                return Ok(());
            }
        } else {
            sides.push(opposite);
        }

        let mut extent: Option<(i64, i64)> = None;
        for s in sides {
            for t in [self.ladder.best(s), self.ladder.deepest(s)].into_iter().flatten() {
                extent = Some(match extent {
                    None => (t, t),
                    Some((lo, hi)) => (lo.min(t), hi.max(t)),
                });
            }
        }

        let Some((lo, hi)) = extent else {
            return Ok(());
        };
        let reach = self.ladder.capacity() as i64 - 3;
        if hi.max(tick) - lo.min(tick) > reach {
            return Err(BookError::PriceOutOfRange {
                price: self.rules.to_price(tick),
                low: self.rules.to_price(hi - reach),
                high: self.rules.to_price(lo + reach),
            });
        }
        Ok(())
    }

    /// Reject an order whose rest would overflow the aggregate at `tick`.
    ///
    /// A crossing order only rests once the opposite side is swept through
    /// `tick`, and a tick outside the window lands on a cleared slot; both
    /// start from an empty level.
    fn check_level_qty(&self, side: Side, tick: i64, size: u64, price: Price) -> Result<(), BookError> {
        if !self.ladder.fits(tick) {
            return Ok(());
        }
        let crosses = self
            .ladder
            .best(side.opposite())
            .is_some_and(|best| self.rules.crosses(side, tick, best));
        if !crosses && self.ladder.level(tick).total_qty.checked_add(size).is_none() {
            return Err(BookError::LevelQtyOverflow { price });
        }
        Ok(())
    }

    /// Price-time priority matching. Returns the unfilled size.
    fn cross<F>(&mut self, order: Order, tick: i64, on_fill: &mut F) -> u64
    where
        F: FnMut(&Fill),
    {
        let side = order.side();
        let opposite = side.opposite();
        let mut remaining = order.size();

        while remaining > 0 {
            let Some(best) = self.ladder.best(opposite) else {
                break;
            };
            if !self.rules.crosses(side, tick, best) {
                break;
            }
            let price = self.rules.to_price(best);

            // Walk the level head-first until it or the aggressor runs out
            let emptied = loop {
                let level = self.ladder.level_mut(best);
                let head = level.peek_head();
                let maker = self.pool.get(head).order;
                let resting_handle = self.pool.handle_of(head);

                let qty = remaining.min(maker.size());
                remaining -= qty;
                let resting_remaining = maker.size() - qty;

                let emptied = if resting_remaining == 0 {
                    level.pop_front(&mut self.pool);
                    self.pool.release(head);
                    level.is_empty()
                } else {
                    self.pool.get_mut(head).order = maker.with_size(resting_remaining);
                    level.subtract_qty(qty);
                    false
                };

                on_fill(&Fill {
                    price,
                    qty,
                    aggressor: order,
                    aggressor_remaining: remaining,
                    resting: maker,
                    resting_remaining,
                    resting_handle,
                });

                if emptied || remaining == 0 {
                    break emptied;
                }
            };

            if emptied {
                self.ladder.level_emptied(opposite, best);
            }
        }
        remaining
    }

    /// Remove a resting order. Fails without side effects on a stale or
    /// foreign handle (e.g. a second cancel of the same order).
    pub fn cancel(&mut self, handle: NodeHandle) -> Result<Order, BookError> {
        let index = self.pool.resolve(handle)?;
        let order = self.pool.get(index).order;
        let tick = self.tick_of(order.price);

        self.ladder.remove(&mut self.pool, order.side(), tick, index);
        self.pool.release(index);
        self.ladder.rebalance();

        tracing::trace!(price = order.price, side = %order.side(), size = order.size(), "order canceled");
        Ok(order)
    }

    /// Apply an externally reported execution of `qty` to a resting
    /// order. Returns the size left; at zero the order is removed.
    pub fn reduce(&mut self, handle: NodeHandle, qty: u64) -> Result<u64, BookError> {
        if qty == 0 {
            return Err(BookError::ZeroQuantity);
        }
        let index = self.pool.resolve(handle)?;
        let order = self.pool.get(index).order;
        if qty >= order.size() {
            self.cancel(handle)?;
            return Ok(0);
        }

        let remaining = order.size() - qty;
        self.pool.get_mut(index).order = order.with_size(remaining);
        let tick = self.tick_of(order.price);
        self.ladder.level_mut(tick).subtract_qty(qty);
        Ok(remaining)
    }

    /// Look up a resting order.
    pub fn get(&self, handle: NodeHandle) -> Result<Order, BookError> {
        let index = self.pool.resolve(handle)?;
        Ok(self.pool.get(index).order)
    }

    /// Whether `handle` still refers to a resting order.
    #[inline]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.pool.resolve(handle).is_ok()
    }

    // ========================================================================
    // Capacity
    // ========================================================================

    /// Rebuild the level index with `index_size` slots. Handles stay
    /// valid. Sizes not above the current one are a no-op.
    pub fn widen(&mut self, index_size: usize) -> Result<(), BookError> {
        if index_size > MAX_INDEX_SIZE {
            return Err(BookError::CapacityTooLarge(index_size));
        }
        if index_size <= self.ladder.capacity() {
            return Ok(());
        }
        self.ladder.widen(index_size)?;
        self.config.index_size = index_size;
        Ok(())
    }

    /// Grow the pool to hold `nodes` orders without further allocation.
    pub fn preallocate(&mut self, nodes: usize) -> Result<(), BookError> {
        self.pool.preallocate(nodes)
    }

    /// Drop every resting order. All outstanding handles become stale.
    pub fn clear(&mut self) {
        self.pool.release_all();
        self.ladder.reset();
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Non-empty levels of `side`, best first.
    ///
    /// The borrow keeps the book immutable while the iterator lives.
    #[inline]
    pub fn levels(&self, side: Side) -> Levels<'_> {
        Levels::new(&self.ladder, &self.pool, &self.rules, side)
    }

    /// Top `N` levels of `side` without touching the heap.
    pub fn depth<const N: usize>(&self, side: Side) -> ArrayVec<LevelSnapshot, N> {
        self.levels(side).take(N).map(|level| level.snapshot()).collect()
    }

    /// Aggregate size resting at `price` on `side` (0 when empty).
    pub fn qty_at(&self, side: Side, price: Price) -> u64 {
        let Ok(tick) = self.rules.to_tick(price) else {
            return 0;
        };
        self.levels(side)
            .find(|level| level.tick() == tick)
            .map_or(0, |level| level.qty())
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    /// Number of resting orders
    #[inline]
    pub fn order_count(&self) -> usize {
        self.pool.allocated()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order_count() == 0
    }

    /// Free nodes currently pooled.
    #[inline]
    pub fn pool_free(&self) -> usize {
        self.pool.free_len()
    }

    #[inline]
    pub fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Tick of a price already known to be on the grid.
    #[inline]
    fn tick_of(&self, price: Price) -> i64 {
        price.div_euclid(self.rules.tick_size())
    }

    /// The ladder reports window errors in ticks.
    fn price_error(&self, err: BookError) -> BookError {
        match err {
            BookError::PriceOutOfRange { price, low, high } => BookError::PriceOutOfRange {
                price: self.rules.to_price(price),
                low: self.rules.to_price(low),
                high: self.rules.to_price(high),
            },
            other => other,
        }
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self {
            pool: NodePool::new(BookConfig::default().slab_size),
            ladder: PriceLadder::new(BookConfig::default().index_size),
            rules: BookConfig::default().rules(),
            config: BookConfig::default(),
        }
    }
}

impl fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBook")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("order_count", &self.order_count())
            .field("ladder", &self.ladder)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_TICK;

    fn book() -> OrderBook {
        OrderBook::default()
    }

    fn fills_of(book: &mut OrderBook, order: Order) -> (Option<NodeHandle>, Vec<Fill>) {
        let mut fills = Vec::new();
        let handle = book.place_with(order, |f| fills.push(*f)).unwrap();
        (handle, fills)
    }

    #[test]
    fn test_empty_book() {
        let book = book();
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.spread(), None);
    }

    #[test]
    fn test_best_price_updates() {
        let mut book = book();

        book.place(Order::buy(100, 1)).unwrap();
        book.place(Order::buy(105, 1)).unwrap();
        book.place(Order::buy(95, 1)).unwrap();
        assert_eq!(book.best_bid(), Some(PriceQty::new(105, 1)));

        book.place(Order::sell(110, 1)).unwrap();
        book.place(Order::sell(108, 2)).unwrap();
        assert_eq!(book.best_ask(), Some(PriceQty::new(108, 2)));
        assert_eq!(book.spread(), Some(3));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut book = book();
        assert_eq!(book.place(Order::buy(100, 0)), Err(BookError::ZeroQuantity));
        assert!(book.is_empty());
    }

    #[test]
    fn test_off_tick_price_rejected() {
        let mut book = OrderBook::new(BookConfig::default().with_tick_size(5)).unwrap();
        assert_eq!(
            book.place(Order::buy(101, 1)),
            Err(BookError::PriceNotOnTick { price: 101, tick_size: 5 })
        );
        assert!(book.place(Order::buy(100, 1)).unwrap().is_some());
        assert_eq!(book.best_bid(), Some(PriceQty::new(100, 1)));
    }

    #[test]
    fn test_cancel_recalculates_best() {
        let mut book = book();
        let h1 = book.place(Order::buy(105, 1)).unwrap().unwrap();
        let h2 = book.place(Order::buy(100, 1)).unwrap().unwrap();
        book.place(Order::buy(95, 1)).unwrap();

        book.cancel(h1).unwrap();
        assert_eq!(book.best_bid().map(|b| b.price), Some(100));
        book.cancel(h2).unwrap();
        assert_eq!(book.best_bid().map(|b| b.price), Some(95));
    }

    #[test]
    fn test_double_cancel_is_reported() {
        let mut book = book();
        let h = book.place(Order::sell(100, 5)).unwrap().unwrap();

        assert_eq!(book.cancel(h), Ok(Order::sell(100, 5)));
        let free = book.pool_free();
        assert_eq!(book.cancel(h), Err(BookError::InvalidHandle));
        assert_eq!(book.pool_free(), free);
    }

    #[test]
    fn test_full_match() {
        let mut book = book();
        book.place(Order::sell(100, 10)).unwrap();

        let (handle, fills) = fills_of(&mut book, Order::buy(100, 10));
        assert!(handle.is_none());
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, 100);
        assert_eq!(fills[0].qty, 10);
        assert_eq!(fills[0].resting_remaining, 0);
        assert_eq!(fills[0].taker_side(), Side::Bid);
        assert!(book.is_empty());
    }

    #[test]
    fn test_partial_match_maker_remains() {
        let mut book = book();
        let maker = book.place(Order::sell(100, 10)).unwrap().unwrap();

        let (handle, fills) = fills_of(&mut book, Order::buy(101, 3));
        assert!(handle.is_none());
        assert_eq!(fills[0].resting_remaining, 7);
        assert_eq!(book.get(maker), Ok(Order::sell(100, 7)));
        assert_eq!(book.best_ask(), Some(PriceQty::new(100, 7)));
    }

    #[test]
    fn test_match_multiple_levels_then_rest() {
        let mut book = book();
        book.place(Order::sell(100, 5)).unwrap();
        book.place(Order::sell(101, 5)).unwrap();
        book.place(Order::sell(103, 5)).unwrap();

        let (handle, fills) = fills_of(&mut book, Order::buy(102, 12));
        let prices: Vec<_> = fills.iter().map(|f| (f.price, f.qty)).collect();
        assert_eq!(prices, vec![(100, 5), (101, 5)]);
        assert!(handle.is_some());
        assert_eq!(book.best_bid(), Some(PriceQty::new(102, 2)));
        assert_eq!(book.best_ask(), Some(PriceQty::new(103, 5)));
    }

    #[test]
    fn test_reduce() {
        let mut book = book();
        let h = book.place(Order::buy(100, 10)).unwrap().unwrap();

        assert_eq!(book.reduce(h, 4), Ok(6));
        assert_eq!(book.best_bid(), Some(PriceQty::new(100, 6)));
        assert_eq!(book.reduce(h, 6), Ok(0));
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.reduce(h, 1), Err(BookError::InvalidHandle));
    }

    #[test]
    fn test_out_of_range_leaves_book_untouched() {
        let mut book = OrderBook::new(BookConfig::default().with_index_size(16)).unwrap();
        book.place(Order::buy(100, 1)).unwrap();
        book.place(Order::sell(105, 1)).unwrap();

        let err = book.place(Order::sell(200, 1)).unwrap_err();
        assert!(matches!(err, BookError::PriceOutOfRange { price: 200, .. }));
        assert_eq!(book.order_count(), 2);
        assert_eq!(book.best_ask(), Some(PriceQty::new(105, 1)));
    }

    #[test]
    fn test_oversized_order_rejected() {
        let mut book = book();
        book.place(Order::sell(100, 5)).unwrap();
        let free = book.pool_free();

        // i64::MIN has no positive counterpart
        let err = book.place(Order { price: 100, qty: i64::MIN }).unwrap_err();
        assert_eq!(err, BookError::SizeTooLarge(MAX_ORDER_SIZE + 1));
        assert_eq!(book.order_count(), 1);
        assert_eq!(book.pool_free(), free);
        assert_eq!(book.best_ask(), Some(PriceQty::new(100, 5)));
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn test_extreme_price_rejected() {
        let mut book = book();
        assert!(matches!(
            book.place(Order::buy(i64::MAX - 5, 1)),
            Err(BookError::PriceOutOfRange { .. })
        ));
        assert!(book.is_empty());

        book.place(Order::sell(100, 1)).unwrap();
        assert!(matches!(
            book.place(Order::sell(i64::MIN, 1)),
            Err(BookError::PriceOutOfRange { .. })
        ));
        assert_eq!(book.order_count(), 1);
        assert_eq!(book.best_ask(), Some(PriceQty::new(100, 1)));

        // the edge of the tick range still anchors an empty book
        let mut edge = OrderBook::default();
        let h = edge.place(Order::buy(MAX_TICK, 2)).unwrap().unwrap();
        assert_eq!(edge.best_bid(), Some(PriceQty::new(MAX_TICK, 2)));
        edge.cancel(h).unwrap();
        assert!(edge.is_empty());
    }

    #[test]
    fn test_level_aggregate_overflow_rejected() {
        let mut book = book();
        book.place(Order::buy(100, MAX_ORDER_SIZE)).unwrap();
        book.place(Order::buy(100, MAX_ORDER_SIZE)).unwrap();
        let best = book.best_bid();
        assert_eq!(best, Some(PriceQty::new(100, 2 * MAX_ORDER_SIZE)));

        let err = book.place(Order::buy(100, MAX_ORDER_SIZE)).unwrap_err();
        assert_eq!(err, BookError::LevelQtyOverflow { price: 100 });
        assert_eq!(book.best_bid(), best);
        assert_eq!(book.order_count(), 2);

        // a neighbouring level has its own aggregate
        book.place(Order::buy(99, MAX_ORDER_SIZE)).unwrap();
        assert_eq!(book.qty_at(Side::Bid, 99), MAX_ORDER_SIZE);

        // a crossing sell sweeps against it without touching the aggregate check
        let (handle, fills) = fills_of(&mut book, Order::sell(100, 3));
        assert!(handle.is_none());
        assert_eq!(fills.len(), 1);
        assert_eq!(book.qty_at(Side::Bid, 100), 2 * MAX_ORDER_SIZE - 3);
    }

    #[test]
    fn test_crossing_far_order_that_fills_is_accepted() {
        let mut book = OrderBook::new(BookConfig::default().with_index_size(16)).unwrap();
        book.place(Order::sell(100, 5)).unwrap();

        // far above the window, but the remainder never has to rest
        let (handle, fills) = fills_of(&mut book, Order::buy(1_000, 5));
        assert!(handle.is_none());
        assert_eq!(fills.len(), 1);
        assert!(book.is_empty());
    }

    #[test]
    fn test_widen_keeps_handles() {
        let mut book = OrderBook::new(BookConfig::default().with_index_size(8)).unwrap();
        let h = book.place(Order::buy(100, 3)).unwrap().unwrap();
        assert!(book.place(Order::buy(90, 1)).is_err());

        book.widen(64).unwrap();
        assert_eq!(book.index_size(), 64);
        book.place(Order::buy(90, 1)).unwrap();
        assert_eq!(book.cancel(h), Ok(Order::buy(100, 3)));
        assert_eq!(book.best_bid(), Some(PriceQty::new(90, 1)));
    }

    #[test]
    fn test_clear() {
        let mut book = book();
        let h = book.place(Order::buy(100, 3)).unwrap().unwrap();
        book.place(Order::sell(101, 3)).unwrap();

        book.clear();
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.cancel(h), Err(BookError::InvalidHandle));
        book.place(Order::sell(5_000, 1)).unwrap();
        assert_eq!(book.best_ask(), Some(PriceQty::new(5_000, 1)));
    }
}
