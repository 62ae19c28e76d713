//! Book View - read-only traversal of non-empty levels.
//!
//! [`Levels`] walks one side slot by slot from the best level toward that
//! side's outlier, skipping empty slots. Consecutive levels need not be
//! price-adjacent. The iterator borrows the book, so the book cannot be
//! mutated while a view is alive.

use std::fmt;

use crate::arena::NodePool;
use crate::command::{Order, Price, Side};
use crate::config::TickRules;
use crate::ladder::PriceLadder;
use crate::order_book::OrderBook;
use crate::price_level::PriceLevel;

/// Owned copy of one level's aggregate state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LevelSnapshot {
    pub price: Price,
    pub qty: u64,
    pub orders: u32,
}

/// Borrowed view of one non-empty level.
#[derive(Clone, Copy)]
pub struct LevelView<'a> {
    tick: i64,
    price: Price,
    side: Side,
    level: &'a PriceLevel,
    pool: &'a NodePool,
}

impl<'a> LevelView<'a> {
    #[inline]
    pub fn price(&self) -> Price {
        self.price
    }

    #[inline]
    pub fn tick(&self) -> i64 {
        self.tick
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Aggregate resting size
    #[inline]
    pub fn qty(&self) -> u64 {
        self.level.total_qty
    }

    #[inline]
    pub fn order_count(&self) -> u32 {
        self.level.count
    }

    /// Resident orders in time priority.
    pub fn orders(&self) -> impl Iterator<Item = Order> + 'a {
        let pool = self.pool;
        self.level.indices(pool).map(move |index| pool.get(index).order)
    }

    #[inline]
    pub fn snapshot(&self) -> LevelSnapshot {
        LevelSnapshot {
            price: self.price,
            qty: self.level.total_qty,
            orders: self.level.count,
        }
    }
}

impl fmt::Debug for LevelView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelView")
            .field("side", &self.side)
            .field("price", &self.price)
            .field("qty", &self.qty())
            .field("orders", &self.order_count())
            .finish()
    }
}

/// Forward-only cursor over one side's non-empty levels.
pub struct Levels<'a> {
    ladder: &'a PriceLadder,
    pool: &'a NodePool,
    rules: &'a TickRules,
    side: Side,
    cursor: i64,
    /// Outlier tick; never yielded
    end: i64,
}

impl<'a> Levels<'a> {
    pub(crate) fn new(
        ladder: &'a PriceLadder,
        pool: &'a NodePool,
        rules: &'a TickRules,
        side: Side,
    ) -> Self {
        let (cursor, end) = match (ladder.best(side), ladder.outlier(side)) {
            (Some(best), Some(outlier)) => (best, outlier),
            _ => (0, 0),
        };
        Self { ladder, pool, rules, side, cursor, end }
    }
}

impl<'a> Iterator for Levels<'a> {
    type Item = LevelView<'a>;

    fn next(&mut self) -> Option<LevelView<'a>> {
        let step = match self.side {
            Side::Bid => -1,
            Side::Ask => 1,
        };
        while self.cursor != self.end {
            let tick = self.cursor;
            self.cursor += step;

            let level = self.ladder.level(tick);
            if !level.is_empty() {
                return Some(LevelView {
                    tick,
                    price: self.rules.to_price(tick),
                    side: self.side,
                    level,
                    pool: self.pool,
                });
            }
        }
        None
    }
}

impl fmt::Display for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>5} {:>14} {:>14} {:>7}", "side", "price", "qty", "orders")?;
        let asks: Vec<_> = self.levels(Side::Ask).collect();
        for level in asks.iter().rev() {
            writeln!(f, "{:>5} {:>14} {:>14} {:>7}", "ask", level.price(), level.qty(), level.order_count())?;
        }
        writeln!(f, "{:-<43}", "")?;
        for level in self.levels(Side::Bid) {
            writeln!(f, "{:>5} {:>14} {:>14} {:>7}", "bid", level.price(), level.qty(), level.order_count())?;
        }
        Ok(())
    }
}
