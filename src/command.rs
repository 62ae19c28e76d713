//! Order, event and output types for the order book engine.
//!
//! Tick events are the normalized inputs produced by protocol decoders.
//! Output events go to best-price caches, depth exporters and execution
//! reporting.

use std::fmt;

/// Raw integer price (already scaled to fixed point by the decoder).
pub type Price = i64;

/// Signed order quantity: positive = buy, negative = sell.
pub type Qty = i64;

/// Largest size an [`Order`] can carry; the side lives in the sign.
pub const MAX_ORDER_SIZE: u64 = i64::MAX as u64;

/// Order side (bid = buy, ask = sell)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Bid = 0,
    /// Sell side (asks)
    Ask = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Index into per-side arrays
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => f.write_str("bid"),
            Side::Ask => f.write_str("ask"),
        }
    }
}

/// A limit order as seen by the book.
///
/// The side is carried by the sign of `qty`, so an order is just a price
/// and a signed size. [`Order::new`] builds one from an explicit side for
/// callers whose feed carries the side separately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Order {
    pub price: Price,
    pub qty: Qty,
}

impl Order {
    /// Build an order from an explicit side and an unsigned size.
    ///
    /// # Panics
    /// Panics if `size` exceeds [`MAX_ORDER_SIZE`]. Use
    /// [`Order::try_new`] for sizes from untrusted input.
    #[inline]
    pub const fn new(side: Side, price: Price, size: u64) -> Self {
        match Self::try_new(side, price, size) {
            Some(order) => order,
            None => panic!("order size exceeds i64::MAX"),
        }
    }

    /// Checked [`Order::new`]: `None` when `size` does not fit the
    /// signed quantity.
    #[inline]
    pub const fn try_new(side: Side, price: Price, size: u64) -> Option<Self> {
        if size > MAX_ORDER_SIZE {
            return None;
        }
        let size = size as i64;
        let qty = match side {
            Side::Bid => size,
            Side::Ask => -size,
        };
        Some(Self { price, qty })
    }

    #[inline]
    pub const fn buy(price: Price, size: u64) -> Self {
        Self::new(Side::Bid, price, size)
    }

    #[inline]
    pub const fn sell(price: Price, size: u64) -> Self {
        Self::new(Side::Ask, price, size)
    }

    /// Side derived from the sign of the quantity. Zero reads as a bid;
    /// the book rejects zero-sized orders before this matters.
    #[inline]
    pub const fn side(&self) -> Side {
        if self.qty < 0 {
            Side::Ask
        } else {
            Side::Bid
        }
    }

    /// Unsigned size
    #[inline]
    pub const fn size(&self) -> u64 {
        self.qty.unsigned_abs()
    }

    /// Same order with a different unsigned size, side preserved.
    ///
    /// # Panics
    /// Panics if `size` exceeds [`MAX_ORDER_SIZE`].
    #[inline]
    pub const fn with_size(&self, size: u64) -> Self {
        Self::new(self.side(), self.price, size)
    }
}

/// Price and aggregate size of a level, as exposed to readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PriceQty {
    pub price: Price,
    pub qty: u64,
}

impl PriceQty {
    #[inline]
    pub const fn new(price: Price, qty: u64) -> Self {
        Self { price, qty }
    }
}

// ============================================================================
// Input Events
// ============================================================================

/// What a normalized tick event asks the book to do
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// New resting (or crossing) limit order
    Place = 0,
    /// Remove a resting order
    Cancel = 1,
    /// Replace a resting order (cancel + place)
    Modify = 2,
    /// Externally reported execution against a resting order
    Fill = 3,
}

/// A normalized event from a protocol decoder.
///
/// `order_id` is the feed's identifier. For `Cancel` only the id is
/// used; for `Fill`, `qty` is the executed size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickEvent {
    pub order_id: u64,
    pub kind: EventKind,
    pub side: Side,
    pub price: Price,
    pub qty: u64,
}

impl TickEvent {
    pub const fn place(order_id: u64, side: Side, price: Price, qty: u64) -> Self {
        Self { order_id, kind: EventKind::Place, side, price, qty }
    }

    pub const fn cancel(order_id: u64) -> Self {
        Self { order_id, kind: EventKind::Cancel, side: Side::Bid, price: 0, qty: 0 }
    }

    pub const fn modify(order_id: u64, price: Price, qty: u64) -> Self {
        Self { order_id, kind: EventKind::Modify, side: Side::Bid, price, qty }
    }

    pub const fn fill(order_id: u64, qty: u64) -> Self {
        Self { order_id, kind: EventKind::Fill, side: Side::Bid, price: 0, qty }
    }
}

// ============================================================================
// Output Events
// ============================================================================

/// A trade was executed by the book's own matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradeEvent {
    /// Execution price (the resting level's price)
    pub price: Price,
    /// Executed quantity
    pub qty: u64,
    /// Maker (resting) order ID
    pub maker_order_id: u64,
    /// Taker (aggressor) order ID
    pub taker_order_id: u64,
    /// Size left on the maker after this trade
    pub maker_remaining: u64,
    /// Side of the taker order
    pub taker_side: Side,
}

/// Best price on one side changed (`None` = side now empty)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BestUpdate {
    pub side: Side,
    pub best: Option<PriceQty>,
}

/// Order was accepted and is resting in the book
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderAccepted {
    pub order_id: u64,
    pub price: Price,
    pub qty: u64,
    pub side: Side,
}

/// Order left the book without trading (cancel, modify, drop)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderCanceled {
    pub order_id: u64,
    /// Remaining quantity that was canceled
    pub canceled_qty: u64,
}

/// Externally reported execution applied to a resting order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderFilled {
    pub order_id: u64,
    pub filled_qty: u64,
    pub remaining_qty: u64,
}

/// Order was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderRejected {
    pub order_id: u64,
    pub reason: RejectReason,
}

/// Reasons for order rejection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectReason {
    /// Order ID already resting
    DuplicateOrderId = 0,
    /// Order not found (for cancel/modify/fill)
    OrderNotFound = 1,
    /// Price does not fit the level window
    PriceOutOfRange = 2,
    /// Price is not a multiple of the tick size
    InvalidPrice = 3,
    /// Zero quantity
    InvalidQuantity = 4,
    /// Node pool could not grow
    PoolExhausted = 5,
}

/// Output events from the engine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// Trade executed
    Trade(TradeEvent),
    /// Best price changed on one side
    BestChanged(BestUpdate),
    /// Order accepted and resting
    Accepted(OrderAccepted),
    /// Order canceled
    Canceled(OrderCanceled),
    /// External fill applied
    Filled(OrderFilled),
    /// Order rejected
    Rejected(OrderRejected),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_side_from_sign() {
        let buy = Order { price: 100, qty: 10 };
        let sell = Order { price: 200, qty: -20 };
        assert_eq!(buy.side(), Side::Bid);
        assert_eq!(sell.side(), Side::Ask);
        assert_eq!(sell.size(), 20);
    }

    #[test]
    fn test_explicit_side_constructors() {
        assert_eq!(Order::sell(200, 20), Order { price: 200, qty: -20 });
        assert_eq!(Order::buy(100, 10), Order { price: 100, qty: 10 });
        assert_eq!(Order::sell(200, 20).with_size(5).qty, -5);
    }

    #[test]
    fn test_size_limits() {
        assert_eq!(Order::try_new(Side::Bid, 100, u64::MAX), None);
        assert_eq!(
            Order::try_new(Side::Ask, 100, MAX_ORDER_SIZE),
            Some(Order { price: 100, qty: -i64::MAX })
        );
        // i64::MIN reads as a sell one larger than any order can be
        assert_eq!(Order { price: 1, qty: i64::MIN }.size(), MAX_ORDER_SIZE + 1);
    }

    #[test]
    #[should_panic(expected = "order size exceeds")]
    fn test_new_panics_on_oversized() {
        let _ = Order::buy(100, u64::MAX);
    }

    #[test]
    fn test_event_constructors() {
        let place = TickEvent::place(7, Side::Ask, 105, 3);
        assert_eq!(place.kind, EventKind::Place);
        assert_eq!(place.side, Side::Ask);

        match TickEvent::cancel(7).kind {
            EventKind::Cancel => {}
            other => panic!("Expected Cancel, got {:?}", other),
        }
    }
}
