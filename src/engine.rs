//! Engine - per-instrument dispatch of normalized tick events.
//!
//! Owns one [`OrderBook`], maps feed order ids to node handles, turns
//! `Modify` into cancel + place and `Fill` into a reduce, applies the
//! configured overflow policy, and pushes best-price changes after every
//! event.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;

use crate::arena::NodeHandle;
use crate::command::{
    BestUpdate, EventKind, Order, OrderAccepted, OrderCanceled, OrderFilled, OrderRejected,
    OutputEvent, PriceQty, RejectReason, Side, TickEvent, TradeEvent, MAX_ORDER_SIZE,
};
use crate::config::{EngineConfig, OverflowPolicy};
use crate::error::{BookError, ConfigError};
use crate::order_book::OrderBook;

/// Single-instrument event processor.
pub struct Engine {
    book: OrderBook,
    overflow: OverflowPolicy,
    /// Feed order id -> resting node
    handles: FxHashMap<u64, NodeHandle>,
    /// Resting node -> feed order id (to name makers in trades)
    owners: FxHashMap<NodeHandle, u64>,
    last_best: [Option<PriceQty>; 2],
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            book: OrderBook::new(config.book)?,
            overflow: config.overflow,
            handles: FxHashMap::default(),
            owners: FxHashMap::default(),
            last_best: [None, None],
        })
    }

    /// Process a single event and return output events.
    ///
    /// This is the main entry point for synchronous usage (testing, benchmarks).
    pub fn process(&mut self, event: TickEvent) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        match event.kind {
            EventKind::Place => self.on_place(event, &mut events),
            EventKind::Cancel => self.on_cancel(event.order_id, &mut events),
            EventKind::Modify => self.on_modify(event, &mut events),
            EventKind::Fill => self.on_fill(event, &mut events),
        }
        self.push_best_changes(&mut events);
        events
    }

    fn on_place(&mut self, event: TickEvent, events: &mut Vec<OutputEvent>) {
        if self.handles.contains_key(&event.order_id) {
            reject(events, event.order_id, RejectReason::DuplicateOrderId);
            return;
        }
        let Some(order) = Order::try_new(event.side, event.price, event.qty) else {
            reject(events, event.order_id, RejectReason::InvalidQuantity);
            return;
        };
        self.submit(event.order_id, order, events);
    }

    fn on_cancel(&mut self, order_id: u64, events: &mut Vec<OutputEvent>) {
        let Some(handle) = self.handles.remove(&order_id) else {
            reject(events, order_id, RejectReason::OrderNotFound);
            return;
        };
        self.owners.remove(&handle);

        match self.book.cancel(handle) {
            Ok(order) => events.push(OutputEvent::Canceled(OrderCanceled {
                order_id,
                canceled_qty: order.size(),
            })),
            Err(e) => reject(events, order_id, reason_for(&e)),
        }
    }

    /// Modify = Cancel + Place, keeping the side of the original order.
    fn on_modify(&mut self, event: TickEvent, events: &mut Vec<OutputEvent>) {
        let Some(&handle) = self.handles.get(&event.order_id) else {
            reject(events, event.order_id, RejectReason::OrderNotFound);
            return;
        };
        // Validate the replacement before giving up the original's queue spot
        if event.qty == 0 || event.qty > MAX_ORDER_SIZE {
            reject(events, event.order_id, RejectReason::InvalidQuantity);
            return;
        }
        if let Err(e) = self.book.rules().to_tick(event.price) {
            reject(events, event.order_id, reason_for(&e));
            return;
        }
        let side = match self.book.get(handle) {
            Ok(order) => order.side(),
            Err(e) => {
                reject(events, event.order_id, reason_for(&e));
                return;
            }
        };

        self.on_cancel(event.order_id, events);
        let order = Order::new(side, event.price, event.qty);
        self.submit(event.order_id, order, events);
    }

    fn on_fill(&mut self, event: TickEvent, events: &mut Vec<OutputEvent>) {
        let Some(&handle) = self.handles.get(&event.order_id) else {
            reject(events, event.order_id, RejectReason::OrderNotFound);
            return;
        };
        match self.book.reduce(handle, event.qty) {
            Ok(remaining) => {
                if remaining == 0 {
                    self.handles.remove(&event.order_id);
                    self.owners.remove(&handle);
                }
                events.push(OutputEvent::Filled(OrderFilled {
                    order_id: event.order_id,
                    filled_qty: event.qty,
                    remaining_qty: remaining,
                }));
            }
            Err(e) => reject(events, event.order_id, reason_for(&e)),
        }
    }

    /// Place through the book, applying the overflow policy when the
    /// price does not fit.
    fn submit(&mut self, order_id: u64, order: Order, events: &mut Vec<OutputEvent>) {
        // off the grid or past the tick range: no index size admits it
        if let Err(e) = self.book.rules().to_tick(order.price) {
            reject(events, order_id, reason_for(&e));
            return;
        }
        loop {
            match self.try_place(order_id, order, events) {
                Ok(()) => return,
                Err(BookError::PriceOutOfRange { price, low, high }) => match self.overflow {
                    OverflowPolicy::Reject => {
                        reject(events, order_id, RejectReason::PriceOutOfRange);
                        return;
                    }
                    OverflowPolicy::Drop => {
                        tracing::warn!(order_id, price, low, high, "order dropped: price out of range");
                        return;
                    }
                    OverflowPolicy::Widen { max_index_size } => {
                        let current = self.book.index_size();
                        let next = current.saturating_mul(2).min(max_index_size);
                        if next <= current {
                            tracing::warn!(order_id, price, current, "cannot widen further");
                            reject(events, order_id, RejectReason::PriceOutOfRange);
                            return;
                        }
                        if let Err(e) = self.book.widen(next) {
                            reject(events, order_id, reason_for(&e));
                            return;
                        }
                        tracing::debug!(order_id, price, from = current, to = next, "book widened");
                    }
                },
                Err(e) => {
                    reject(events, order_id, reason_for(&e));
                    return;
                }
            }
        }
    }

    fn try_place(
        &mut self,
        order_id: u64,
        order: Order,
        events: &mut Vec<OutputEvent>,
    ) -> Result<(), BookError> {
        let handles = &mut self.handles;
        let owners = &mut self.owners;

        let resting = self.book.place_with(order, |fill| {
            let maker_order_id = if fill.resting_remaining == 0 {
                let id = owners.remove(&fill.resting_handle);
                if let Some(id) = id {
                    handles.remove(&id);
                }
                id
            } else {
                owners.get(&fill.resting_handle).copied()
            };
            events.push(OutputEvent::Trade(TradeEvent {
                price: fill.price,
                qty: fill.qty,
                maker_order_id: maker_order_id.unwrap_or_default(),
                taker_order_id: order_id,
                maker_remaining: fill.resting_remaining,
                taker_side: fill.taker_side(),
            }));
        })?;

        if let Some(handle) = resting {
            let remaining = self.book.get(handle)?;
            self.handles.insert(order_id, handle);
            self.owners.insert(handle, order_id);
            events.push(OutputEvent::Accepted(OrderAccepted {
                order_id,
                price: order.price,
                qty: remaining.size(),
                side: order.side(),
            }));
        }
        Ok(())
    }

    fn push_best_changes(&mut self, events: &mut Vec<OutputEvent>) {
        for side in [Side::Bid, Side::Ask] {
            let best = self.book.best(side);
            if best != self.last_best[side.index()] {
                self.last_best[side.index()] = best;
                events.push(OutputEvent::BestChanged(BestUpdate { side, best }));
            }
        }
    }

    /// Run the engine event loop.
    ///
    /// # Arguments
    /// * `input` - Consumer end of the event ring buffer
    /// * `output` - Producer end of the output event ring buffer
    /// * `pin_to_core` - Whether to pin to the last available CPU core
    ///
    /// # Note
    /// This function runs forever (until the program terminates).
    #[cfg(feature = "runtime")]
    pub fn run(
        &mut self,
        input: &mut rtrb::Consumer<TickEvent>,
        output: &mut rtrb::Producer<OutputEvent>,
        pin_to_core: bool,
    ) {
        if pin_to_core {
            self.pin_to_core();
        }

        loop {
            while let Ok(event) = input.pop() {
                for out in self.process(event) {
                    // Best effort - drop if full
                    let _ = output.push(out);
                }
            }
            std::hint::spin_loop();
        }
    }

    /// Pin the current thread to the last available CPU core.
    #[cfg(feature = "runtime")]
    pub fn pin_to_core(&self) {
        if let Some(core_ids) = core_affinity::get_core_ids() {
            if let Some(last_core) = core_ids.last() {
                core_affinity::set_for_current(*last_core);
            }
        }
    }

    /// Grow the node pool ahead of trading.
    pub fn warm_up(&mut self, nodes: usize) -> Result<(), BookError> {
        self.book.preallocate(nodes)
    }

    // ========================================================================
    // Utility Methods
    // ========================================================================

    #[inline]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    #[inline]
    pub fn best(&self, side: Side) -> Option<PriceQty> {
        self.book.best(side)
    }

    #[inline]
    pub fn spread(&self) -> Option<i64> {
        self.book.spread()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    #[inline]
    pub fn contains(&self, order_id: u64) -> bool {
        self.handles.contains_key(&order_id)
    }

    /// Compute a hash of the current state (for determinism testing)
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        for side in [Side::Bid, Side::Ask] {
            for level in self.book.levels(side) {
                level.snapshot().hash(&mut hasher);
            }
        }
        self.book.order_count().hash(&mut hasher);
        self.book.index_size().hash(&mut hasher);

        hasher.finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            book: OrderBook::default(),
            overflow: OverflowPolicy::default(),
            handles: FxHashMap::default(),
            owners: FxHashMap::default(),
            last_best: [None, None],
        }
    }
}

fn reject(events: &mut Vec<OutputEvent>, order_id: u64, reason: RejectReason) {
    events.push(OutputEvent::Rejected(OrderRejected { order_id, reason }));
}

fn reason_for(err: &BookError) -> RejectReason {
    match err {
        BookError::ZeroQuantity
        | BookError::SizeTooLarge(_)
        | BookError::LevelQtyOverflow { .. } => RejectReason::InvalidQuantity,
        BookError::PriceNotOnTick { .. } => RejectReason::InvalidPrice,
        BookError::PriceOutOfRange { .. } => RejectReason::PriceOutOfRange,
        BookError::InvalidHandle => RejectReason::OrderNotFound,
        BookError::AllocationFailed | BookError::CapacityTooLarge(_) => RejectReason::PoolExhausted,
    }
}
