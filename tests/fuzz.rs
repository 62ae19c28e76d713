//! Fuzz Test - Compares the book against a reference implementation.
//!
//! Uses a naive but correct BTreeMap book to verify the ladder
//! produces identical trades, best prices and depth.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tick_ladder::{Engine, EngineConfig, OutputEvent, OverflowPolicy, PriceQty, Side, TickEvent};

/// (maker_id, price, qty)
type Trade = (u64, i64, u64);

/// Simple reference implementation for verification
#[derive(Default)]
struct ReferenceBook {
    bids: BTreeMap<i64, VecDeque<(u64, u64)>>, // price -> [(order_id, qty)]
    asks: BTreeMap<i64, VecDeque<(u64, u64)>>,
    orders: HashMap<u64, (Side, i64)>, // order_id -> (side, price)
}

impl ReferenceBook {
    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<i64, VecDeque<(u64, u64)>> {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Levels best first
    fn levels(&self, side: Side) -> Vec<(i64, u64, u32)> {
        let summarize = |(p, q): (&i64, &VecDeque<(u64, u64)>)| {
            (*p, q.iter().map(|(_, qty)| qty).sum::<u64>(), q.len() as u32)
        };
        match side {
            Side::Bid => self.bids.iter().rev().map(summarize).collect(),
            Side::Ask => self.asks.iter().map(summarize).collect(),
        }
    }

    fn best(&self, side: Side) -> Option<PriceQty> {
        self.levels(side).first().map(|&(p, q, _)| PriceQty::new(p, q))
    }

    fn place(&mut self, order_id: u64, side: Side, price: i64, mut qty: u64) -> Vec<Trade> {
        let mut trades = Vec::new();
        let opposite = side.opposite();

        while qty > 0 {
            let best = match side {
                Side::Bid => self.asks.keys().next().copied().filter(|&p| p <= price),
                Side::Ask => self.bids.keys().next_back().copied().filter(|&p| p >= price),
            };
            let Some(level_price) = best else { break };

            let mut filled = Vec::new();
            let level = self.side_mut(opposite).get_mut(&level_price).unwrap();
            while qty > 0 {
                let Some(head) = level.front_mut() else { break };
                let traded = head.1.min(qty);
                head.1 -= traded;
                qty -= traded;
                trades.push((head.0, level_price, traded));
                if head.1 == 0 {
                    let (maker_id, _) = level.pop_front().unwrap();
                    filled.push(maker_id);
                }
            }
            if level.is_empty() {
                self.side_mut(opposite).remove(&level_price);
            }
            for maker_id in filled {
                self.orders.remove(&maker_id);
            }
        }

        if qty > 0 {
            self.side_mut(side).entry(price).or_default().push_back((order_id, qty));
            self.orders.insert(order_id, (side, price));
        }
        trades
    }

    fn cancel(&mut self, order_id: u64) -> bool {
        let Some((side, price)) = self.orders.remove(&order_id) else {
            return false;
        };
        let book = self.side_mut(side);
        if let Some(orders) = book.get_mut(&price) {
            orders.retain(|(id, _)| *id != order_id);
            if orders.is_empty() {
                book.remove(&price);
            }
        }
        true
    }

    fn order_count(&self) -> usize {
        self.orders.len()
    }
}

fn engine_levels(engine: &Engine, side: Side) -> Vec<(i64, u64, u32)> {
    engine
        .book()
        .levels(side)
        .map(|l| (l.price(), l.qty(), l.order_count()))
        .collect()
}

fn trades_of(events: &[OutputEvent]) -> Vec<Trade> {
    events
        .iter()
        .filter_map(|e| match e {
            OutputEvent::Trade(t) => Some((t.maker_order_id, t.price, t.qty)),
            _ => None,
        })
        .collect()
}

fn random_place(rng: &mut ChaCha8Rng, order_id: u64, mid: i64) -> TickEvent {
    let side = if rng.gen_bool(0.5) { Side::Bid } else { Side::Ask };
    TickEvent::place(order_id, side, mid + rng.gen_range(-100..100), rng.gen_range(1..200))
}

fn run_against_reference(seed: u64, ops: usize, drift: bool) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut engine = Engine::new(EngineConfig {
        overflow: OverflowPolicy::Widen { max_index_size: 1 << 16 },
        ..EngineConfig::default()
    })
    .unwrap();
    let mut reference = ReferenceBook::default();

    let mut next_order_id = 1u64;
    let mut active: Vec<u64> = Vec::new();
    let mut mid = 10_000i64;

    for i in 0..ops {
        if drift && i % 10 == 0 {
            mid += rng.gen_range(-3..=3);
        }

        if active.is_empty() || rng.gen_bool(0.65) {
            let event = random_place(&mut rng, next_order_id, mid);
            next_order_id += 1;

            let events = engine.process(event);
            let expected = reference.place(event.order_id, event.side, event.price, event.qty);
            assert_eq!(trades_of(&events), expected, "trade mismatch at op {}", i);

            if engine.contains(event.order_id) {
                active.push(event.order_id);
            }
        } else {
            let idx = rng.gen_range(0..active.len());
            let order_id = active.swap_remove(idx);

            let events = engine.process(TickEvent::cancel(order_id));
            let canceled = events.iter().any(|e| matches!(e, OutputEvent::Canceled(_)));
            assert_eq!(canceled, reference.cancel(order_id), "cancel mismatch at op {}", i);
        }

        for side in [Side::Bid, Side::Ask] {
            assert_eq!(
                engine.best(side),
                reference.best(side),
                "best {} mismatch at op {}",
                side,
                i
            );
        }
        if i % 50 == 0 {
            assert_eq!(engine_levels(&engine, Side::Bid), reference.levels(Side::Bid), "bid depth at op {}", i);
            assert_eq!(engine_levels(&engine, Side::Ask), reference.levels(Side::Ask), "ask depth at op {}", i);
            assert_eq!(engine.order_count(), reference.order_count(), "order count at op {}", i);
        }
        active.retain(|id| engine.contains(*id));
    }

    assert_eq!(engine_levels(&engine, Side::Bid), reference.levels(Side::Bid));
    assert_eq!(engine_levels(&engine, Side::Ask), reference.levels(Side::Ask));
    assert_eq!(engine.order_count(), reference.order_count());
}

#[test]
fn test_fuzz_stationary_market() {
    run_against_reference(0xFEEDFACE, 10_000, false);
}

#[test]
fn test_fuzz_drifting_market() {
    run_against_reference(0xBADC0DE, 20_000, true);
}

#[test]
fn test_fuzz_trade_volume() {
    const SEED: u64 = 0x12345678;
    const OPS: u64 = 5_000;

    let mut rng = ChaCha8Rng::seed_from_u64(SEED);
    let mut engine = Engine::default();
    let mut reference = ReferenceBook::default();

    let mut engine_traded = 0u64;
    let mut reference_traded = 0u64;

    for order_id in 0..OPS {
        let event = random_place(&mut rng, order_id, 10_000);

        let events = engine.process(event);
        let expected = reference.place(event.order_id, event.side, event.price, event.qty);

        engine_traded += trades_of(&events).iter().map(|t| t.2).sum::<u64>();
        reference_traded += expected.iter().map(|t| t.2).sum::<u64>();
    }

    assert!(engine_traded > 0);
    assert_eq!(engine_traded, reference_traded, "Total traded volume mismatch");
}
