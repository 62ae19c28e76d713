//! # Tick-Ladder
//!
//! A fixed-capacity, price-level limit order book for one instrument.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: One thread owns the book exclusively (no locks)
//! - **O(1) Best Price**: Levels live in a circular array indexed by tick
//! - **Pooled Nodes**: Orders are 32-byte nodes recycled through a free list
//! - **Bounded Window**: The ladder re-centers itself between the two sides
//!
//! ## Architecture
//!
//! ```text
//! [Feed Decoder] --> [TickEvent] --> [Engine] --> [OrderBook]
//!                                       |        /         \
//!                                 [OutputEvent] [PriceLadder] [NodePool]
//! ```

pub mod arena;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod ladder;
pub mod order_book;
pub mod price_level;
pub mod slot;
pub mod view;

// Re-exports for convenience
pub use arena::{ArenaIndex, NodeHandle, NodePool, OrderNode, NULL_INDEX};
pub use command::{
    BestUpdate, EventKind, Order, OrderAccepted, OrderCanceled, OrderFilled, OrderRejected,
    OutputEvent, Price, PriceQty, Qty, RejectReason, Side, TickEvent, TradeEvent, MAX_ORDER_SIZE,
};
pub use config::{BookConfig, EngineConfig, OverflowPolicy, TickRules, MAX_TICK};
pub use engine::Engine;
pub use error::{BookError, ConfigError, FeedError};
pub use ladder::PriceLadder;
pub use order_book::{Fill, OrderBook};
pub use price_level::PriceLevel;
pub use view::{LevelSnapshot, LevelView, Levels};
