//! Error types.

use crate::command::Price;

/// Failures reported by the order book.
///
/// None of these leave the book partially mutated: every check runs
/// before the first structural change of the call that reports it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookError {
    #[error("order quantity must be non-zero")]
    ZeroQuantity,

    /// Size does not fit the signed order quantity.
    #[error("order size {0} exceeds the largest representable size")]
    SizeTooLarge(u64),

    /// Resting the order would overflow its level's aggregate size.
    #[error("aggregate size at price {price} would overflow")]
    LevelQtyOverflow { price: Price },

    #[error("price {price} is not a multiple of tick size {tick_size}")]
    PriceNotOnTick { price: Price, tick_size: i64 },

    /// The resting price cannot share the level window with the orders
    /// already in the book.
    #[error("price {price} outside representable window [{low}, {high}]")]
    PriceOutOfRange { price: Price, low: Price, high: Price },

    /// Handle was already released, or belongs to another book.
    #[error("stale or foreign node handle")]
    InvalidHandle,

    /// The node pool or level index could not grow.
    #[error("allocation failed while growing book storage")]
    AllocationFailed,

    #[error("capacity {0} exceeds the addressable index range")]
    CapacityTooLarge(usize),
}

/// Invalid configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("tick_size must be positive, got {0}")]
    TickSize(i64),

    #[error("index_size must be between 4 and {max}, got {got}")]
    IndexSize { got: usize, max: usize },

    #[error("slab_size must be at least 1")]
    SlabSize,

    #[error("widen limit {limit} is below index_size {index_size}")]
    WidenLimit { limit: usize, index_size: usize },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures turning a replay row into a tick event.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("unknown event kind {0:?}")]
    Kind(String),

    #[error("unknown side {0:?}")]
    Side(String),

    #[error("missing {0} field")]
    Missing(&'static str),

    #[error("value {0} does not fit the integer price grid")]
    Scale(rust_decimal::Decimal),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
