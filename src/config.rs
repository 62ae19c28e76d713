//! Book and engine configuration.
//!
//! Everything the book needs is plain numbers handed over at
//! construction. [`TickRules`] carries the per-instrument price rules the
//! book consults for every comparison.

use std::path::Path;

use serde::Deserialize;

use crate::command::{Price, Side};
use crate::error::{BookError, ConfigError};

/// Largest level index the book will build (slots are addressed as u32).
pub const MAX_INDEX_SIZE: usize = 1 << 24;

/// Smallest level index: two outlier sentinels plus one slot per side.
pub const MIN_INDEX_SIZE: usize = 4;

/// Largest tick magnitude the book accepts. Leaves headroom so window
/// arithmetic (`tick ± index_size`, distances between ticks) cannot
/// overflow.
pub const MAX_TICK: i64 = 1 << 60;

fn default_tick_size() -> i64 {
    1
}

fn default_index_size() -> usize {
    256
}

fn default_slab_size() -> usize {
    1024
}

/// Construction parameters for one [`OrderBook`](crate::OrderBook).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookConfig {
    /// Minimum price increment, in raw price units
    #[serde(default = "default_tick_size")]
    pub tick_size: i64,
    /// Number of price levels in the circular index
    #[serde(default = "default_index_size")]
    pub index_size: usize,
    /// Nodes added to the pool each time it runs dry
    #[serde(default = "default_slab_size")]
    pub slab_size: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            tick_size: default_tick_size(),
            index_size: default_index_size(),
            slab_size: default_slab_size(),
        }
    }
}

impl BookConfig {
    pub fn with_tick_size(mut self, tick_size: i64) -> Self {
        self.tick_size = tick_size;
        self
    }

    pub fn with_index_size(mut self, index_size: usize) -> Self {
        self.index_size = index_size;
        self
    }

    pub fn with_slab_size(mut self, slab_size: usize) -> Self {
        self.slab_size = slab_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_size <= 0 {
            return Err(ConfigError::TickSize(self.tick_size));
        }
        if !(MIN_INDEX_SIZE..=MAX_INDEX_SIZE).contains(&self.index_size) {
            return Err(ConfigError::IndexSize { got: self.index_size, max: MAX_INDEX_SIZE });
        }
        if self.slab_size == 0 {
            return Err(ConfigError::SlabSize);
        }
        Ok(())
    }

    /// Price rules derived from this config.
    #[inline]
    pub fn rules(&self) -> TickRules {
        TickRules::new(self.tick_size)
    }
}

/// Per-instrument price rules: tick conversion and side-aware
/// comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickRules {
    tick_size: i64,
}

impl TickRules {
    /// # Panics
    /// Panics if `tick_size` is not positive. [`BookConfig::validate`]
    /// rejects such configs first.
    pub fn new(tick_size: i64) -> Self {
        assert!(tick_size > 0, "tick size must be positive");
        Self { tick_size }
    }

    #[inline]
    pub fn tick_size(&self) -> i64 {
        self.tick_size
    }

    /// Raw price to tick number. Off-grid prices are rejected rather than
    /// rounded so two distinct prices never share a level; ticks beyond
    /// [`MAX_TICK`] are out of range.
    #[inline]
    pub fn to_tick(&self, price: Price) -> Result<i64, BookError> {
        if price.rem_euclid(self.tick_size) != 0 {
            return Err(BookError::PriceNotOnTick { price, tick_size: self.tick_size });
        }
        let tick = price.div_euclid(self.tick_size);
        if tick.unsigned_abs() > MAX_TICK as u64 {
            return Err(BookError::PriceOutOfRange {
                price,
                low: self.to_price(-MAX_TICK),
                high: self.to_price(MAX_TICK),
            });
        }
        Ok(tick)
    }

    /// Saturates, so range bounds reported in errors never wrap.
    #[inline]
    pub fn to_price(&self, tick: i64) -> Price {
        tick.saturating_mul(self.tick_size)
    }

    /// True when tick `a` is strictly more aggressive than `b` for `side`.
    #[inline]
    pub fn is_better(&self, side: Side, a: i64, b: i64) -> bool {
        match side {
            Side::Bid => a > b,
            Side::Ask => a < b,
        }
    }

    /// True when an incoming `side` order limited at `limit` trades with
    /// an opposite level at `opposite`.
    #[inline]
    pub fn crosses(&self, side: Side, limit: i64, opposite: i64) -> bool {
        match side {
            // Buyer willing to pay >= lowest ask
            Side::Bid => limit >= opposite,
            // Seller willing to accept <= highest bid
            Side::Ask => limit <= opposite,
        }
    }
}

/// What the engine does with an order whose price cannot fit the level
/// window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Emit a rejection
    #[default]
    Reject,
    /// Discard silently (logged)
    Drop,
    /// Double the index until the price fits or the limit is hit
    Widen { max_index_size: usize },
}

/// Engine configuration: one book plus the overflow policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub book: BookConfig,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.book.validate()?;
        if let OverflowPolicy::Widen { max_index_size } = self.overflow {
            if max_index_size < self.book.index_size || max_index_size > MAX_INDEX_SIZE {
                return Err(ConfigError::WidenLimit {
                    limit: max_index_size,
                    index_size: self.book.index_size,
                });
            }
        }
        Ok(())
    }
}
