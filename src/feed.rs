//! CSV replay feed.
//!
//! Decodes rows of `order_id,kind,side,price,qty` into [`TickEvent`]s.
//! Prices arrive as decimals and are scaled onto the integer grid by
//! `price_mult` (100 for cents); a price that does not land exactly on
//! an integer is an error rather than a silent rounding.

use std::io;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::command::{EventKind, Side, TickEvent};
use crate::error::FeedError;

#[derive(Debug, Deserialize)]
pub struct FeedRow {
    pub order_id: u64,
    pub kind: String,
    pub side: Option<String>,
    pub price: Option<Decimal>,
    pub qty: Option<u64>,
}

impl FeedRow {
    /// Convert raw row to a normalized event.
    pub fn to_event(&self, price_mult: u64) -> Result<TickEvent, FeedError> {
        let kind = parse_kind(&self.kind)?;
        let order_id = self.order_id;

        let event = match kind {
            EventKind::Place => {
                let side = match self.side.as_deref() {
                    Some(raw) => parse_side(raw)?,
                    None => return Err(FeedError::Missing("side")),
                };
                TickEvent::place(order_id, side, self.scaled_price(price_mult)?, self.qty()?)
            }
            EventKind::Cancel => TickEvent::cancel(order_id),
            EventKind::Modify => TickEvent::modify(order_id, self.scaled_price(price_mult)?, self.qty()?),
            EventKind::Fill => TickEvent::fill(order_id, self.qty()?),
        };
        Ok(event)
    }

    fn qty(&self) -> Result<u64, FeedError> {
        self.qty.ok_or(FeedError::Missing("qty"))
    }

    fn scaled_price(&self, price_mult: u64) -> Result<i64, FeedError> {
        let price = self.price.ok_or(FeedError::Missing("price"))?;
        let scaled = price
            .checked_mul(Decimal::from(price_mult))
            .ok_or(FeedError::Scale(price))?;
        if !scaled.fract().is_zero() {
            return Err(FeedError::Scale(price));
        }
        scaled.to_i64().ok_or(FeedError::Scale(price))
    }
}

fn parse_kind(raw: &str) -> Result<EventKind, FeedError> {
    match raw.to_ascii_lowercase().as_str() {
        "place" | "add" | "open" => Ok(EventKind::Place),
        "cancel" | "delete" | "done" => Ok(EventKind::Cancel),
        "modify" | "change" => Ok(EventKind::Modify),
        "fill" | "execute" | "match" => Ok(EventKind::Fill),
        _ => Err(FeedError::Kind(raw.to_owned())),
    }
}

fn parse_side(raw: &str) -> Result<Side, FeedError> {
    match raw.to_ascii_lowercase().as_str() {
        "buy" | "bid" | "b" => Ok(Side::Bid),
        "sell" | "ask" | "s" => Ok(Side::Ask),
        _ => Err(FeedError::Side(raw.to_owned())),
    }
}

/// Stream events from CSV with a header row.
pub fn read_events<R: io::Read>(
    reader: R,
    price_mult: u64,
) -> impl Iterator<Item = Result<TickEvent, FeedError>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_deserialize::<FeedRow>()
        .map(move |row| row?.to_event(price_mult))
}
