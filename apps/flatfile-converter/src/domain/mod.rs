//! Domain types shared by every pipeline stage.
//!
//! - [`InstrumentIdentity`]: one option contract, the consolidation key
//! - [`MarketEvent`]: a decoded trade or quote
//! - [`Resolution`]: output bar sizes
//! - [`Bar`]: what consolidators emit

mod bar;
mod event;
mod instrument;
mod resolution;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub use bar::{Bar, Ohlc, QuoteBar, TradeBar};
pub use event::{DataKind, EventKind, MarketEvent};
pub use instrument::{DEFAULT_MARKET, InstrumentIdentity, OptionRight, OptionStyle};
pub use resolution::Resolution;

/// Number of implied fractional digits in fixed-point wire prices.
pub const PRICE_SCALE: u32 = 4;

/// Decode a fixed-point wire value with [`PRICE_SCALE`] implied decimals.
#[must_use]
pub fn unscale_price(raw: i64) -> Decimal {
    Decimal::new(raw, PRICE_SCALE)
}

/// Encode a price as a fixed-point integer with [`PRICE_SCALE`] implied decimals.
///
/// Values beyond the wire precision are rounded half away from zero.
#[must_use]
pub fn scale_price(price: Decimal) -> i64 {
    (price * Decimal::from(10_i64.pow(PRICE_SCALE)))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}
