//! Consolidated output units.

use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::event::{DataKind, EventKind, MarketEvent};
use super::instrument::InstrumentIdentity;

/// Open/high/low/close of one price series over an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlc {
    /// First price.
    pub open: Decimal,
    /// Highest price.
    pub high: Decimal,
    /// Lowest price.
    pub low: Decimal,
    /// Last price.
    pub close: Decimal,
}

impl Ohlc {
    /// Start a series at `price`.
    #[must_use]
    pub const fn new(price: Decimal) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    /// Extend the series with `price`.
    pub fn update(&mut self, price: Decimal) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }
}

/// Trade bar over one interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeBar {
    /// Contract.
    pub instrument: InstrumentIdentity,
    /// Interval start.
    pub time: NaiveDateTime,
    /// Interval length.
    pub period: Duration,
    /// Trade prices.
    pub ohlc: Ohlc,
    /// Summed trade size.
    pub volume: u64,
}

impl TradeBar {
    /// Open a bar from its first trade.
    #[must_use]
    pub fn open(event: &MarketEvent, time: NaiveDateTime, period: Duration) -> Self {
        Self {
            instrument: event.instrument.clone(),
            time,
            period,
            ohlc: Ohlc::new(event.price),
            volume: event.size,
        }
    }

    /// Fold a trade into the bar.
    pub fn update(&mut self, event: &MarketEvent) {
        self.ohlc.update(event.price);
        self.volume = self.volume.saturating_add(event.size);
    }

    /// Interval end (exclusive).
    #[must_use]
    pub fn end_time(&self) -> NaiveDateTime {
        self.time + self.period
    }
}

/// Quote bar over one interval.
///
/// Either side may be absent when no update for it arrived in the interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteBar {
    /// Contract.
    pub instrument: InstrumentIdentity,
    /// Interval start.
    pub time: NaiveDateTime,
    /// Interval length.
    pub period: Duration,
    /// Bid prices.
    pub bid: Option<Ohlc>,
    /// Ask prices.
    pub ask: Option<Ohlc>,
    /// Size of the last bid update.
    pub last_bid_size: u64,
    /// Size of the last ask update.
    pub last_ask_size: u64,
}

impl QuoteBar {
    /// Open a bar from its first quote.
    #[must_use]
    pub fn open(event: &MarketEvent, time: NaiveDateTime, period: Duration) -> Self {
        let mut bar = Self {
            instrument: event.instrument.clone(),
            time,
            period,
            bid: None,
            ask: None,
            last_bid_size: 0,
            last_ask_size: 0,
        };
        bar.update(event);
        bar
    }

    /// Fold a bid or ask update into the bar. Trades are ignored.
    pub fn update(&mut self, event: &MarketEvent) {
        match event.kind {
            EventKind::BidQuote => {
                match self.bid.as_mut() {
                    Some(bid) => bid.update(event.price),
                    None => self.bid = Some(Ohlc::new(event.price)),
                }
                self.last_bid_size = event.size;
            }
            EventKind::AskQuote => {
                match self.ask.as_mut() {
                    Some(ask) => ask.update(event.price),
                    None => self.ask = Some(Ohlc::new(event.price)),
                }
                self.last_ask_size = event.size;
            }
            EventKind::Trade => {}
        }
    }

    /// Interval end (exclusive).
    #[must_use]
    pub fn end_time(&self) -> NaiveDateTime {
        self.time + self.period
    }
}

/// One unit emitted by a consolidator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bar {
    /// Tick resolution pass-through.
    Tick(MarketEvent),
    /// Consolidated trades.
    Trade(TradeBar),
    /// Consolidated quotes.
    Quote(QuoteBar),
}

impl Bar {
    /// Start time (event time for ticks).
    #[must_use]
    pub const fn time(&self) -> NaiveDateTime {
        match self {
            Self::Tick(event) => event.time,
            Self::Trade(bar) => bar.time,
            Self::Quote(bar) => bar.time,
        }
    }

    /// Contract the unit belongs to.
    #[must_use]
    pub const fn instrument(&self) -> &InstrumentIdentity {
        match self {
            Self::Tick(event) => &event.instrument,
            Self::Trade(bar) => &bar.instrument,
            Self::Quote(bar) => &bar.instrument,
        }
    }

    /// Output kind of this unit.
    #[must_use]
    pub const fn data_kind(&self) -> DataKind {
        match self {
            Self::Tick(event) => event.kind.data_kind(),
            Self::Trade(_) => DataKind::Trade,
            Self::Quote(_) => DataKind::Quote,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{DEFAULT_MARKET, OptionRight};

    fn event(kind: EventKind, price: Decimal, size: u64) -> MarketEvent {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        MarketEvent {
            instrument: InstrumentIdentity::american(
                "SPY",
                NaiveDate::from_ymd_opt(2024, 1, 19).unwrap(),
                dec!(475),
                OptionRight::Call,
                DEFAULT_MARKET,
            ),
            time: date.and_hms_opt(9, 30, 0).unwrap(),
            kind,
            price,
            size,
            venue: "CBOE".to_string(),
            condition: String::new(),
        }
    }

    #[test]
    fn test_trade_bar_folds_prices_and_volume() {
        let first = event(EventKind::Trade, dec!(1.25), 10);
        let mut bar = TradeBar::open(&first, first.time, Duration::minutes(1));
        bar.update(&event(EventKind::Trade, dec!(1.40), 5));
        bar.update(&event(EventKind::Trade, dec!(1.10), 2));
        bar.update(&event(EventKind::Trade, dec!(1.20), 1));

        assert_eq!(bar.ohlc.open, dec!(1.25));
        assert_eq!(bar.ohlc.high, dec!(1.40));
        assert_eq!(bar.ohlc.low, dec!(1.10));
        assert_eq!(bar.ohlc.close, dec!(1.20));
        assert_eq!(bar.volume, 18);
        assert_eq!(bar.end_time(), first.time + Duration::minutes(1));
    }

    #[test]
    fn test_quote_bar_tracks_sides_independently() {
        let bid = event(EventKind::BidQuote, dec!(1.20), 7);
        let mut bar = QuoteBar::open(&bid, bid.time, Duration::minutes(1));
        assert!(bar.ask.is_none());

        bar.update(&event(EventKind::AskQuote, dec!(1.30), 4));
        bar.update(&event(EventKind::BidQuote, dec!(1.15), 9));

        let bid = bar.bid.unwrap();
        assert_eq!(bid.open, dec!(1.20));
        assert_eq!(bid.low, dec!(1.15));
        assert_eq!(bid.close, dec!(1.15));
        assert_eq!(bar.ask.unwrap().close, dec!(1.30));
        assert_eq!(bar.last_bid_size, 9);
        assert_eq!(bar.last_ask_size, 4);
    }

    #[test]
    fn test_bar_data_kind() {
        let tick = Bar::Tick(event(EventKind::AskQuote, dec!(1), 1));
        assert_eq!(tick.data_kind(), DataKind::Quote);
    }
}
