//! Bar to text line serialization.

use chrono::{NaiveDateTime, NaiveTime};

use crate::domain::{Bar, DataKind, EventKind, MarketEvent, Ohlc, QuoteBar, Resolution, TradeBar, scale_price};

/// Renders one bar as one output line (without the trailing newline).
pub trait LineFormatter: Send + Sync {
    /// Format `bar` for an entry of `kind` at `resolution`.
    fn format(&self, bar: &Bar, kind: DataKind, resolution: Resolution) -> String;
}

/// Comma-separated lines with fixed-point prices.
///
/// | Unit | Columns |
/// |------|---------|
/// | trade tick | `time,price,size,venue,condition` |
/// | quote tick | `time,bid,bid_size,ask,ask_size,venue,condition` |
/// | trade bar | `time,open,high,low,close,volume` |
/// | quote bar | `time,bid_o,bid_h,bid_l,bid_c,bid_size,ask_o,ask_h,ask_l,ask_c,ask_size` |
///
/// `time` is milliseconds since midnight, or `yyyyMMdd HH:mm` at daily
/// resolution. Prices are scaled by 10,000. A quote side with no data is
/// left empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvLineFormatter;

impl LineFormatter for CsvLineFormatter {
    fn format(&self, bar: &Bar, _kind: DataKind, resolution: Resolution) -> String {
        let mut line = format_time(bar.time(), resolution);
        match bar {
            Bar::Tick(event) => push_tick(&mut line, event),
            Bar::Trade(bar) => push_trade_bar(&mut line, bar),
            Bar::Quote(bar) => push_quote_bar(&mut line, bar),
        }
        line
    }
}

fn format_time(time: NaiveDateTime, resolution: Resolution) -> String {
    if resolution == Resolution::Daily {
        return time.format("%Y%m%d %H:%M").to_string();
    }
    let midnight = time.date().and_time(NaiveTime::MIN);
    (time - midnight).num_milliseconds().to_string()
}

fn push_tick(line: &mut String, event: &MarketEvent) {
    let price = scale_price(event.price);
    let columns = match event.kind {
        EventKind::Trade => format!(",{price},{}", event.size),
        EventKind::BidQuote => format!(",{price},{},,", event.size),
        EventKind::AskQuote => format!(",,,{price},{}", event.size),
    };
    line.push_str(&columns);
    line.push_str(&format!(",{},{}", event.venue, event.condition));
}

fn push_trade_bar(line: &mut String, bar: &TradeBar) {
    push_ohlc(line, Some(&bar.ohlc));
    line.push_str(&format!(",{}", bar.volume));
}

fn push_quote_bar(line: &mut String, bar: &QuoteBar) {
    push_ohlc(line, bar.bid.as_ref());
    push_size(line, bar.bid.map(|_| bar.last_bid_size));
    push_ohlc(line, bar.ask.as_ref());
    push_size(line, bar.ask.map(|_| bar.last_ask_size));
}

fn push_ohlc(line: &mut String, ohlc: Option<&Ohlc>) {
    match ohlc {
        Some(o) => line.push_str(&format!(
            ",{},{},{},{}",
            scale_price(o.open),
            scale_price(o.high),
            scale_price(o.low),
            scale_price(o.close)
        )),
        None => line.push_str(",,,,"),
    }
}

fn push_size(line: &mut String, size: Option<u64>) {
    line.push(',');
    if let Some(size) = size {
        line.push_str(&size.to_string());
    }
}
