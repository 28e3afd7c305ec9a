//! Line decoder for channel files.
//!
//! Each line is one comma-delimited record with eleven columns:
//!
//! ```text
//! 09:30:00.123,TRADE,SPY,C,20240119,4750000,12500,10,CBOE,I,1
//! │            │     │   │ │        │       │     │  │    │ └ sequence (ignored)
//! │            │     │   │ │        │       │     │  │    └ condition
//! │            │     │   │ │        │       │     │  └ venue
//! │            │     │   │ │        │       │     └ size
//! │            │     │   │ │        │       └ price ×10000
//! │            │     │   │ │        └ strike ×10000
//! │            │     │   │ └ expiry yyyyMMdd
//! │            │     │   └ right C/P
//! │            │     └ underlying
//! │            └ event type TRADE/BID/ASK, first byte at offset 13
//! └ time of day HH:MM:SS.mmm
//! ```
//!
//! Feeds are noisy. Anything that does not decode cleanly is rejected with
//! `None` so one corrupt line never aborts a file.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::domain::{EventKind, InstrumentIdentity, MarketEvent, OptionRight, unscale_price};

/// Number of columns in a valid record.
pub const COLUMN_COUNT: usize = 11;

/// Byte offset of the event type marker.
pub const KIND_OFFSET: usize = 13;

const TIME_WIDTH: usize = 12;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Decodes channel lines into [`MarketEvent`]s for one reference date.
#[derive(Debug, Clone)]
pub struct RecordParser {
    reference_date: NaiveDate,
    market: String,
}

impl RecordParser {
    /// Create a parser for events recorded on `reference_date`.
    #[must_use]
    pub fn new(reference_date: NaiveDate, market: impl Into<String>) -> Self {
        Self {
            reference_date,
            market: market.into(),
        }
    }

    /// Date every event time is anchored to.
    #[must_use]
    pub const fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Decode one line.
    ///
    /// Returns `None` for any line that is malformed or carries an event
    /// type this pipeline does not consume.
    #[must_use]
    pub fn parse(&self, line: &str) -> Option<MarketEvent> {
        // Cheap rejection before splitting.
        let kind = classify(line)?;

        let mut columns = [""; COLUMN_COUNT];
        let mut count = 0;
        for (slot, value) in columns.iter_mut().zip(line.split(',')) {
            *slot = value.trim();
            count += 1;
        }
        if count < COLUMN_COUNT {
            return None;
        }

        let expected_type = match kind {
            EventKind::Trade => "TRADE",
            EventKind::BidQuote => "BID",
            EventKind::AskQuote => "ASK",
        };
        if columns[1] != expected_type {
            return None;
        }

        let time = self.event_time(columns[0])?;

        let underlying = columns[2];
        if underlying.is_empty() || !underlying.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.')
        {
            return None;
        }
        let right = OptionRight::from_marker(columns[3])?;
        let expiry = parse_yyyymmdd(columns[4])?;

        let strike_raw: i64 = columns[5].parse().ok()?;
        if strike_raw <= 0 {
            return None;
        }
        let price_raw: i64 = columns[6].parse().ok()?;
        if price_raw < 0 || (price_raw == 0 && kind == EventKind::Trade) {
            return None;
        }
        let size: u64 = columns[7].parse().ok()?;

        Some(MarketEvent {
            instrument: InstrumentIdentity::american(
                underlying,
                expiry,
                unscale_price(strike_raw),
                right,
                self.market.as_str(),
            ),
            time,
            kind,
            price: unscale_price(price_raw),
            size,
            venue: columns[8].to_string(),
            condition: columns[9].to_string(),
        })
    }

    fn event_time(&self, column: &str) -> Option<NaiveDateTime> {
        let millis = parse_millis_of_day(column)?;
        Some(self.reference_date.and_time(NaiveTime::MIN) + Duration::milliseconds(millis))
    }
}

/// Classify a line by the marker byte at [`KIND_OFFSET`].
#[must_use]
pub fn classify(line: &str) -> Option<EventKind> {
    match line.as_bytes().get(KIND_OFFSET)? {
        b'T' => Some(EventKind::Trade),
        b'B' => Some(EventKind::BidQuote),
        b'A' => Some(EventKind::AskQuote),
        _ => None,
    }
}

/// Parse `HH:MM:SS.mmm` into milliseconds since midnight.
fn parse_millis_of_day(column: &str) -> Option<i64> {
    let bytes = column.as_bytes();
    if bytes.len() != TIME_WIDTH || bytes[2] != b':' || bytes[5] != b':' || bytes[8] != b'.' {
        return None;
    }

    let hours = parse_digits(&bytes[0..2])?;
    let minutes = parse_digits(&bytes[3..5])?;
    let seconds = parse_digits(&bytes[6..8])?;
    let millis = parse_digits(&bytes[9..12])?;
    if hours >= 24 || minutes >= 60 || seconds >= 60 {
        return None;
    }

    let total = ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis;
    debug_assert!(total < MILLIS_PER_DAY);
    Some(total)
}

fn parse_yyyymmdd(column: &str) -> Option<NaiveDate> {
    let bytes = column.as_bytes();
    if bytes.len() != 8 {
        return None;
    }
    let year = parse_digits(&bytes[0..4])?;
    let month = parse_digits(&bytes[4..6])?;
    let day = parse_digits(&bytes[6..8])?;
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month as u32, day as u32)
}

fn parse_digits(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(
        bytes
            .iter()
            .fold(0_i64, |acc, b| acc * 10 + i64::from(b - b'0')),
    )
}
