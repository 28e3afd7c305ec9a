//! Market events decoded from channel files.

use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::instrument::InstrumentIdentity;

/// Kind of a raw market event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Executed trade.
    Trade,
    /// Bid side quote update.
    BidQuote,
    /// Ask side quote update.
    AskQuote,
}

impl EventKind {
    /// Consolidation kind this event feeds.
    #[must_use]
    pub const fn data_kind(&self) -> DataKind {
        match self {
            Self::Trade => DataKind::Trade,
            Self::BidQuote | Self::AskQuote => DataKind::Quote,
        }
    }
}

/// Kind of output data a consolidator produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// Trade ticks and trade bars.
    Trade,
    /// Quote ticks and quote bars.
    Quote,
}

impl DataKind {
    /// All kinds, in dispatch-table order.
    pub const ALL: [Self; 2] = [Self::Trade, Self::Quote];

    /// Lower-case name used in file names.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Quote => "quote",
        }
    }

    /// Position of this kind in [`DataKind::ALL`].
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Trade => 0,
            Self::Quote => 1,
        }
    }

    /// Parse the lower-case file name form.
    #[must_use]
    pub fn from_path_name(name: &str) -> Option<Self> {
        match name {
            "trade" => Some(Self::Trade),
            "quote" => Some(Self::Quote),
            _ => None,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single decoded trade or quote.
///
/// Immutable once constructed by the record parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketEvent {
    /// Contract the event belongs to.
    pub instrument: InstrumentIdentity,
    /// Event time (naive UTC).
    pub time: NaiveDateTime,
    /// Trade, bid, or ask.
    pub kind: EventKind,
    /// Trade price, or quoted price for the event's side.
    pub price: Decimal,
    /// Trade size, or quoted size for the event's side.
    pub size: u64,
    /// Reporting venue.
    pub venue: String,
    /// Sale or quote condition, empty when absent.
    pub condition: String,
}
