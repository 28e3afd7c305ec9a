//! Option contract identity.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market the feed is recorded for when the configuration does not override it.
pub const DEFAULT_MARKET: &str = "usa";

/// Option right (put or call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    /// Right to buy.
    Call,
    /// Right to sell.
    Put,
}

impl OptionRight {
    /// Decode the single-byte wire marker (`C` / `P`).
    #[must_use]
    pub const fn from_marker(marker: &str) -> Option<Self> {
        match marker.as_bytes() {
            b"C" => Some(Self::Call),
            b"P" => Some(Self::Put),
            _ => None,
        }
    }

    /// Lower-case name used in file paths.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }

    /// Parse the lower-case path name back into a right.
    #[must_use]
    pub fn from_path_name(name: &str) -> Option<Self> {
        match name {
            "call" => Some(Self::Call),
            "put" => Some(Self::Put),
            _ => None,
        }
    }
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exercise style. This feed only carries American contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OptionStyle {
    /// Exercisable at any time up to expiry.
    #[default]
    American,
    /// Exercisable only at expiry.
    European,
}

impl OptionStyle {
    /// Lower-case name used in file paths.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::American => "american",
            Self::European => "european",
        }
    }
}

/// Identity of one option contract.
///
/// Used as the grouping key for consolidation: two identities are equal
/// only if every field matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentIdentity {
    /// Underlying ticker, upper-case.
    pub underlying: String,
    /// Expiry date.
    pub expiry: NaiveDate,
    /// Strike price.
    pub strike: Decimal,
    /// Put or call.
    pub right: OptionRight,
    /// Exercise style.
    pub style: OptionStyle,
    /// Market the contract trades in.
    pub market: String,
}

impl InstrumentIdentity {
    /// Create an American-style contract identity.
    ///
    /// The underlying is normalized to upper-case.
    #[must_use]
    pub fn american(
        underlying: impl Into<String>,
        expiry: NaiveDate,
        strike: Decimal,
        right: OptionRight,
        market: impl Into<String>,
    ) -> Self {
        Self {
            underlying: underlying.into().to_uppercase(),
            expiry,
            strike,
            right,
            style: OptionStyle::American,
            market: market.into(),
        }
    }

    /// Strike scaled by 10,000 as used by the wire format and file names.
    #[must_use]
    pub fn scaled_strike(&self) -> i64 {
        super::scale_price(self.strike)
    }
}

impl fmt::Display for InstrumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} ({})",
            self.underlying,
            self.expiry.format("%Y%m%d"),
            self.right,
            self.strike.normalize(),
            self.market
        )
    }
}
