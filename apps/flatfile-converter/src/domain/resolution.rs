//! Output resolutions.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Bar resolution, ordered from finest to coarsest.
///
/// `Tick` means no consolidation: every event is passed through unchanged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Every event.
    Tick,
    /// One-second bars.
    Second,
    /// One-minute bars.
    #[default]
    Minute,
    /// One-hour bars.
    Hour,
    /// One-day bars.
    Daily,
}

impl Resolution {
    /// All resolutions, in dispatch-table order.
    pub const ALL: [Self; 5] = [
        Self::Tick,
        Self::Second,
        Self::Minute,
        Self::Hour,
        Self::Daily,
    ];

    /// Bar period, `None` for tick resolution.
    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        match self {
            Self::Tick => None,
            Self::Second => Some(Duration::seconds(1)),
            Self::Minute => Some(Duration::minutes(1)),
            Self::Hour => Some(Duration::hours(1)),
            Self::Daily => Some(Duration::days(1)),
        }
    }

    /// Start of the interval containing `time`.
    ///
    /// Intervals are aligned to midnight of the event's date. Tick
    /// resolution returns `time` unchanged.
    #[must_use]
    pub fn floor(&self, time: NaiveDateTime) -> NaiveDateTime {
        let Some(period) = self.period() else {
            return time;
        };
        let midnight = time.date().and_time(NaiveTime::MIN);
        let period_ms = period.num_milliseconds();
        let offset_ms = (time - midnight).num_milliseconds();
        midnight + Duration::milliseconds(offset_ms - offset_ms % period_ms)
    }

    /// Lower-case name used in paths and config.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tick => "tick",
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Daily => "daily",
        }
    }

    /// Position of this resolution in [`Resolution::ALL`].
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Tick => 0,
            Self::Second => 1,
            Self::Minute => 2,
            Self::Hour => 3,
            Self::Daily => 4,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tick" => Ok(Self::Tick),
            "second" => Ok(Self::Second),
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "daily" | "day" => Ok(Self::Daily),
            other => Err(format!("unknown resolution '{other}'")),
        }
    }
}
