//! Archive layout and entry naming.
//!
//! ```text
//! option/usa/minute/spy/20240102_call_4750000_20240119.zip
//!   ├── 20240102_spy_minute_trade_american_call_4750000_20240119.csv
//!   └── 20240102_spy_minute_quote_american_call_4750000_20240119.csv
//! ```

use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;

use crate::domain::{DataKind, InstrumentIdentity, OptionRight, OptionStyle, Resolution, unscale_price};

/// Prefix marking a path component renamed away from a reserved device name.
pub const RESERVED_PREFIX: char = '^';

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const DATE_FORMAT: &str = "%Y%m%d";

/// Maps output targets to archive paths and entry names.
pub trait PathResolver: Send + Sync {
    /// File name of the archive entry holding `kind` data.
    fn entry_name(
        &self,
        instrument: &InstrumentIdentity,
        date: NaiveDate,
        resolution: Resolution,
        kind: DataKind,
    ) -> String;

    /// Archive path relative to the destination root.
    fn relative_archive_path(
        &self,
        instrument: &InstrumentIdentity,
        date: NaiveDate,
        resolution: Resolution,
        kind: DataKind,
    ) -> PathBuf;
}

/// Layout for option contract archives.
///
/// One archive per contract, date and resolution; trade and quote data are
/// separate entries inside it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionPathResolver;

impl PathResolver for OptionPathResolver {
    fn entry_name(
        &self,
        instrument: &InstrumentIdentity,
        date: NaiveDate,
        resolution: Resolution,
        kind: DataKind,
    ) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}_{}_{}.csv",
            date.format(DATE_FORMAT),
            instrument.underlying.to_lowercase(),
            resolution.as_str(),
            kind.as_str(),
            instrument.style.as_str(),
            instrument.right.as_str(),
            instrument.scaled_strike(),
            instrument.expiry.format(DATE_FORMAT),
        )
    }

    fn relative_archive_path(
        &self,
        instrument: &InstrumentIdentity,
        date: NaiveDate,
        resolution: Resolution,
        _kind: DataKind,
    ) -> PathBuf {
        let file = format!(
            "{}_{}_{}_{}.zip",
            date.format(DATE_FORMAT),
            instrument.right.as_str(),
            instrument.scaled_strike(),
            instrument.expiry.format(DATE_FORMAT),
        );
        ["option", instrument.market.as_str(), resolution.as_str()]
            .iter()
            .collect::<PathBuf>()
            .join(instrument.underlying.to_lowercase())
            .join(file)
    }
}

/// Target described by an entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    /// Contract.
    pub instrument: InstrumentIdentity,
    /// Trading date.
    pub date: NaiveDate,
    /// Resolution.
    pub resolution: Resolution,
    /// Trade or quote.
    pub kind: DataKind,
}

/// Read an entry name produced by [`OptionPathResolver`] back.
///
/// Accepts names with a reserved-name prefix on the underlying.
#[must_use]
pub fn parse_entry_name(name: &str, market: &str) -> Option<ParsedEntry> {
    let stem = name.strip_suffix(".csv")?;
    let parts: Vec<&str> = stem.split('_').collect();
    let [date, underlying, resolution, kind, style, right, strike, expiry] = parts.as_slice() else {
        return None;
    };

    if *style != OptionStyle::American.as_str() {
        return None;
    }
    let strike: i64 = strike.parse().ok()?;
    if strike <= 0 {
        return None;
    }

    let instrument = InstrumentIdentity::american(
        denormalize_component(underlying),
        NaiveDate::parse_from_str(expiry, DATE_FORMAT).ok()?,
        unscale_price(strike),
        OptionRight::from_path_name(right)?,
        market,
    );

    Some(ParsedEntry {
        instrument,
        date: NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?,
        resolution: resolution.parse().ok()?,
        kind: DataKind::from_path_name(kind)?,
    })
}

/// Whether `component` would name a reserved device on some platforms.
///
/// Only the part before the first `.` is compared, case-insensitively.
#[must_use]
pub fn is_reserved_name(component: &str) -> bool {
    let stem = component.split('.').next().unwrap_or(component);
    RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
}

/// Prefix a reserved component with [`RESERVED_PREFIX`]. Other names pass through.
#[must_use]
pub fn normalize_component(component: &str) -> String {
    if is_reserved_name(component) {
        format!("{RESERVED_PREFIX}{component}")
    } else {
        component.to_string()
    }
}

/// Undo [`normalize_component`].
#[must_use]
pub fn denormalize_component(component: &str) -> String {
    match component.strip_prefix(RESERVED_PREFIX) {
        Some(rest) if is_reserved_name(rest) => rest.to_string(),
        _ => component.to_string(),
    }
}

/// Apply [`normalize_component`] to every normal component of `path`.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .map(|component| match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                PathBuf::from(normalize_component(&name))
            }
            other => PathBuf::from(other.as_os_str()),
        })
        .collect()
}

/// Normalize the underlying field of an entry name, so a staged entry
/// file is never named after a device.
#[must_use]
pub fn normalize_entry_name(name: &str) -> String {
    let mut fields = name.splitn(3, '_');
    match (fields.next(), fields.next(), fields.next()) {
        (Some(date), Some(underlying), Some(rest)) if is_reserved_name(underlying) => {
            format!("{date}_{RESERVED_PREFIX}{underlying}_{rest}")
        }
        _ => name.to_string(),
    }
}
