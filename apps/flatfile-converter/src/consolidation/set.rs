//! Fixed dispatch table of consolidators for one contract.

use chrono::NaiveDateTime;

use super::consolidator::BarConsolidator;
use crate::domain::{Bar, DataKind, InstrumentIdentity, MarketEvent, Resolution};
use crate::error::Result;
use crate::output::OutputContext;

const SLOTS: usize = DataKind::ALL.len() * Resolution::ALL.len();

const fn slot(kind: DataKind, resolution: Resolution) -> usize {
    kind.index() * Resolution::ALL.len() + resolution.index()
}

/// Every consolidator for one contract, one per requested
/// (kind, resolution) pair.
///
/// Built once on the contract's first event and kept for the whole run.
#[derive(Debug)]
pub struct ConsolidatorSet {
    instrument: InstrumentIdentity,
    table: [Option<BarConsolidator>; SLOTS],
}

impl ConsolidatorSet {
    /// Build the set for `instrument` at every resolution in `resolutions`.
    #[must_use]
    pub fn new(instrument: InstrumentIdentity, resolutions: &[Resolution]) -> Self {
        let mut table: [Option<BarConsolidator>; SLOTS] = std::array::from_fn(|_| None);
        for kind in DataKind::ALL {
            for &resolution in resolutions {
                table[slot(kind, resolution)] =
                    Some(BarConsolidator::new(instrument.clone(), kind, resolution));
            }
        }
        Self { instrument, table }
    }

    /// Contract the set belongs to.
    #[must_use]
    pub const fn instrument(&self) -> &InstrumentIdentity {
        &self.instrument
    }

    /// Number of consolidators in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.iter().flatten().count()
    }

    /// Whether the set holds no consolidators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consolidator for one (kind, resolution), if requested.
    #[must_use]
    pub fn get(&self, kind: DataKind, resolution: Resolution) -> Option<&BarConsolidator> {
        self.table[slot(kind, resolution)].as_ref()
    }

    /// Route an event to the consolidators of its kind.
    pub fn process(&mut self, event: &MarketEvent) {
        let kind = event.kind.data_kind();
        for resolution in Resolution::ALL {
            if let Some(consolidator) = self.table[slot(kind, resolution)].as_mut() {
                consolidator.process(event);
            }
        }
    }

    /// Flush every consolidator. Returns the number of bars written.
    pub fn flush(
        &mut self,
        frontier: NaiveDateTime,
        final_flush: bool,
        output: Option<&OutputContext<'_>>,
    ) -> Result<usize> {
        let mut written = 0;
        for consolidator in self.table.iter_mut().flatten() {
            written += consolidator.flush(frontier, final_flush, output)?;
        }
        Ok(written)
    }

    /// Take the queued bars of one (kind, resolution).
    pub fn take_pending(&mut self, kind: DataKind, resolution: Resolution) -> Vec<Bar> {
        self.table[slot(kind, resolution)]
            .as_mut()
            .map(BarConsolidator::take_pending)
            .unwrap_or_default()
    }

    /// Bars written to staged files, summed over the set.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.table.iter().flatten().map(BarConsolidator::written).sum()
    }

    /// Bars still queued, summed over the set.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.table.iter().flatten().map(BarConsolidator::pending_len).sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::{DEFAULT_MARKET, EventKind, OptionRight};

    fn contract() -> InstrumentIdentity {
        InstrumentIdentity::american(
            "QQQ",
            NaiveDate::from_ymd_opt(2024, 2, 16).unwrap(),
            dec!(400),
            OptionRight::Put,
            DEFAULT_MARKET,
        )
    }

    fn event(kind: EventKind, minute: u32) -> MarketEvent {
        MarketEvent {
            instrument: contract(),
            time: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(10, minute, 0)
                .unwrap(),
            kind,
            price: dec!(3.5),
            size: 2,
            venue: "ISE".to_string(),
            condition: String::new(),
        }
    }

    #[test]
    fn test_slots_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in DataKind::ALL {
            for resolution in Resolution::ALL {
                assert!(seen.insert(slot(kind, resolution)));
            }
        }
        assert_eq!(seen.len(), SLOTS);
    }

    #[test]
    fn test_builds_requested_cross_product() {
        let set = ConsolidatorSet::new(contract(), &[Resolution::Minute, Resolution::Tick]);
        assert_eq!(set.len(), 4);
        assert!(set.get(DataKind::Quote, Resolution::Tick).is_some());
        assert!(set.get(DataKind::Trade, Resolution::Hour).is_none());
    }

    #[test]
    fn test_dispatch_by_kind() {
        let mut set = ConsolidatorSet::new(contract(), &[Resolution::Tick, Resolution::Minute]);
        set.process(&event(EventKind::Trade, 0));
        set.process(&event(EventKind::BidQuote, 0));
        set.process(&event(EventKind::AskQuote, 1));

        assert_eq!(set.take_pending(DataKind::Trade, Resolution::Tick).len(), 1);
        assert_eq!(set.take_pending(DataKind::Quote, Resolution::Tick).len(), 2);

        set.flush(NaiveDateTime::MAX, true, None).unwrap();
        assert_eq!(set.take_pending(DataKind::Trade, Resolution::Minute).len(), 1);
        assert_eq!(set.take_pending(DataKind::Quote, Resolution::Minute).len(), 2);
        assert_eq!(set.pending(), 0);
        assert!(set.take_pending(DataKind::Trade, Resolution::Daily).is_empty());
    }
}
