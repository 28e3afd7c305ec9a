//! Per-key bar aggregation.

use std::collections::VecDeque;

use chrono::NaiveDateTime;
use tracing::trace;

use crate::domain::{Bar, DataKind, InstrumentIdentity, MarketEvent, QuoteBar, Resolution, TradeBar};
use crate::error::Result;
use crate::observability::record_bars_written;
use crate::output::{OutputContext, OutputSink};

/// Folds events of one kind for one contract into bars of one resolution.
///
/// Closed bars queue up in chronological order until flushed. A bar leaves
/// the queue only after it has been written, so a failed flush loses
/// nothing.
#[derive(Debug)]
pub struct BarConsolidator {
    instrument: InstrumentIdentity,
    kind: DataKind,
    resolution: Resolution,
    working: Option<Bar>,
    pending: VecDeque<Bar>,
    written: u64,
}

impl BarConsolidator {
    /// Create an idle consolidator.
    #[must_use]
    pub const fn new(instrument: InstrumentIdentity, kind: DataKind, resolution: Resolution) -> Self {
        Self {
            instrument,
            kind,
            resolution,
            working: None,
            pending: VecDeque::new(),
            written: 0,
        }
    }

    /// Contract this consolidator aggregates.
    #[must_use]
    pub const fn instrument(&self) -> &InstrumentIdentity {
        &self.instrument
    }

    /// Kind of data consumed and produced.
    #[must_use]
    pub const fn kind(&self) -> DataKind {
        self.kind
    }

    /// Output resolution.
    #[must_use]
    pub const fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Whether an interval is currently open.
    #[must_use]
    pub const fn is_accumulating(&self) -> bool {
        self.working.is_some()
    }

    /// Closed bars waiting to be flushed.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Bars written to staged files so far.
    #[must_use]
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Fold one event. Events of another kind are ignored.
    pub fn process(&mut self, event: &MarketEvent) {
        if event.kind.data_kind() != self.kind {
            return;
        }

        let Some(period) = self.resolution.period() else {
            self.pending.push_back(Bar::Tick(event.clone()));
            return;
        };

        if self
            .working
            .as_ref()
            .is_some_and(|bar| event.time >= bar_end(bar))
        {
            self.close();
        }

        match self.working.as_mut() {
            Some(Bar::Trade(bar)) => bar.update(event),
            Some(Bar::Quote(bar)) => bar.update(event),
            Some(Bar::Tick(_)) => {}
            None => {
                let start = self.resolution.floor(event.time);
                self.working = Some(match self.kind {
                    DataKind::Trade => Bar::Trade(TradeBar::open(event, start, period)),
                    DataKind::Quote => Bar::Quote(QuoteBar::open(event, start, period)),
                });
            }
        }
    }

    /// Close the open bar if its interval has fully elapsed at `frontier`.
    pub fn scan(&mut self, frontier: NaiveDateTime) {
        if self
            .working
            .as_ref()
            .is_some_and(|bar| frontier >= bar_end(bar))
        {
            self.close();
        }
    }

    /// Scan, optionally force-close the open bar, then drain.
    ///
    /// With an output context the queue is written to this key's staged
    /// entry file; without one (in-memory mode) the bars stay queued for
    /// [`take_pending`](Self::take_pending). Returns the number of bars
    /// written.
    pub fn flush(
        &mut self,
        frontier: NaiveDateTime,
        final_flush: bool,
        output: Option<&OutputContext<'_>>,
    ) -> Result<usize> {
        self.scan(frontier);
        if final_flush {
            self.close();
        }

        let Some(context) = output else {
            return Ok(0);
        };
        if self.pending.is_empty() {
            return Ok(0);
        }

        let mut sink = OutputSink::open(context, &self.instrument, self.resolution, self.kind)?;
        for bar in &self.pending {
            let line = context.formatter.format(bar, self.kind, self.resolution);
            sink.write_line(&line)?;
        }
        let count = sink.finish()? as usize;
        self.pending.drain(..count);
        self.written += count as u64;

        record_bars_written(self.resolution.as_str(), self.kind.as_str(), count as u64);
        trace!(
            instrument = %self.instrument,
            kind = %self.kind,
            resolution = %self.resolution,
            bars = count,
            "Flushed bars"
        );
        Ok(count)
    }

    /// Hand over every queued bar, oldest first.
    pub fn take_pending(&mut self) -> Vec<Bar> {
        self.pending.drain(..).collect()
    }

    fn close(&mut self) {
        if let Some(bar) = self.working.take() {
            self.pending.push_back(bar);
        }
    }
}

fn bar_end(bar: &Bar) -> NaiveDateTime {
    match bar {
        Bar::Trade(bar) => bar.end_time(),
        Bar::Quote(bar) => bar.end_time(),
        Bar::Tick(event) => event.time,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    use super::*;
    use crate::domain::{DEFAULT_MARKET, EventKind, OptionRight};
    use crate::output::{CsvLineFormatter, OptionPathResolver};

    fn contract() -> InstrumentIdentity {
        InstrumentIdentity::american(
            "SPY",
            NaiveDate::from_ymd_opt(2024, 1, 19).unwrap(),
            dec!(475),
            OptionRight::Call,
            DEFAULT_MARKET,
        )
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn event(kind: EventKind, time: NaiveDateTime, price: Decimal, size: u64) -> MarketEvent {
        MarketEvent {
            instrument: contract(),
            time,
            kind,
            price,
            size,
            venue: "CBOE".to_string(),
            condition: String::new(),
        }
    }

    fn trade(time: NaiveDateTime, price: Decimal) -> MarketEvent {
        event(EventKind::Trade, time, price, 1)
    }

    #[test]
    fn test_ignores_other_kind() {
        let mut c = BarConsolidator::new(contract(), DataKind::Trade, Resolution::Minute);
        c.process(&event(EventKind::BidQuote, at(9, 30, 0), dec!(1), 1));
        assert!(!c.is_accumulating());
        c.flush(at(23, 0, 0), true, None).unwrap();
        assert_eq!(c.pending_len(), 0);
    }

    #[test]
    fn test_tick_pass_through() {
        let mut c = BarConsolidator::new(contract(), DataKind::Quote, Resolution::Tick);
        let events = [
            event(EventKind::BidQuote, at(9, 30, 0), dec!(1.1), 3),
            event(EventKind::AskQuote, at(9, 30, 0), dec!(1.2), 4),
            event(EventKind::BidQuote, at(9, 30, 1), dec!(1.15), 5),
        ];
        for e in &events {
            c.process(e);
        }

        let bars = c.take_pending();
        assert_eq!(bars.len(), events.len());
        for (bar, e) in bars.iter().zip(&events) {
            assert_eq!(bar, &Bar::Tick(e.clone()));
        }
    }

    #[test]
    fn test_boundary_crossing_closes_bar() {
        let mut c = BarConsolidator::new(contract(), DataKind::Trade, Resolution::Minute);
        c.process(&trade(at(9, 30, 5), dec!(1)));
        c.process(&trade(at(9, 30, 59), dec!(2)));
        assert_eq!(c.pending_len(), 0);

        c.process(&trade(at(9, 31, 0), dec!(3)));
        let bars = c.take_pending();
        assert_eq!(bars.len(), 1);
        let Bar::Trade(bar) = &bars[0] else {
            panic!("expected trade bar");
        };
        assert_eq!(bar.time, at(9, 30, 0));
        assert_eq!(bar.period, Duration::minutes(1));
        assert_eq!(bar.ohlc.close, dec!(2));
        assert_eq!(bar.volume, 2);
        assert!(c.is_accumulating());
    }

    #[test]
    fn test_scan_closes_elapsed_interval() {
        let mut c = BarConsolidator::new(contract(), DataKind::Trade, Resolution::Minute);
        c.process(&trade(at(9, 30, 5), dec!(1)));

        c.scan(at(9, 30, 59));
        assert_eq!(c.pending_len(), 0);
        c.scan(at(9, 31, 0));
        assert_eq!(c.pending_len(), 1);
        assert!(!c.is_accumulating());
    }

    #[test]
    fn test_flush_is_idempotent() {
        let mut c = BarConsolidator::new(contract(), DataKind::Trade, Resolution::Minute);
        c.process(&trade(at(9, 30, 5), dec!(1)));
        c.process(&trade(at(9, 32, 5), dec!(1)));

        c.flush(at(9, 35, 0), false, None).unwrap();
        let first = c.take_pending();
        c.flush(at(9, 35, 0), false, None).unwrap();
        assert_eq!(first.len(), 2);
        assert!(c.take_pending().is_empty());
    }

    #[test]
    fn test_final_flush_emits_partial_bar() {
        let mut c = BarConsolidator::new(contract(), DataKind::Quote, Resolution::Hour);
        c.process(&event(EventKind::AskQuote, at(15, 59, 59), dec!(2), 1));

        c.flush(at(15, 59, 59), false, None).unwrap();
        assert_eq!(c.pending_len(), 0);

        c.flush(NaiveDateTime::MAX, true, None).unwrap();
        assert!(!c.is_accumulating());
        let bars = c.take_pending();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].time(), at(15, 0, 0));
        assert_eq!(c.pending_len(), 0);
    }

    #[test]
    fn test_staged_flush_writes_then_dequeues() {
        let dir = tempdir().unwrap();
        let context = OutputContext {
            staging_root: dir.path(),
            date: at(0, 0, 0).date(),
            resolver: &OptionPathResolver,
            formatter: &CsvLineFormatter,
        };
        let mut c = BarConsolidator::new(contract(), DataKind::Trade, Resolution::Minute);
        c.process(&trade(at(9, 30, 5), dec!(1)));
        c.process(&trade(at(9, 31, 5), dec!(2)));

        assert_eq!(c.flush(at(9, 31, 5), false, Some(&context)).unwrap(), 1);
        assert_eq!(c.flush(at(9, 31, 5), false, Some(&context)).unwrap(), 0);
        assert_eq!(c.flush(NaiveDateTime::MAX, true, Some(&context)).unwrap(), 1);
        assert_eq!(c.pending_len(), 0);
        assert_eq!(c.written(), 2);

        let sink = OutputSink::open(&context, &contract(), Resolution::Minute, DataKind::Trade).unwrap();
        let text = std::fs::read_to_string(sink.path()).unwrap();
        assert_eq!(text, "34200000,10000,10000,10000,10000,1\n34260000,20000,20000,20000,20000,1\n");
    }

    #[test]
    fn test_staged_flush_failure_keeps_queue() {
        let dir = tempdir().unwrap();
        // A file where the staging root should be makes directory creation fail.
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, "").unwrap();
        let context = OutputContext {
            staging_root: &blocked,
            date: at(0, 0, 0).date(),
            resolver: &OptionPathResolver,
            formatter: &CsvLineFormatter,
        };
        let mut c = BarConsolidator::new(contract(), DataKind::Trade, Resolution::Minute);
        c.process(&trade(at(9, 30, 5), dec!(1)));

        assert!(c.flush(NaiveDateTime::MAX, true, Some(&context)).is_err());
        assert_eq!(c.pending_len(), 1);
    }
}
