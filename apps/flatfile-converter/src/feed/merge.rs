//! N-way merge of time-ordered sources.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::domain::MarketEvent;
use crate::error::{ConvertError, Result};
use crate::observability::record_out_of_order;

/// Head of one source, ordered for a min-heap by (time, source index).
#[derive(Debug)]
struct HeapEntry {
    event: MarketEvent,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.event.time == other.event.time && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest time, then lowest source)
        other
            .event
            .time
            .cmp(&self.event.time)
            .then_with(|| other.source.cmp(&self.source))
    }
}

#[derive(Debug, Default)]
struct SourceState {
    name: String,
    last_time: Option<NaiveDateTime>,
    out_of_order: u64,
    active: bool,
}

/// A source that stopped with an error.
#[derive(Debug)]
pub struct SourceFailure {
    /// Source name.
    pub source: String,
    /// Error that removed it from the merge.
    pub error: ConvertError,
}

/// Merges sources that are each non-decreasing in time into one
/// non-decreasing sequence.
///
/// Events at equal times are emitted in source order. An event earlier than
/// the previous event of the same source is dropped and counted. A source
/// that fails is removed and the rest continue.
pub struct StreamMerger<S> {
    sources: Vec<S>,
    states: Vec<SourceState>,
    heap: BinaryHeap<HeapEntry>,
    failures: Vec<SourceFailure>,
    emitted: u64,
    primed: bool,
}

impl<S> std::fmt::Debug for StreamMerger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamMerger")
            .field("sources", &self.sources.len())
            .field("states", &self.states)
            .field("heap_len", &self.heap.len())
            .field("failures", &self.failures)
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl<S> StreamMerger<S>
where
    S: Iterator<Item = Result<MarketEvent>>,
{
    /// Create a merger over named sources.
    pub fn new(sources: impl IntoIterator<Item = (String, S)>) -> Self {
        let (states, sources): (Vec<_>, Vec<_>) = sources
            .into_iter()
            .map(|(name, source)| {
                let state = SourceState {
                    name,
                    active: true,
                    ..SourceState::default()
                };
                (state, source)
            })
            .unzip();

        Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            states,
            failures: Vec::new(),
            emitted: 0,
            primed: false,
        }
    }

    /// Number of sources the merger was built with.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Sources that have neither ended nor failed.
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.states.iter().filter(|s| s.active).count()
    }

    /// Events emitted so far.
    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Out-of-order events dropped, summed over all sources.
    #[must_use]
    pub fn out_of_order(&self) -> u64 {
        self.states.iter().map(|s| s.out_of_order).sum()
    }

    /// Sources removed because they failed.
    #[must_use]
    pub fn failures(&self) -> &[SourceFailure] {
        &self.failures
    }

    /// The wrapped sources, in construction order.
    #[must_use]
    pub fn sources(&self) -> &[S] {
        &self.sources
    }

    /// Consume the merger, returning its failures.
    #[must_use]
    pub fn into_failures(self) -> Vec<SourceFailure> {
        self.failures
    }

    /// Pull the next in-order event from source `index` into the heap.
    fn refill(&mut self, index: usize) {
        loop {
            let Some(item) = self.sources[index].next() else {
                let state = &mut self.states[index];
                state.active = false;
                debug!(source = %state.name, out_of_order = state.out_of_order, "Source exhausted");
                return;
            };

            let state = &mut self.states[index];
            let event = match item {
                Ok(event) => event,
                Err(error) => {
                    state.active = false;
                    warn!(source = %state.name, error = %error, "Source removed from merge");
                    self.failures.push(SourceFailure {
                        source: state.name.clone(),
                        error,
                    });
                    return;
                }
            };

            if let Some(last) = state.last_time
                && event.time < last
            {
                state.out_of_order += 1;
                record_out_of_order(&state.name);
                if state.out_of_order == 1 {
                    warn!(
                        source = %state.name,
                        time = %event.time,
                        previous = %last,
                        "Dropping out-of-order event"
                    );
                }
                continue;
            }

            state.last_time = Some(event.time);
            self.heap.push(HeapEntry {
                event,
                source: index,
            });
            return;
        }
    }

    fn prime(&mut self) {
        for index in 0..self.sources.len() {
            self.refill(index);
        }
        self.primed = true;
    }
}

impl<S> Iterator for StreamMerger<S>
where
    S: Iterator<Item = Result<MarketEvent>>,
{
    type Item = MarketEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.primed {
            self.prime();
        }
        let HeapEntry { event, source } = self.heap.pop()?;
        self.refill(source);
        self.emitted += 1;
        Some(event)
    }
}
