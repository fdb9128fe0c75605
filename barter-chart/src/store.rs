//! Ordered, deduplicated OHLCV storage for a single (symbol, interval) series.
//!
//! Every mutation keeps the series strictly increasing by `time`, enforces the capacity bound
//! by dropping the oldest bars and refreshes the attached indicator values.

use crate::{bar::Bar, indicator::IndicatorEngine};
use itertools::Itertools;
use tracing::debug;

/// Default number of most recent bars retained per series.
pub const DEFAULT_CAPACITY: usize = 1000;

/// How a live tick relates to the newest stored bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TickKind {
    /// Same time bucket as the newest bar, which is replaced in place.
    Amend,
    /// Strictly newer bucket, appended.
    Append,
    /// Older than the newest bar. Discarded, never an error.
    OutOfOrder,
}

/// Classify a tick at `time` against the newest stored bar time.
pub fn classify_tick(last_time: Option<i64>, time: i64) -> TickKind {
    match last_time {
        None => TickKind::Append,
        Some(last) if time == last => TickKind::Amend,
        Some(last) if time > last => TickKind::Append,
        Some(_) => TickKind::OutOfOrder,
    }
}

/// Summary of merging one historical page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Bars in the incoming page.
    pub received: usize,
    /// Bars whose time was not stored yet.
    pub inserted: usize,
    /// Incoming bars discarded because their time was already stored.
    pub duplicates: usize,
    /// Oldest bars dropped to respect the capacity bound.
    pub trimmed: usize,
}

/// Ordered bar series with indicator values kept current.
#[derive(Debug, Clone)]
pub struct BarStore {
    bars: Vec<Bar>,
    capacity: usize,
    engine: IndicatorEngine,
}

impl Default for BarStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl BarStore {
    pub fn new(capacity: usize) -> Self {
        Self::with_engine(capacity, IndicatorEngine::default())
    }

    pub fn with_engine(capacity: usize, engine: IndicatorEngine) -> Self {
        Self {
            bars: Vec::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
            engine,
        }
    }

    /// Merge a page of historical bars, typically older than anything stored.
    ///
    /// The page is placed before the existing bars, then the whole set is re-sorted and
    /// deduplicated by `time`. On a duplicate the stored bar is kept. Returns `None` for an
    /// empty page, which signals a backfill walk to stop.
    pub fn merge(&mut self, mut page: Vec<Bar>) -> Option<MergeOutcome> {
        if page.is_empty() {
            return None;
        }

        page.sort_by_key(|bar| bar.time);
        let received = page.len();
        let before = self.bars.len();

        let mut combined: Vec<Bar> = page
            .into_iter()
            .map(Bar::without_indicators)
            .chain(self.bars.drain(..))
            .collect();

        // Stable sort: for equal times the stored bar follows the incoming one and wins below
        combined.sort_by_key(|bar| bar.time);

        self.bars = combined
            .into_iter()
            .coalesce(|prev, next| {
                if prev.time == next.time {
                    Ok(next)
                } else {
                    Err((prev, next))
                }
            })
            .collect();

        let inserted = self.bars.len() - before;
        let trimmed = self.trim();
        self.engine.recompute_all(&mut self.bars);

        Some(MergeOutcome {
            received,
            inserted,
            duplicates: received - inserted,
            trimmed,
        })
    }

    /// Apply the latest bar from a live feed.
    ///
    /// Equal time amends the newest bar, a strictly greater time appends, an older time is
    /// discarded. Only the affected indicator values are recomputed.
    pub fn apply_live_tick(&mut self, bar: Bar) -> TickKind {
        let bar = bar.without_indicators();
        let kind = classify_tick(self.last().map(|last| last.time), bar.time);

        match kind {
            TickKind::Amend => {
                let last = self.bars.len() - 1;
                self.bars[last] = bar;
                self.engine.recompute_from(&mut self.bars, last);
            }
            TickKind::Append => {
                self.bars.push(bar);
                let trimmed = self.trim();
                let last = self.bars.len() - 1;
                self.engine.recompute_from(&mut self.bars, last);

                if trimmed > 0 {
                    // Head bars lost part of their trailing window
                    self.engine
                        .recompute_range(&mut self.bars, 0, self.engine.lookback().min(last));
                }
            }
            TickKind::OutOfOrder => {
                debug!(
                    tick_time = bar.time,
                    last_time = self.last().map(|last| last.time),
                    "discarding out-of-order live tick"
                );
            }
        }

        kind
    }

    /// Read-only view of the ordered series.
    pub fn snapshot(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn first(&self) -> Option<&Bar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn engine(&self) -> &IndicatorEngine {
        &self.engine
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }

    /// Drop the oldest bars beyond capacity, returning how many were removed.
    fn trim(&mut self) -> usize {
        let excess = self.bars.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.bars.drain(..excess);
        }
        excess
    }
}
