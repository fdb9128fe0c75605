//! Chart session owning the series of one (symbol, interval) pair at a time.
//!
//! Each call to [`ChartSession::switch`] bumps a generation counter, aborts the previous
//! backfill and live pump, clears the series and starts both again for the new key. Work that
//! completes for an older generation is discarded before it can touch the store.

use crate::{
    backfill::{BackfillCoordinator, BackfillReport},
    bar::{Bar, SeriesKey},
    config::ChartConfig,
    live::{LiveStats, LiveUpdatePump},
    source::MarketDataSource,
    store::BarStore,
};
use parking_lot::Mutex;
use std::{ops::ControlFlow, sync::Arc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Cloned view of a session, safe to render without holding any lock.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSnapshot {
    pub key: Option<SeriesKey>,
    pub generation: u64,
    pub bars: Vec<Bar>,
    pub backfill: BackfillReport,
    pub live: LiveStats,
}

/// Mutable state behind the session lock.
#[derive(Debug)]
pub struct SeriesState {
    pub key: Option<SeriesKey>,
    pub generation: u64,
    pub store: BarStore,
    pub backfill: BackfillReport,
    pub live: LiveStats,
}

impl SeriesState {
    fn new(capacity: usize) -> Self {
        Self {
            key: None,
            generation: 0,
            store: BarStore::new(capacity),
            backfill: BackfillReport::default(),
            live: LiveStats::default(),
        }
    }

    fn reset(&mut self, key: Option<SeriesKey>) {
        self.key = key;
        self.generation += 1;
        self.store.clear();
        self.backfill = BackfillReport::default();
        self.live = LiveStats::default();
    }
}

/// Shared handle to a session's [`SeriesState`].
#[derive(Debug, Clone)]
pub struct SharedSeries(Arc<Mutex<SeriesState>>);

impl SharedSeries {
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(SeriesState::new(capacity))))
    }

    pub fn generation(&self) -> u64 {
        self.0.lock().generation
    }

    /// Run `apply` against the state only if `generation` is still the live one.
    ///
    /// The lock is held for the duration of `apply`, so a merge and a live tick never
    /// interleave. Returns `None` when the result was stale and dropped.
    pub fn apply_current<T>(
        &self,
        generation: u64,
        apply: impl FnOnce(&mut SeriesState) -> T,
    ) -> Option<T> {
        let mut state = self.0.lock();
        if state.generation != generation {
            debug!(
                generation,
                current = state.generation,
                "discarding stale response after session switch"
            );
            return None;
        }
        Some(apply(&mut state))
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        let state = self.0.lock();
        ChartSnapshot {
            key: state.key.clone(),
            generation: state.generation,
            bars: state.store.snapshot().to_vec(),
            backfill: state.backfill.clone(),
            live: state.live.clone(),
        }
    }

    fn reset(&self, key: Option<SeriesKey>) -> u64 {
        let mut state = self.0.lock();
        state.reset(key);
        state.generation
    }
}

/// Drives backfill and live updates of the currently selected series.
#[derive(Debug)]
pub struct ChartSession<Source: ?Sized> {
    source: Arc<Source>,
    config: ChartConfig,
    series: SharedSeries,
    task: Option<JoinHandle<()>>,
}

impl<Source> ChartSession<Source>
where
    Source: MarketDataSource + ?Sized + 'static,
{
    pub fn new(source: Arc<Source>, config: ChartConfig) -> Self {
        let series = SharedSeries::new(config.capacity);
        Self {
            source,
            config,
            series,
            task: None,
        }
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn series(&self) -> &SharedSeries {
        &self.series
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        self.series.snapshot()
    }

    /// Discard the current series and start loading `key`. Returns the new generation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn switch(&mut self, key: SeriesKey) -> u64 {
        self.abort_task();
        let generation = self.series.reset(Some(key.clone()));

        info!(series = %key, generation, "starting chart session");

        let backfill = run_backfill(
            Arc::clone(&self.source),
            self.series.clone(),
            BackfillCoordinator::new(key.clone(), &self.config),
            generation,
        );
        let live = run_live(
            Arc::clone(&self.source),
            self.series.clone(),
            LiveUpdatePump::new(key, &self.config),
            generation,
        );

        self.task = Some(tokio::spawn(async move {
            futures::join!(backfill, live);
        }));

        generation
    }

    /// Cancel backfill and live updates, leaving an empty series.
    pub fn stop(&mut self) {
        self.abort_task();
        let generation = self.series.reset(None);
        debug!(generation, "chart session stopped");
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl<Source: ?Sized> Drop for ChartSession<Source> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_backfill<Source>(
    source: Arc<Source>,
    series: SharedSeries,
    mut coordinator: BackfillCoordinator,
    generation: u64,
) where
    Source: MarketDataSource + ?Sized,
{
    while let Some(request) = coordinator.next_request() {
        let result = source.fetch_history(&request).await;

        let applied = series.apply_current(generation, |state| {
            match result {
                Ok(page) => {
                    coordinator.on_page(page, &mut state.store);
                }
                Err(error) => coordinator.on_failure(error),
            }
            state.backfill = coordinator.report().clone();
        });

        if applied.is_none() {
            return;
        }
    }
}

async fn run_live<Source>(
    source: Arc<Source>,
    series: SharedSeries,
    pump: LiveUpdatePump,
    generation: u64,
) where
    Source: MarketDataSource + ?Sized,
{
    pump.run(
        source.as_ref(),
        |bar| match series.apply_current(generation, |state| {
            let kind = state.store.apply_live_tick(bar);
            state.live.record(kind);
        }) {
            Some(()) => ControlFlow::Continue(()),
            None => ControlFlow::Break(()),
        },
        |error| match series.apply_current(generation, |state| state.live.record_failure(error)) {
            Some(()) => ControlFlow::Continue(()),
            None => ControlFlow::Break(()),
        },
    )
    .await;
}
