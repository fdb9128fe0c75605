//! Paginated historical backfill walking backwards in time.
//!
//! `Idle -> Fetching -> (MorePages -> Fetching)* -> Done | Failed`
//!
//! The walk stops on the first page the feed returns without rows, once the page budget is spent, or on the first
//! failed request. Bars merged before a failure are kept: partial history is not fatal.

use crate::{
    bar::SeriesKey,
    config::ChartConfig,
    error::ChartError,
    source::{HistoryRequest, KlinePage, MarketDataSource},
    store::BarStore,
};
use smol_str::SmolStr;
use tracing::{debug, info, warn};

/// Why a backfill walk completed successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackfillStop {
    /// The feed returned no rows.
    EmptyPage,
    /// The configured number of pages was fetched.
    PageBudget,
    /// No row of the last page carried a readable start time to continue from.
    Undated,
}

/// Backfill state machine position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackfillState {
    #[default]
    Idle,
    Fetching {
        page: usize,
    },
    MorePages {
        next_start_ms: i64,
    },
    Done(BackfillStop),
    Failed(ChartError),
}

impl BackfillState {
    pub fn is_finished(&self) -> bool {
        matches!(self, BackfillState::Done(_) | BackfillState::Failed(_))
    }
}

/// Running totals of a backfill walk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackfillReport {
    pub state: BackfillState,
    pub pages: usize,
    pub bars_received: usize,
    pub bars_inserted: usize,
    pub malformed: usize,
}

/// Drives repeated historical page requests for one series into a [`BarStore`].
#[derive(Debug, Clone)]
pub struct BackfillCoordinator {
    key: SeriesKey,
    category: SmolStr,
    page_size: usize,
    page_budget: usize,
    report: BackfillReport,
}

impl BackfillCoordinator {
    pub fn new(key: SeriesKey, config: &ChartConfig) -> Self {
        Self {
            key,
            category: config.category.clone(),
            page_size: config.page_size.max(1),
            page_budget: config.page_budget,
            report: BackfillReport::default(),
        }
    }

    pub fn state(&self) -> &BackfillState {
        &self.report.state
    }

    pub fn report(&self) -> &BackfillReport {
        &self.report
    }

    /// Next page request, if the walk should continue.
    ///
    /// The first request asks for the most recent page, later ones resume from the start time
    /// computed by the previous [`on_page`](Self::on_page).
    pub fn next_request(&mut self) -> Option<HistoryRequest> {
        let start_time_ms = match self.report.state {
            BackfillState::Idle if self.page_budget == 0 => {
                self.report.state = BackfillState::Done(BackfillStop::PageBudget);
                return None;
            }
            BackfillState::Idle => None,
            BackfillState::MorePages { next_start_ms } => Some(next_start_ms),
            _ => return None,
        };

        self.report.state = BackfillState::Fetching {
            page: self.report.pages + 1,
        };

        Some(HistoryRequest {
            symbol: self.key.symbol.clone(),
            interval: self.key.interval,
            limit: self.page_size,
            category: self.category.clone(),
            start_time_ms,
        })
    }

    /// Merge a received page and decide whether to fetch another.
    pub fn on_page(&mut self, page: KlinePage, store: &mut BarStore) -> &BackfillState {
        if !matches!(self.report.state, BackfillState::Fetching { .. }) {
            debug!(series = %self.key, state = ?self.report.state, "ignoring unexpected backfill page");
            return &self.report.state;
        }

        self.report.pages += 1;
        self.report.malformed += page.malformed;

        // Only a page the feed sent empty ends the walk; malformed rows still advance it
        if page.is_empty() {
            self.finish(BackfillStop::EmptyPage);
            return &self.report.state;
        }

        let earliest = page.earliest_start_ms;
        let received = page.bars.len();
        let outcome = store.merge(page.bars).unwrap_or_default();

        self.report.bars_received += received;
        self.report.bars_inserted += outcome.inserted;

        debug!(
            series = %self.key,
            page = self.report.pages,
            rows = page.rows,
            received,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "merged backfill page"
        );

        match earliest {
            Some(earliest) if self.report.pages < self.page_budget => {
                let span = self.key.interval.duration_ms() * self.page_size as i64;
                self.report.state = BackfillState::MorePages {
                    next_start_ms: earliest - span,
                };
            }
            Some(_) => self.finish(BackfillStop::PageBudget),
            None => {
                warn!(
                    series = %self.key,
                    page = self.report.pages,
                    rows = page.rows,
                    "backfill page has no readable start time, cannot paginate further"
                );
                self.finish(BackfillStop::Undated);
            }
        }

        &self.report.state
    }

    /// Abort the walk after a failed request, keeping whatever was merged.
    pub fn on_failure(&mut self, error: ChartError) {
        warn!(
            series = %self.key,
            page = self.report.pages + 1,
            bars = self.report.bars_inserted,
            %error,
            "backfill aborted, keeping partial history"
        );
        self.report.state = BackfillState::Failed(error);
    }

    /// Walk the whole backfill against a store the caller owns exclusively.
    pub async fn run<Source>(mut self, source: &Source, store: &mut BarStore) -> BackfillReport
    where
        Source: MarketDataSource + ?Sized,
    {
        while let Some(request) = self.next_request() {
            match source.fetch_history(&request).await {
                Ok(page) => {
                    self.on_page(page, store);
                }
                Err(error) => self.on_failure(error),
            }
        }
        self.report
    }

    fn finish(&mut self, stop: BackfillStop) {
        info!(
            series = %self.key,
            pages = self.report.pages,
            bars = self.report.bars_inserted,
            malformed = self.report.malformed,
            ?stop,
            "backfill complete"
        );
        self.report.state = BackfillState::Done(stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bar::{Bar, test_utils::bar},
        interval::Interval,
        source::test_utils::ScriptedSource,
    };

    const NOW: i64 = 1_700_000_000_000;

    fn key() -> SeriesKey {
        SeriesKey::new(SmolStr::new("BTCUSDT"), Interval::M1)
    }

    /// `count` one minute bars ending at `end` (inclusive), newest first like the exchange.
    fn page_ending(end: i64, count: usize) -> KlinePage {
        let bars: Vec<Bar> = (0..count)
            .map(|i| bar(end - i as i64 * 60_000, 100.0 + i as f64))
            .collect();
        KlinePage::new(bars)
    }

    #[tokio::test]
    async fn test_backfill_stops_on_empty_page() {
        let source = ScriptedSource::with_history(vec![
            Ok(page_ending(NOW, 3)),
            Ok(page_ending(NOW - 3 * 60_000, 3)),
            Ok(KlinePage::default()),
        ]);
        let config = ChartConfig::default().with_page_size(3);
        let mut store = BarStore::default();

        let report = BackfillCoordinator::new(key(), &config)
            .run(&source, &mut store)
            .await;

        assert_eq!(report.state, BackfillState::Done(BackfillStop::EmptyPage));
        assert_eq!(report.pages, 3);
        assert_eq!(report.bars_inserted, 6);
        assert_eq!(store.len(), 6);
        assert_eq!(source.requests.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_backfill_full_pages_terminate_on_budget() {
        // A feed that always returns `limit` bars never produces an empty page
        let source = ScriptedSource::default().history_fallback(Ok(page_ending(NOW, 200)));
        let config = ChartConfig::default();
        let mut store = BarStore::default();

        let report = BackfillCoordinator::new(key(), &config)
            .run(&source, &mut store)
            .await;

        assert_eq!(report.state, BackfillState::Done(BackfillStop::PageBudget));
        assert_eq!(report.pages, 5);
        assert_eq!(source.requests.lock().len(), 5);
    }

    #[tokio::test]
    async fn test_backfill_request_pagination() {
        let source = ScriptedSource::with_history(vec![
            Ok(page_ending(NOW, 200)),
            Ok(page_ending(NOW - 200 * 60_000, 200)),
        ]);
        let config = ChartConfig::default().with_page_budget(2);
        let mut store = BarStore::default();

        BackfillCoordinator::new(key(), &config)
            .run(&source, &mut store)
            .await;

        let requests = source.requests.lock();
        assert_eq!(requests[0].start_time_ms, None);
        assert_eq!(requests[0].limit, 200);
        assert_eq!(requests[0].category, "linear");

        // earliest bar of page one minus interval * page size
        let earliest = NOW - 199 * 60_000;
        assert_eq!(requests[1].start_time_ms, Some(earliest - 200 * 60_000));
        assert_eq!(store.len(), 400);
    }

    #[tokio::test]
    async fn test_backfill_failure_keeps_partial_history() {
        let source = ScriptedSource::with_history(vec![
            Ok(page_ending(NOW, 5)),
            Err(ChartError::Fetch("connection reset".to_string())),
            Ok(page_ending(NOW - 5 * 60_000, 5)),
        ]);
        let config = ChartConfig::default().with_page_size(5);
        let mut store = BarStore::default();

        let report = BackfillCoordinator::new(key(), &config)
            .run(&source, &mut store)
            .await;

        assert_eq!(
            report.state,
            BackfillState::Failed(ChartError::Fetch("connection reset".to_string()))
        );
        assert_eq!(store.len(), 5);
        // No retry after the failure
        assert_eq!(source.requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_backfill_counts_malformed_rows() {
        let mut page = page_ending(NOW, 4);
        page.malformed = 2;
        let source = ScriptedSource::with_history(vec![Ok(page)]);
        let config = ChartConfig::default().with_page_size(4);
        let mut store = BarStore::default();

        let report = BackfillCoordinator::new(key(), &config)
            .run(&source, &mut store)
            .await;

        assert_eq!(report.malformed, 2);
        assert_eq!(report.bars_inserted, 4);
    }

    #[tokio::test]
    async fn test_backfill_continues_past_all_malformed_page() {
        let malformed_page = KlinePage {
            bars: Vec::new(),
            malformed: 3,
            rows: 3,
            earliest_start_ms: Some(NOW - 60_000),
        };
        let source = ScriptedSource::with_history(vec![
            Ok(page_ending(NOW, 1)),
            Ok(malformed_page),
            Ok(page_ending(NOW - 2 * 60_000, 1)),
            Ok(KlinePage::default()),
        ]);
        let config = ChartConfig::default().with_page_size(1);
        let mut store = BarStore::default();

        let report = BackfillCoordinator::new(key(), &config)
            .run(&source, &mut store)
            .await;

        assert_eq!(report.state, BackfillState::Done(BackfillStop::EmptyPage));
        assert_eq!(report.pages, 4);
        assert_eq!(report.malformed, 3);
        assert_eq!(store.len(), 2);

        // The malformed page's raw start time still drives pagination
        let requests = source.requests.lock();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[2].start_time_ms, Some(NOW - 2 * 60_000));
    }

    #[tokio::test]
    async fn test_backfill_stops_on_undated_page() {
        let undated_page = KlinePage {
            bars: Vec::new(),
            malformed: 2,
            rows: 2,
            earliest_start_ms: None,
        };
        let source = ScriptedSource::with_history(vec![Ok(undated_page)]);
        let config = ChartConfig::default();
        let mut store = BarStore::default();

        let report = BackfillCoordinator::new(key(), &config)
            .run(&source, &mut store)
            .await;

        assert_eq!(report.state, BackfillState::Done(BackfillStop::Undated));
        assert_eq!(source.requests.lock().len(), 1);
    }

    #[test]
    fn test_zero_page_budget_never_fetches() {
        let config = ChartConfig::default().with_page_budget(0);
        let mut coordinator = BackfillCoordinator::new(key(), &config);

        assert_eq!(coordinator.next_request(), None);
        assert_eq!(
            coordinator.state(),
            &BackfillState::Done(BackfillStop::PageBudget)
        );
    }

    #[test]
    fn test_unexpected_page_is_ignored() {
        let config = ChartConfig::default();
        let mut coordinator = BackfillCoordinator::new(key(), &config);
        let mut store = BarStore::default();

        assert_eq!(
            coordinator.on_page(page_ending(NOW, 3), &mut store),
            &BackfillState::Idle
        );
        assert!(store.is_empty());
    }
}
