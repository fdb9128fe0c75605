//! Live polling of the newest bar of a series.
//!
//! One poll is in flight at a time; ticks missed while a poll is slow are skipped rather than
//! replayed in a burst.
use crate::{
    bar::{Bar, SeriesKey, normalise_epoch_ms},
    config::ChartConfig,
    error::ChartError,
    source::MarketDataSource,
    store::TickKind,
};
use std::{ops::ControlFlow, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Counters describing what a live pump has applied to its series.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveStats {
    pub amendments: usize,
    pub appends: usize,
    pub out_of_order: usize,
    pub failures: usize,
    pub last_error: Option<ChartError>,
}

impl LiveStats {
    pub fn record(&mut self, kind: TickKind) {
        match kind {
            TickKind::Amend => self.amendments += 1,
            TickKind::Append => self.appends += 1,
            TickKind::OutOfOrder => self.out_of_order += 1,
        }
    }

    pub fn record_failure(&mut self, error: ChartError) {
        self.failures += 1;
        self.last_error = Some(error);
    }

    pub fn ticks(&self) -> usize {
        self.amendments + self.appends + self.out_of_order
    }
}

/// Polls the latest bar of one series on a fixed cadence.
///
/// Polls are strictly sequential: a slow fetch delays the next tick instead of overlapping it,
/// and ticks missed meanwhile are skipped rather than bursted.
#[derive(Debug, Clone)]
pub struct LiveUpdatePump {
    key: SeriesKey,
    poll_interval: Duration,
}

impl LiveUpdatePump {
    pub fn new(key: SeriesKey, config: &ChartConfig) -> Self {
        Self {
            key,
            poll_interval: config.poll_interval,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// Fetch the latest bar, normalising a seconds timestamp to milliseconds.
    pub async fn poll_once<Source>(&self, source: &Source) -> Result<Option<Bar>, ChartError>
    where
        Source: MarketDataSource + ?Sized,
    {
        let latest = source
            .fetch_latest(&self.key.symbol, self.key.interval)
            .await?;

        Ok(latest.map(|bar| Bar {
            time: normalise_epoch_ms(bar.time),
            ..bar
        }))
    }

    /// Poll forever, handing every bar to `on_tick` until it returns [`ControlFlow::Break`].
    ///
    /// Failed polls are logged and passed to `on_error`; the pump then waits for the next tick.
    pub async fn run<Source, OnTick, OnError>(
        self,
        source: &Source,
        mut on_tick: OnTick,
        mut on_error: OnError,
    ) where
        Source: MarketDataSource + ?Sized,
        OnTick: FnMut(Bar) -> ControlFlow<()>,
        OnError: FnMut(ChartError) -> ControlFlow<()>,
    {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let flow = match self.poll_once(source).await {
                Ok(Some(bar)) => on_tick(bar),
                Ok(None) => {
                    debug!(series = %self.key, "live poll returned no bar");
                    ControlFlow::Continue(())
                }
                Err(error) => {
                    warn!(series = %self.key, %error, "live poll failed, skipping tick");
                    on_error(error)
                }
            };

            if flow.is_break() {
                debug!(series = %self.key, "live pump stopped");
                break;
            }
        }
    }
}
