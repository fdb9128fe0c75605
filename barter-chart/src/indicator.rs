//! RSI & Bollinger Band calculations attached to every bar of a series.
//!
//! Both indicators only look backwards: the values of bar `i` depend on closes `<= i`. A tail
//! recompute after an append or amendment therefore produces exactly the values a full
//! recompute would, provided it reads the same closes in the same order. Both paths share
//! [`IndicatorEngine::compute`] to guarantee that.

use crate::bar::{Bar, Bollinger, Indicators};

/// RSI level above which the oscillator pane marks the market overbought.
pub const RSI_OVERBOUGHT: f64 = 70.0;

/// RSI level below which the oscillator pane marks the market oversold.
pub const RSI_OVERSOLD: f64 = 30.0;

/// RSI of the first bar, which has no prior close to compare with.
pub const RSI_NEUTRAL: f64 = 50.0;

/// Relative strength used when the window contains no losses.
const RS_NO_LOSS_SENTINEL: f64 = 100.0;

/// Computes RSI and Bollinger Bands over a bar series.
///
/// RSI uses a plain rolling window average of gains and losses rather than Wilder's
/// exponential smoothing. Downstream consumers depend on these exact numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorEngine {
    pub rsi_period: usize,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            bollinger_period: 20,
            bollinger_k: 2.0,
        }
    }
}

impl IndicatorEngine {
    /// Number of trailing bars any single indicator value reads.
    pub fn lookback(&self) -> usize {
        self.rsi_period.max(self.bollinger_period).max(1)
    }

    /// Recompute every bar. The correctness baseline for all incremental paths.
    pub fn recompute_all(&self, bars: &mut [Bar]) {
        self.recompute_from(bars, 0);
    }

    /// Recompute bars `start..` leaving earlier bars untouched.
    pub fn recompute_from(&self, bars: &mut [Bar], start: usize) {
        self.recompute_range(bars, start, bars.len());
    }

    /// Recompute bars `start..end`, reading only the closes those windows need.
    pub fn recompute_range(&self, bars: &mut [Bar], start: usize, end: usize) {
        let end = end.min(bars.len());
        if start >= end {
            return;
        }

        let offset = start.saturating_sub(self.lookback());
        let closes: Vec<f64> = bars[offset..end].iter().map(|bar| bar.close).collect();

        for index in start..end {
            bars[index].indicators = self.compute(&closes, offset, index);
        }
    }

    /// Indicator values of bar `index`, where `closes[0]` is the close of bar `offset`.
    ///
    /// `offset` must be at most `index - lookback()` (saturating) so the full windows are present.
    pub fn compute(&self, closes: &[f64], offset: usize, index: usize) -> Indicators {
        Indicators {
            rsi: Some(self.rsi(closes, offset, index)),
            bollinger: self.bollinger(closes, offset, index),
        }
    }

    fn rsi(&self, closes: &[f64], offset: usize, index: usize) -> f64 {
        if index == 0 || self.rsi_period == 0 {
            return RSI_NEUTRAL;
        }

        // Differences over the trailing `rsi_period` closes, averaged over min(index, period)
        let start = index.saturating_sub(self.rsi_period - 1);
        let (gains, losses) = ((start + 1)..=index).fold((0.0, 0.0), |(gains, losses), j| {
            let diff = closes[j - offset] - closes[j - 1 - offset];
            if diff >= 0.0 {
                (gains + diff, losses)
            } else {
                (gains, losses - diff)
            }
        });

        let samples = index.min(self.rsi_period) as f64;
        let avg_gain = gains / samples;
        let avg_loss = losses / samples;

        let rs = if avg_loss == 0.0 {
            RS_NO_LOSS_SENTINEL
        } else {
            avg_gain / avg_loss
        };

        100.0 - 100.0 / (1.0 + rs)
    }

    fn bollinger(&self, closes: &[f64], offset: usize, index: usize) -> Option<Bollinger> {
        if self.bollinger_period == 0 {
            return None;
        }

        let start = index.saturating_sub(self.bollinger_period - 1);
        let window = &closes[start - offset..=index - offset];
        let n = window.len() as f64;

        let mean = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|close| (close - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        Some(Bollinger {
            upper: mean + self.bollinger_k * std,
            middle: mean,
            lower: mean - self.bollinger_k * std,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::test_utils::bars;

    fn closes(n: usize) -> Vec<f64> {
        // Deterministic zig-zag with drift so both gains and losses appear
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn test_first_bar_rsi_is_neutral() {
        let mut series = bars(0, &[100.0, 101.0]);
        IndicatorEngine::default().recompute_all(&mut series);
        assert_eq!(series[0].indicators.rsi, Some(50.0));
    }

    #[test]
    fn test_monotonic_increase_hits_no_loss_sentinel() {
        let input: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let mut series = bars(0, &input);
        IndicatorEngine::default().recompute_all(&mut series);

        let rsi = series[19].indicators.rsi.unwrap();
        assert!((rsi - (100.0 - 100.0 / 101.0)).abs() < 1e-12);
        assert!((rsi - 99.0099).abs() < 1e-4);
    }

    #[test]
    fn test_rsi_window_arithmetic() {
        // i = 1: one diff (+2) over min(1, 14) = 1 sample, no losses -> sentinel
        // i = 2: diffs +2, -1 -> avg_gain 2/2, avg_loss 1/2, rs 2 -> rsi 66.67
        let mut series = bars(0, &[10.0, 12.0, 11.0]);
        IndicatorEngine::default().recompute_all(&mut series);
        assert!((series[2].indicators.rsi.unwrap() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_late_window_uses_thirteen_diffs_over_fourteen() {
        // Closes 0..=15 rising by 1 except one drop of 2 at the final step.
        let mut input: Vec<f64> = (0..15).map(|i| i as f64).collect();
        input.push(12.0);
        let mut series = bars(0, &input);
        IndicatorEngine::default().recompute_all(&mut series);

        // index 15: window closes[2..=15], diffs j = 3..=15: twelve +1 and one -2
        let avg_gain = 12.0 / 14.0;
        let avg_loss = 2.0 / 14.0;
        let expected = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
        assert!((series[15].indicators.rsi.unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_bounds_and_band_ordering() {
        let mut series = bars(0, &closes(300));
        IndicatorEngine::default().recompute_all(&mut series);

        for (index, bar) in series.iter().enumerate() {
            let rsi = bar.indicators.rsi.unwrap();
            assert!((0.0..=100.0).contains(&rsi), "bar {index} rsi {rsi}");

            let bands = bar.indicators.bollinger.unwrap();
            assert!(bands.lower <= bands.middle, "bar {index}");
            assert!(bands.middle <= bands.upper, "bar {index}");
        }
    }

    #[test]
    fn test_bollinger_population_std() {
        // Two closes 1 and 3: mean 2, population std 1
        let mut series = bars(0, &[1.0, 3.0]);
        IndicatorEngine::default().recompute_all(&mut series);

        let bands = series[1].indicators.bollinger.unwrap();
        assert_eq!(bands.middle, 2.0);
        assert_eq!(bands.upper, 4.0);
        assert_eq!(bands.lower, 0.0);

        // A single close has zero width bands
        let first = series[0].indicators.bollinger.unwrap();
        assert_eq!((first.lower, first.middle, first.upper), (1.0, 1.0, 1.0));
    }

    #[test]
    fn test_bollinger_window_is_trailing_twenty() {
        let input: Vec<f64> = (0..25).map(|i| i as f64).collect();
        let mut series = bars(0, &input);
        IndicatorEngine::default().recompute_all(&mut series);

        // closes 5..=24 -> mean 14.5
        assert_eq!(series[24].indicators.bollinger.unwrap().middle, 14.5);
    }

    #[test]
    fn test_incremental_append_matches_full_recompute() {
        let engine = IndicatorEngine::default();
        let all = bars(0, &closes(120));

        let mut incremental = Vec::new();
        for bar in &all {
            incremental.push(*bar);
            let last = incremental.len() - 1;
            engine.recompute_from(&mut incremental, last);
        }

        let mut full = all.clone();
        engine.recompute_all(&mut full);

        // Bit identical, not merely close
        assert_eq!(incremental, full);
    }

    #[test]
    fn test_amending_last_bar_leaves_history_untouched() {
        let engine = IndicatorEngine::default();
        let mut series = bars(0, &closes(40));
        engine.recompute_all(&mut series);
        let before = series.clone();

        series[39].close += 3.0;
        series[39].high += 3.0;
        engine.recompute_from(&mut series, 39);

        assert_eq!(&series[..39], &before[..39]);
        assert_ne!(series[39].indicators, before[39].indicators);

        let mut full = series.clone();
        engine.recompute_all(&mut full);
        assert_eq!(series, full);
    }

    #[test]
    fn test_recompute_range_out_of_bounds_is_noop() {
        let engine = IndicatorEngine::default();
        let mut series = bars(0, &[1.0, 2.0]);
        engine.recompute_range(&mut series, 5, 10);
        assert!(series.iter().all(|bar| bar.indicators.rsi.is_none()));
    }
}
