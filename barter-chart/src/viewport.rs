//! Zoomable chart viewport over the tail of a bar series.
//!
//! Maps the trailing window of bars to pixel geometry and resolves pointer coordinates back to
//! bars. Holds no bar data: every method takes the current series snapshot, so the viewport can
//! never disagree with the store it renders.

use crate::{bar::Bar, indicator::RSI_NEUTRAL};

/// Viewport sizing and interaction settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportConfig {
    /// Drawing surface width in pixels.
    pub width: f64,
    /// Drawing surface height in pixels.
    pub height: f64,
    /// Horizontal margin on each side of the plot area, reserved for price labels.
    pub margin_x: f64,
    /// Vertical margin above and below the plot area.
    pub margin_y: f64,
    /// Zoom change per unit of wheel delta.
    pub zoom_sensitivity: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Fewest bars ever laid out across the plot width.
    pub min_visible: usize,
    /// Bars visible when a session's first data arrives. `None` keeps the zoom unchanged.
    pub initial_candles: Option<usize>,
    /// Number of horizontal price grid intervals.
    pub price_divisions: usize,
    /// Smallest drawn candle body height, so doji bars stay visible.
    pub min_body_height: f64,
    /// Whether Bollinger Bands are overlaid and included in the price axis range.
    pub show_bollinger: bool,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 300.0,
            margin_x: 50.0,
            margin_y: 40.0,
            zoom_sensitivity: 0.005,
            min_zoom: 0.5,
            max_zoom: 100.0,
            min_visible: 10,
            initial_candles: Some(40),
            price_divisions: 10,
            min_body_height: 1.0,
            show_bollinger: true,
        }
    }
}

impl ViewportConfig {
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_margins(mut self, margin_x: f64, margin_y: f64) -> Self {
        self.margin_x = margin_x;
        self.margin_y = margin_y;
        self
    }

    pub fn with_initial_candles(mut self, initial_candles: Option<usize>) -> Self {
        self.initial_candles = initial_candles;
        self
    }

    pub fn with_bollinger(mut self, show: bool) -> Self {
        self.show_bollinger = show;
        self
    }
}

/// Price axis bounds of the visible window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    /// Axis span. A flat window is treated as span 1 so the mapping never divides by zero.
    pub fn span(&self) -> f64 {
        let span = self.max - self.min;
        if span == 0.0 { 1.0 } else { span }
    }
}

/// Plot area inside the margins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl PlotArea {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }
}

/// Pixel geometry of one candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandleGeometry {
    /// Position within the visible window.
    pub index: usize,
    /// Candle centre.
    pub x: f64,
    pub high_y: f64,
    pub low_y: f64,
    pub body_left: f64,
    pub body_top: f64,
    pub body_width: f64,
    pub body_height: f64,
    pub bullish: bool,
}

/// Price axis label and its y coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceTick {
    pub price: f64,
    pub y: f64,
}

/// Bollinger overlay polylines. Bars without bands contribute no point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BandPaths {
    pub upper: Vec<(f64, f64)>,
    pub middle: Vec<(f64, f64)>,
    pub lower: Vec<(f64, f64)>,
}

/// Pointer position resolved to a visible bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hover {
    pub x: f64,
    pub y: f64,
    pub index: usize,
    pub bar: Bar,
}

impl Hover {
    /// Tooltip lines: open, high, low and close to two decimals.
    pub fn tooltip(&self) -> [String; 4] {
        [
            format!("O: {:.2}", self.bar.open),
            format!("H: {:.2}", self.bar.high),
            format!("L: {:.2}", self.bar.low),
            format!("C: {:.2}", self.bar.close),
        ]
    }
}

/// Geometry of the visible window for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportLayout<'a> {
    pub window: &'a [Bar],
    pub visible_count: usize,
    pub range: PriceRange,
    pub plot: PlotArea,
    pub candle_width: f64,
    price_divisions: usize,
    min_body_height: f64,
}

impl ViewportLayout<'_> {
    /// Candle centre of window position `index`.
    pub fn x_for_index(&self, index: usize) -> f64 {
        self.plot.left + index as f64 * self.candle_width + self.candle_width / 2.0
    }

    /// Higher prices map to smaller y.
    pub fn y_for_price(&self, price: f64) -> f64 {
        self.plot.top + (self.range.max - price) / self.range.span() * self.plot.height
    }

    pub fn price_at_y(&self, y: f64) -> f64 {
        self.range.max - (y - self.plot.top) / self.plot.height * self.range.span()
    }

    /// Window position under pointer `x`, using the same mapping as drawing.
    pub fn index_at_x(&self, x: f64) -> Option<usize> {
        let position = ((x - self.plot.left) / self.candle_width).floor();
        if position.is_finite() && position >= 0.0 && (position as usize) < self.window.len() {
            Some(position as usize)
        } else {
            None
        }
    }

    pub fn candles(&self) -> Vec<CandleGeometry> {
        self.window
            .iter()
            .enumerate()
            .map(|(index, bar)| {
                let x = self.x_for_index(index);
                let open_y = self.y_for_price(bar.open);
                let close_y = self.y_for_price(bar.close);
                CandleGeometry {
                    index,
                    x,
                    high_y: self.y_for_price(bar.high),
                    low_y: self.y_for_price(bar.low),
                    body_left: x - self.candle_width / 4.0,
                    body_top: open_y.min(close_y),
                    body_width: self.candle_width / 2.0,
                    body_height: (close_y - open_y).abs().max(self.min_body_height),
                    bullish: bar.is_bullish(),
                }
            })
            .collect()
    }

    /// Evenly spaced labels from the top (max price) to the bottom (min price) of the axis.
    pub fn price_ticks(&self) -> Vec<PriceTick> {
        let divisions = self.price_divisions.max(1);
        (0..=divisions)
            .map(|step| {
                let fraction = step as f64 / divisions as f64;
                PriceTick {
                    price: self.range.max - self.range.span() * fraction,
                    y: self.plot.top + self.plot.height * fraction,
                }
            })
            .collect()
    }

    pub fn bollinger_paths(&self) -> BandPaths {
        let mut paths = BandPaths::default();
        for (index, bar) in self.window.iter().enumerate() {
            let Some(bands) = bar.indicators.bollinger else {
                continue;
            };
            let x = self.x_for_index(index);
            paths.upper.push((x, self.y_for_price(bands.upper)));
            paths.middle.push((x, self.y_for_price(bands.middle)));
            paths.lower.push((x, self.y_for_price(bands.lower)));
        }
        paths
    }

    /// RSI polyline for a pane spanning `top..top + height` on a fixed [0, 100] axis.
    pub fn rsi_points(&self, top: f64, height: f64) -> Vec<(f64, f64)> {
        self.window
            .iter()
            .enumerate()
            .map(|(index, bar)| {
                let rsi = bar.indicators.rsi.unwrap_or(RSI_NEUTRAL);
                (self.x_for_index(index), rsi_y(rsi, top, height))
            })
            .collect()
    }
}

/// y coordinate of an RSI value in a pane spanning `top..top + height`.
pub fn rsi_y(rsi: f64, top: f64, height: f64) -> f64 {
    top + (100.0 - rsi.clamp(0.0, 100.0)) / 100.0 * height
}

/// Zoom, pan window and hover state of one chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartViewport {
    config: ViewportConfig,
    zoom: f64,
    initial_fit_done: bool,
    hover: Option<Hover>,
}

impl Default for ChartViewport {
    fn default() -> Self {
        Self::new(ViewportConfig::default())
    }
}

impl ChartViewport {
    pub fn new(config: ViewportConfig) -> Self {
        Self {
            config,
            zoom: 1.0,
            initial_fit_done: false,
            hover: None,
        }
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn hover(&self) -> Option<&Hover> {
        self.hover.as_ref()
    }

    /// Apply a wheel delta. Positive deltas zoom out (more bars), negative zoom in.
    pub fn set_zoom(&mut self, delta: f64) {
        self.set_zoom_factor(self.zoom - delta * self.config.zoom_sensitivity);
    }

    pub fn set_zoom_factor(&mut self, zoom: f64) {
        if zoom.is_nan() {
            return;
        }
        self.zoom = zoom.clamp(self.config.min_zoom, self.config.max_zoom);
    }

    /// Fit the zoom so `initial_candles` bars are visible, once per session.
    pub fn fit_initial(&mut self, series_len: usize) {
        if self.initial_fit_done || series_len == 0 {
            return;
        }
        if let Some(initial) = self.config.initial_candles.filter(|initial| *initial > 0) {
            self.set_zoom_factor(series_len as f64 / initial as f64);
        }
        self.initial_fit_done = true;
    }

    /// Forget zoom and hover, eg/ after switching symbol or interval.
    pub fn reset(&mut self) {
        self.zoom = 1.0;
        self.initial_fit_done = false;
        self.hover = None;
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.config.width = width;
        self.config.height = height;
    }

    pub fn set_bollinger(&mut self, show: bool) {
        self.config.show_bollinger = show;
    }

    /// `max(min_visible, min(len, floor(len / zoom)))`.
    pub fn visible_count(&self, series_len: usize) -> usize {
        let zoomed = (series_len as f64 / self.zoom).floor() as usize;
        zoomed.min(series_len).max(self.config.min_visible)
    }

    /// Trailing bars laid out by the current zoom.
    pub fn visible_window<'a>(&self, bars: &'a [Bar]) -> &'a [Bar] {
        let count = self.visible_count(bars.len()).min(bars.len());
        &bars[bars.len() - count..]
    }

    /// Axis range over the window, including Bollinger Bands when they are shown.
    pub fn price_range(&self, window: &[Bar]) -> Option<PriceRange> {
        let mut prices = window.iter().flat_map(|bar| {
            let bands = bar
                .indicators
                .bollinger
                .filter(|_| self.config.show_bollinger);
            [
                Some(bar.low),
                Some(bar.high),
                bands.map(|bands| bands.lower),
                bands.map(|bands| bands.upper),
            ]
            .into_iter()
            .flatten()
        });

        let first = prices.next()?;
        let (min, max) = prices.fold((first, first), |(min, max), price| {
            (min.min(price), max.max(price))
        });
        Some(PriceRange { min, max })
    }

    pub fn plot_area(&self) -> Option<PlotArea> {
        let plot = PlotArea {
            left: self.config.margin_x,
            top: self.config.margin_y,
            width: self.config.width - 2.0 * self.config.margin_x,
            height: self.config.height - 2.0 * self.config.margin_y,
        };
        (plot.width > 0.0 && plot.height > 0.0).then_some(plot)
    }

    /// Frame geometry. `None` for an empty series or a surface too small to draw on.
    pub fn layout<'a>(&self, bars: &'a [Bar]) -> Option<ViewportLayout<'a>> {
        let plot = self.plot_area()?;
        let window = self.visible_window(bars);
        let range = self.price_range(window)?;
        let visible_count = self.visible_count(bars.len());

        Some(ViewportLayout {
            window,
            visible_count,
            range,
            plot,
            candle_width: plot.width / visible_count as f64,
            price_divisions: self.config.price_divisions,
            min_body_height: self.config.min_body_height,
        })
    }

    /// Resolve a pointer position to a visible bar. Never mutates the series.
    pub fn pointer_moved(&mut self, bars: &[Bar], x: f64, y: f64) -> Option<&Hover> {
        self.hover = self.layout(bars).and_then(|layout| {
            let index = layout.index_at_x(x)?;
            Some(Hover {
                x,
                y,
                index,
                bar: layout.window[index],
            })
        });
        self.hover.as_ref()
    }

    pub fn pointer_left(&mut self) {
        self.hover = None;
    }
}
