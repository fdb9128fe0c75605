use barter_chart::{Bar, ChartSnapshot, ChartViewport, Interval, SeriesKey, ViewportConfig};
use crossterm::event::{KeyCode, MouseEvent, MouseEventKind};
use ratatui::layout::{Position, Rect};
use smol_str::SmolStr;

/// Wheel delta of one scroll notch, matching a browser's line scroll.
pub const WHEEL_DELTA: f64 = 100.0;

/// What the event loop must do after an input event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Switch(SeriesKey),
}

/// Terminal chart state: selected series, viewport and the last rendered snapshot.
#[derive(Debug)]
pub struct App {
    pub symbols: Vec<SmolStr>,
    pub symbol_index: usize,
    pub interval: Interval,
    pub viewport: ChartViewport,
    pub snapshot: Option<ChartSnapshot>,
    /// Inner area of the candle pane during the last draw, used to map mouse positions.
    pub chart_area: Rect,
}

impl App {
    pub fn new(
        symbols: Vec<SmolStr>,
        symbol: SmolStr,
        interval: Interval,
        viewport: ViewportConfig,
    ) -> Self {
        let mut symbols = symbols;
        let symbol_index = match symbols.iter().position(|known| *known == symbol) {
            Some(index) => index,
            None => {
                symbols.insert(0, symbol);
                0
            }
        };

        Self {
            symbols,
            symbol_index,
            interval,
            viewport: ChartViewport::new(viewport),
            snapshot: None,
            chart_area: Rect::default(),
        }
    }

    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(self.symbols[self.symbol_index].clone(), self.interval)
    }

    pub fn bars(&self) -> &[Bar] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.bars.as_slice())
            .unwrap_or_default()
    }

    pub fn on_key(&mut self, code: KeyCode) -> Action {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            KeyCode::Char('i') | KeyCode::Tab => {
                self.interval = self.interval.next();
                self.switched()
            }
            KeyCode::Char('s') => {
                self.symbol_index = (self.symbol_index + 1) % self.symbols.len();
                self.switched()
            }
            KeyCode::Char(digit @ '1'..='6') => {
                let index = digit as usize - '1' as usize;
                self.interval = Interval::ALL[index];
                self.switched()
            }
            KeyCode::Char('b') => {
                let show = !self.viewport.config().show_bollinger;
                self.viewport.set_bollinger(show);
                Action::None
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.zoom(-WHEEL_DELTA);
                Action::None
            }
            KeyCode::Char('-') => {
                self.zoom(WHEEL_DELTA);
                Action::None
            }
            _ => Action::None,
        }
    }

    pub fn on_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.zoom(-WHEEL_DELTA),
            MouseEventKind::ScrollDown => self.zoom(WHEEL_DELTA),
            MouseEventKind::Moved => match self.chart_point(mouse.column, mouse.row) {
                Some((x, y)) => self.hover_at(x, y),
                None => self.viewport.pointer_left(),
            },
            _ => {}
        }
    }

    /// Adopt a fresh session snapshot, fitting the zoom on the first data of a session.
    pub fn on_snapshot(&mut self, snapshot: ChartSnapshot) {
        if snapshot.key.as_ref() != Some(&self.key()) {
            return;
        }
        self.viewport.fit_initial(snapshot.bars.len());
        self.snapshot = Some(snapshot);
        self.refresh_hover();
    }

    fn switched(&mut self) -> Action {
        self.viewport.reset();
        self.snapshot = None;
        Action::Switch(self.key())
    }

    fn zoom(&mut self, delta: f64) {
        self.viewport.set_zoom(delta);
        self.refresh_hover();
    }

    fn hover_at(&mut self, x: f64, y: f64) {
        let bars = self
            .snapshot
            .as_ref()
            .map(|snapshot| snapshot.bars.as_slice())
            .unwrap_or_default();
        self.viewport.pointer_moved(bars, x, y);
    }

    fn refresh_hover(&mut self) {
        if let Some(hover) = self.viewport.hover().copied() {
            self.hover_at(hover.x, hover.y);
        }
    }

    /// Mouse cell to chart coordinates, sampling the centre of the cell.
    pub fn chart_point(&self, column: u16, row: u16) -> Option<(f64, f64)> {
        self.chart_area
            .contains(Position::new(column, row))
            .then(|| {
                (
                    f64::from(column - self.chart_area.x) + 0.5,
                    f64::from(row - self.chart_area.y) + 0.5,
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barter_chart::{BackfillReport, LiveStats};
    use crossterm::event::KeyModifiers;

    fn app() -> App {
        App::new(
            vec![SmolStr::new("BTCUSDT"), SmolStr::new("ETHUSDT")],
            SmolStr::new("BTCUSDT"),
            Interval::M1,
            ViewportConfig::default()
                .with_size(100.0, 30.0)
                .with_margins(9.0, 1.0)
                .with_initial_candles(None),
        )
    }

    fn snapshot(key: SeriesKey, len: usize) -> ChartSnapshot {
        let bars = (0..len)
            .map(|i| {
                let close = 100.0 + i as f64;
                Bar::try_new(i as i64 * 60_000, close, close + 1.0, close - 1.0, close, None)
                    .unwrap()
            })
            .collect();

        ChartSnapshot {
            key: Some(key),
            generation: 1,
            bars,
            backfill: BackfillReport::default(),
            live: LiveStats::default(),
        }
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    #[test]
    fn test_unknown_initial_symbol_is_prepended() {
        let app = App::new(
            vec![SmolStr::new("BTCUSDT")],
            SmolStr::new("SOLUSDT"),
            Interval::H1,
            ViewportConfig::default(),
        );
        assert_eq!(app.symbols[0], "SOLUSDT");
        assert_eq!(app.key().to_string(), "SOLUSDT@1h");
    }

    #[test]
    fn test_on_key() {
        struct TestCase {
            input: KeyCode,
            expected: Action,
        }

        let mut app = app();

        let tests = vec![
            TestCase {
                // TC0: next interval
                input: KeyCode::Char('i'),
                expected: Action::Switch(SeriesKey::new(SmolStr::new("BTCUSDT"), Interval::M5)),
            },
            TestCase {
                // TC1: next symbol keeps the interval
                input: KeyCode::Char('s'),
                expected: Action::Switch(SeriesKey::new(SmolStr::new("ETHUSDT"), Interval::M5)),
            },
            TestCase {
                // TC2: symbols wrap around
                input: KeyCode::Char('s'),
                expected: Action::Switch(SeriesKey::new(SmolStr::new("BTCUSDT"), Interval::M5)),
            },
            TestCase {
                // TC3: direct interval selection
                input: KeyCode::Char('6'),
                expected: Action::Switch(SeriesKey::new(SmolStr::new("BTCUSDT"), Interval::D1)),
            },
            TestCase {
                // TC4: overlay toggle is local
                input: KeyCode::Char('b'),
                expected: Action::None,
            },
            TestCase {
                // TC5: quit
                input: KeyCode::Esc,
                expected: Action::Quit,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = app.on_key(test.input);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
        assert!(!app.viewport.config().show_bollinger);
    }

    #[test]
    fn test_switch_resets_viewport() {
        let mut app = app();
        app.on_snapshot(snapshot(app.key(), 50));
        app.viewport.set_zoom_factor(5.0);

        app.on_key(KeyCode::Char('i'));

        assert_eq!(app.viewport.zoom(), 1.0);
        assert!(app.bars().is_empty());
    }

    #[test]
    fn test_snapshot_of_previous_series_is_ignored() {
        let mut app = app();
        let stale = SeriesKey::new(SmolStr::new("ETHUSDT"), Interval::M1);
        app.on_snapshot(snapshot(stale, 10));
        assert!(app.snapshot.is_none());
    }

    #[test]
    fn test_mouse_wheel_zooms() {
        let mut app = app();
        app.on_mouse(mouse(MouseEventKind::ScrollUp, 0, 0));
        assert!((app.viewport.zoom() - 1.5).abs() < 1e-12);

        app.on_mouse(mouse(MouseEventKind::ScrollDown, 0, 0));
        app.on_mouse(mouse(MouseEventKind::ScrollDown, 0, 0));
        assert!((app.viewport.zoom() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_mouse_hover_maps_chart_area() {
        let mut app = app();
        app.chart_area = Rect::new(1, 2, 100, 30);
        app.on_snapshot(snapshot(app.key(), 82));

        // 82 bars over 100 - 2*9 = 82 columns: one bar per column
        app.on_mouse(mouse(MouseEventKind::Moved, 1 + 9 + 81, 10));
        let hover = app.viewport.hover().copied().unwrap();
        assert_eq!(hover.index, 81);
        assert_eq!(Some(&hover.bar), app.bars().last());

        app.on_mouse(mouse(MouseEventKind::Moved, 0, 10));
        assert!(app.viewport.hover().is_none());
    }
}
