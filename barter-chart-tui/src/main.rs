/// Barter Chart TUI
///
/// Live candlestick chart for one (symbol, interval) series at a time, with Bollinger Band
/// overlays, an RSI pane and a hover tooltip. History is backfilled from the trading backend's
/// kline proxy, then the newest candle is polled every second.
use std::{error::Error, fs::File, io, sync::Arc, time::Duration};

use barter_chart::{BybitKlineClient, ChartConfig, ChartSession, Interval, ViewportConfig};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use smol_str::SmolStr;
use tracing::{info, warn};

mod app;
mod render;

use app::{Action, App};
use render::render_ui;

/// Get symbols from SYMBOLS env var (default: BTCUSDT,ETHUSDT,SOLUSDT)
fn get_symbols() -> Vec<SmolStr> {
    std::env::var("SYMBOLS")
        .unwrap_or_else(|_| "BTCUSDT,ETHUSDT,SOLUSDT".to_string())
        .split(',')
        .map(|symbol| symbol.trim().to_uppercase())
        .filter(|symbol| !symbol.is_empty())
        .map(SmolStr::from)
        .collect()
}

/// Get the initial symbol from SYMBOL env var (default: BTCUSDT)
fn get_symbol() -> SmolStr {
    std::env::var("SYMBOL")
        .map(|symbol| SmolStr::from(symbol.trim().to_uppercase()))
        .unwrap_or_else(|_| SmolStr::new_static("BTCUSDT"))
}

/// Get the initial interval from INTERVAL env var (default: 1m)
fn get_interval() -> Interval {
    match std::env::var("INTERVAL") {
        Ok(raw) => raw.parse().unwrap_or_else(|error| {
            warn!(%error, "invalid INTERVAL, falling back to 1m");
            Interval::default()
        }),
        Err(_) => Interval::default(),
    }
}

/// Log to a file: the terminal is owned by the alternate screen.
fn init_logging() -> Result<(), Box<dyn Error>> {
    let path =
        std::env::var("CHART_LOG_FILE").unwrap_or_else(|_| "barter-chart-tui.log".to_string());
    let file = File::create(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();

    Ok(())
}

/// Terminal cells as chart units: a price label gutter each side, one row top and bottom.
fn viewport_config() -> ViewportConfig {
    let mut config = ViewportConfig::default().with_margins(10.0, 1.0);
    config.min_body_height = 0.25;
    config
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging()?;

    let config = ChartConfig::from_env();
    let source = Arc::new(BybitKlineClient::new(&config)?);
    info!(url = %source.klines_url(), "starting barter-chart-tui");

    let mut session = ChartSession::new(source, config);
    let mut app = App::new(get_symbols(), get_symbol(), get_interval(), viewport_config());

    // Setup panic hook to restore terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    session.switch(app.key());

    let tick_rate = Duration::from_millis(250);

    loop {
        app.on_snapshot(session.snapshot());
        terminal.draw(|f| render_ui(f, &mut app))?;

        if event::poll(tick_rate)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match app.on_key(key.code) {
                    Action::Quit => break,
                    Action::Switch(key) => {
                        session.switch(key);
                    }
                    Action::None => {}
                },
                Event::Mouse(mouse) => app.on_mouse(mouse),
                _ => {}
            }
        }
    }

    session.stop();

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    Ok(())
}
