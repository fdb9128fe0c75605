use crate::app::App;
use barter_chart::{
    BackfillState, ChartSnapshot, Hover, RSI_OVERBOUGHT, RSI_OVERSOLD, ViewportLayout,
    viewport::rsi_y,
};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        Block, Borders, Clear, Paragraph,
        canvas::{Canvas, Context, Line as CanvasLine},
    },
};

const BULL: Color = Color::Green;
const BEAR: Color = Color::Red;
const BAND: Color = Color::Cyan;
const GRID: Color = Color::DarkGray;

/// Horizontal step between vertical strokes filling a candle body (braille dot width).
const BODY_STROKE: f64 = 0.5;

pub fn render_ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Percentage(70),
            Constraint::Min(6),
            Constraint::Length(1),
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);
    render_chart(f, app, chunks[1]);
    render_rsi(f, app, chunks[2]);
    render_footer(f, chunks[3]);

    if let Some(hover) = app.viewport.hover().copied() {
        render_tooltip(f, app.chart_area, &hover);
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        format!(" {} ", app.key()),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )];

    if let Some(snapshot) = &app.snapshot {
        if let Some(last) = snapshot.bars.last() {
            let color = if last.is_bullish() { BULL } else { BEAR };
            spans.push(Span::styled(
                format!("{:.2} ", last.close),
                Style::default().fg(color),
            ));
            if let Some(rsi) = last.indicators.rsi {
                spans.push(Span::raw(format!("RSI {rsi:.1} ")));
            }
        }
        spans.push(Span::styled(
            backfill_status(snapshot),
            Style::default().fg(Color::Gray),
        ));
        spans.push(Span::styled(
            format!(
                " | live +{} ~{} x{}",
                snapshot.live.appends, snapshot.live.amendments, snapshot.live.failures
            ),
            Style::default().fg(Color::Gray),
        ));
    }

    spans.push(Span::styled(
        format!(" | zoom {:.2}", app.viewport.zoom()),
        Style::default().fg(Color::Gray),
    ));

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn backfill_status(snapshot: &ChartSnapshot) -> String {
    let report = &snapshot.backfill;
    match &report.state {
        BackfillState::Idle | BackfillState::Fetching { .. } | BackfillState::MorePages { .. } => {
            format!("| loading page {} ({} bars)", report.pages + 1, snapshot.bars.len())
        }
        BackfillState::Done(_) => format!("| {} bars", snapshot.bars.len()),
        BackfillState::Failed(error) => {
            format!("| {} bars, backfill failed: {error}", snapshot.bars.len())
        }
    }
}

fn render_chart(f: &mut Frame, app: &mut App, area: Rect) {
    let block = Block::default()
        .title(" CANDLES ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));
    let inner = block.inner(area);

    app.chart_area = inner;
    app.viewport
        .resize(f64::from(inner.width), f64::from(inner.height));

    let Some(layout) = app.viewport.layout(app.bars()) else {
        f.render_widget(
            Paragraph::new("Waiting for market data...")
                .style(Style::default().fg(Color::DarkGray))
                .block(block),
            area,
        );
        return;
    };

    let height = f64::from(inner.height);
    let show_bands = app.viewport.config().show_bollinger;

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, f64::from(inner.width)])
        .y_bounds([0.0, height])
        .paint(|ctx| {
            paint_grid(ctx, &layout, height);
            if show_bands {
                paint_bands(ctx, &layout, height);
            }
            paint_candles(ctx, &layout, height);
        });

    f.render_widget(canvas, area);
}

fn paint_grid(ctx: &mut Context, layout: &ViewportLayout, height: f64) {
    for tick in layout.price_ticks() {
        let y = height - tick.y;
        ctx.draw(&CanvasLine::new(
            layout.plot.left,
            y,
            layout.plot.right(),
            y,
            GRID,
        ));
        ctx.print(
            0.0,
            y,
            Line::styled(format!("{:.2}", tick.price), Style::default().fg(GRID)),
        );
    }
    ctx.layer();
}

fn paint_bands(ctx: &mut Context, layout: &ViewportLayout, height: f64) {
    let paths = layout.bollinger_paths();
    for path in [&paths.upper, &paths.middle, &paths.lower] {
        for pair in path.windows(2) {
            let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
            ctx.draw(&CanvasLine::new(x1, height - y1, x2, height - y2, BAND));
        }
    }
    ctx.layer();
}

fn paint_candles(ctx: &mut Context, layout: &ViewportLayout, height: f64) {
    for candle in layout.candles() {
        let color = if candle.bullish { BULL } else { BEAR };

        ctx.draw(&CanvasLine::new(
            candle.x,
            height - candle.high_y,
            candle.x,
            height - candle.low_y,
            color,
        ));

        let top = height - candle.body_top;
        let bottom = height - (candle.body_top + candle.body_height);
        let mut x = candle.body_left;
        while x <= candle.body_left + candle.body_width {
            ctx.draw(&CanvasLine::new(x, bottom, x, top, color));
            x += BODY_STROKE;
        }
    }
}

fn render_rsi(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" RSI 14 ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White));
    let inner = block.inner(area);

    // Same horizontal mapping as the candle pane, which spans the same columns
    let Some(layout) = app.viewport.layout(app.bars()) else {
        f.render_widget(block, area);
        return;
    };

    let width = f64::from(inner.width);
    let height = f64::from(inner.height);
    let points = layout.rsi_points(0.0, height);

    let canvas = Canvas::default()
        .block(block)
        .marker(Marker::Braille)
        .x_bounds([0.0, width])
        .y_bounds([0.0, height])
        .paint(|ctx| {
            for (level, color) in [(RSI_OVERBOUGHT, BEAR), (RSI_OVERSOLD, BULL)] {
                let y = height - rsi_y(level, 0.0, height);
                ctx.draw(&CanvasLine::new(
                    layout.plot.left,
                    y,
                    layout.plot.right(),
                    y,
                    color,
                ));
                ctx.print(
                    0.0,
                    y,
                    Line::styled(format!("{level:.0}"), Style::default().fg(color)),
                );
            }
            ctx.layer();

            for pair in points.windows(2) {
                let ((x1, y1), (x2, y2)) = (pair[0], pair[1]);
                ctx.draw(&CanvasLine::new(
                    x1,
                    height - y1,
                    x2,
                    height - y2,
                    Color::Magenta,
                ));
            }
        });

    f.render_widget(canvas, area);
}

fn render_tooltip(f: &mut Frame, chart_area: Rect, hover: &Hover) {
    let mut lines: Vec<Line> = hover.tooltip().into_iter().map(Line::from).collect();
    if let Some(time) = hover.bar.datetime() {
        lines.insert(0, Line::from(time.format("%Y-%m-%d %H:%M").to_string()));
    }

    let width = 20;
    let height = lines.len() as u16 + 2;
    let frame = f.area();

    // Right of the pointer, flipped left when it would leave the screen
    let pointer_x = chart_area.x + hover.x as u16;
    let pointer_y = chart_area.y + hover.y as u16;
    let x = if pointer_x + 2 + width <= frame.right() {
        pointer_x + 2
    } else {
        pointer_x.saturating_sub(width + 1)
    };
    let y = pointer_y.min(frame.bottom().saturating_sub(height));

    let area = Rect::new(x, y, width, height).intersection(frame);
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        ),
        area,
    );
}

fn render_footer(f: &mut Frame, area: Rect) {
    let help = Line::from(vec![
        Span::styled(" q", Style::default().fg(Color::Yellow)),
        Span::raw(" quit  "),
        Span::styled("s", Style::default().fg(Color::Yellow)),
        Span::raw(" symbol  "),
        Span::styled("i/1-6", Style::default().fg(Color::Yellow)),
        Span::raw(" interval  "),
        Span::styled("b", Style::default().fg(Color::Yellow)),
        Span::raw(" bands  "),
        Span::styled("wheel/+/-", Style::default().fg(Color::Yellow)),
        Span::raw(" zoom"),
    ]);
    f.render_widget(Paragraph::new(help), area);
}
