mod clipboard;
mod help;

use crate::cli::{build_config, build_orchestrator, Cli};
use crate::model::{override_requirement, ResetConfig, RunState};
use crate::orchestrator::{ResetOrchestrator, Trigger, UiLoop};
use crate::surface::Surface;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
    Terminal,
};
use std::{io, time::Duration, time::Instant};
use tokio::runtime::Handle;

/// View-only state. Everything the reset flow mutates lives in `Surface`.
struct ViewState {
    tab: usize,
    info: String,
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    let (orchestrator, ui_loop) = build_orchestrator(&cfg, &Handle::current());

    // The TUI thread is the UI-affine context: it owns the Surface and drains the UI loop.
    let ui_handle = std::thread::Builder::new()
        .name("felica-reset-ui".into())
        .spawn(move || run_threaded(cfg, orchestrator, ui_loop))
        .context("spawn UI thread")?;

    match tokio::task::spawn_blocking(move || ui_handle.join()).await {
        Ok(Ok(res)) => res,
        Ok(Err(_)) => Err(anyhow::anyhow!("TUI thread panicked")),
        Err(e) => Err(anyhow::Error::new(e).context("join TUI thread")),
    }
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    cfg: ResetConfig,
    mut orchestrator: ResetOrchestrator,
    mut ui_loop: UiLoop,
) -> Result<()> {
    let mut surface = Surface::unbound();
    let mut view = ViewState {
        tab: 0,
        info: String::new(),
    };

    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = match Terminal::new(backend).context("create terminal") {
        Ok(t) => t,
        Err(e) => {
            orchestrator.release();
            restore_terminal();
            return Err(e);
        }
    };
    terminal.clear().ok();

    // Display elements exist from here on.
    surface.bind();
    if let Err(e) = orchestrator.initialize(&mut surface) {
        tracing::error!(error = %e, "readiness check failed");
        view.info = format!("Readiness check failed: {e}");
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now() - tick_rate;

    loop {
        ui_loop.drain(&mut surface);

        if last_tick.elapsed() >= tick_rate {
            terminal
                .draw(|f| draw(f.area(), f, &cfg, &surface, &view))
                .ok();
            last_tick = Instant::now();
        }

        // Short poll keeps UI tasks flowing while idle.
        if !event::poll(Duration::from_millis(10)).unwrap_or(false) {
            continue;
        }
        let Ok(Event::Key(k)) = event::read() else {
            continue;
        };
        if k.kind != KeyEventKind::Press {
            continue;
        }
        match (k.modifiers, k.code) {
            (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => break,
            (_, KeyCode::Char('r')) | (_, KeyCode::Enter) if view.tab == 0 => {
                view.info = match orchestrator.perform_reset(&mut surface) {
                    Trigger::Scheduled => String::new(),
                    Trigger::Ignored if surface.state() == RunState::Running => {
                        "A reset is already in progress".into()
                    }
                    Trigger::Ignored => "Reset is not available yet".into(),
                    Trigger::NotReady => "Display is not ready".into(),
                    Trigger::ResourceMissing | Trigger::Rejected => {
                        "Reset could not be started".into()
                    }
                };
            }
            (_, KeyCode::Char('c')) => {
                if surface.state() == RunState::Unavailable {
                    view.info = match orchestrator.initialize(&mut surface) {
                        Ok(()) => "Checking device…".into(),
                        Err(e) => format!("Readiness check failed: {e}"),
                    };
                }
            }
            (_, KeyCode::Char('y')) => {
                view.info = match clipboard::copy_to_clipboard(surface.status_text()) {
                    Ok(()) => "✓ Status log copied to clipboard".into(),
                    Err(e) => format!("Clipboard copy failed: {e:#}"),
                };
            }
            (_, KeyCode::Tab) => view.tab = (view.tab + 1) % 2,
            (_, KeyCode::Char('?')) => view.tab = 1,
            (_, KeyCode::Esc) => view.tab = 0,
            _ => {}
        }
    }

    // Does not wait for an in-flight run; its late UI task is simply never drained.
    orchestrator.release();
    restore_terminal();
    Ok(())
}

fn restore_terminal() {
    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
}

fn state_color(state: RunState) -> Color {
    match state {
        RunState::Initializing | RunState::Running => Color::Yellow,
        RunState::Idle => Color::Cyan,
        RunState::Succeeded => Color::Green,
        RunState::Unavailable | RunState::Failed => Color::Red,
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, cfg: &ResetConfig, surface: &Surface, view: &ViewState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Reset"), Line::from("Help")])
        .select(view.tab)
        .block(Block::default().borders(Borders::ALL).title("felica-reset"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match view.tab {
        0 => draw_reset(chunks[1], f, cfg, surface, view),
        _ => help::draw_help(chunks[1], f),
    }
}

fn draw_reset(area: Rect, f: &mut ratatui::Frame, cfg: &ResetConfig, surface: &Surface, view: &ViewState) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(7), // Target
                Constraint::Min(5),    // Status log
                Constraint::Length(3), // Trigger
                Constraint::Length(3), // Info
            ]
            .as_ref(),
        )
        .split(area);

    let mut target_lines = Vec::new();
    push_wrapped_kv(&mut target_lines, "Package", &cfg.target.package, main[0].width);
    push_wrapped_kv(&mut target_lines, "Class", &cfg.target.class, main[0].width);
    let root = match (cfg.use_root, cfg.settings_uid) {
        (true, true) => " (su, Settings UID)",
        (true, false) => " (su)",
        _ => "",
    };
    push_wrapped_kv(
        &mut target_lines,
        "Transport",
        &format!("{}{root}", cfg.transport.describe()),
        main[0].width,
    );
    push_wrapped_kv(
        &mut target_lines,
        "Requires",
        &override_requirement(&cfg.target),
        main[0].width,
    );
    let target = Paragraph::new(target_lines)
        .block(Block::default().borders(Borders::ALL).title("Target"));
    f.render_widget(target, main[0]);

    let state = surface.state();
    let status_title = Line::from(vec![
        Span::raw("Status ("),
        Span::styled(state.label(), Style::default().fg(state_color(state))),
        Span::raw(")"),
    ]);
    let status_lines: Vec<Line> = surface.status_text().lines().map(Line::from).collect();
    // Keep the newest lines visible.
    let visible = main[1].height.saturating_sub(2) as usize;
    let skip = status_lines.len().saturating_sub(visible.max(1));
    let status = Paragraph::new(status_lines.into_iter().skip(skip).collect::<Vec<_>>())
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(status_title));
    f.render_widget(status, main[1]);

    let (label, style) = if surface.trigger_enabled() {
        (
            " [ r ] Reset ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
    } else if state == RunState::Running {
        (" Resetting… ", Style::default().fg(Color::DarkGray))
    } else {
        (" Reset unavailable ", Style::default().fg(Color::DarkGray))
    };
    let trigger = Paragraph::new(Line::from(Span::styled(label, style)))
        .block(Block::default().borders(Borders::ALL).title("Action"));
    f.render_widget(trigger, main[2]);

    let mut info_spans = vec![
        Span::styled("r", Style::default().fg(Color::Magenta)),
        Span::raw(" reset  "),
        Span::styled("c", Style::default().fg(Color::Magenta)),
        Span::raw(" re-check  "),
        Span::styled("y", Style::default().fg(Color::Magenta)),
        Span::raw(" copy log  "),
        Span::styled("q", Style::default().fg(Color::Magenta)),
        Span::raw(" quit"),
    ];
    if !view.info.is_empty() {
        info_spans.push(Span::raw("   "));
        info_spans.push(Span::styled(view.info.clone(), Style::default().fg(Color::Gray)));
    }
    let info = Paragraph::new(Line::from(info_spans))
        .block(Block::default().borders(Borders::ALL).title("Keys"));
    f.render_widget(info, main[3]);
}

fn push_wrapped_kv(out: &mut Vec<Line<'static>>, label: &str, value: &str, area_width: u16) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}
