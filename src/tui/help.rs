use crate::model::INTERCEPTED_METHOD;
use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn keybind(key: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(what),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("r", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw("   Request a reset"),
        ]),
        keybind("c", 11, "Re-check the device when unavailable"),
        keybind("y", 11, "Copy the status log to clipboard"),
        keybind("tab", 9, "Switch tabs"),
        keybind("?", 11, "Show this help"),
        keybind("esc", 9, "Back to the reset screen"),
        Line::from(""),
        Line::from("Notes:"),
        Line::from(format!(
            "  The memory-clear screen only opens when its {INTERCEPTED_METHOD} check"
        )),
        Line::from("  is forced to pass on the device (for example by a hooking module)."),
        Line::from("  A successful request does not prove the screen opened: restart the"),
        Line::from("  target app and check there."),
        Line::from("  The target is looked up on the device first; an unknown activity fails."),
        Line::from("  With --root --settings-uid the request is sent as the Settings app."),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
