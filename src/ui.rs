use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Flex, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use tokio::time::Instant;
use unicode_width::UnicodeWidthChar;

use crate::app::App;
use crate::format::display_width;
use crate::input::InputMode;
use crate::modal::Modal;

const BG: Color = Color::Rgb(9, 15, 25);
const PANEL: Color = Color::Rgb(16, 27, 44);
const ACCENT: Color = Color::Rgb(52, 211, 153);
const MUTED: Color = Color::Rgb(140, 156, 178);
const WARN: Color = Color::Rgb(251, 191, 36);
const ERROR: Color = Color::Rgb(248, 113, 113);
const PL_A: Color = Color::Rgb(17, 94, 89);
const PL_B: Color = Color::Rgb(30, 64, 175);

const MIN_WIDTH: u16 = 80;
const MIN_HEIGHT: u16 = 24;

pub fn render(frame: &mut Frame, app: &App, now: Instant) {
    let area = frame.area();
    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        render_too_small(frame, area);
        return;
    }

    let [header, body, footer] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(6),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(frame, header, app);
    render_body(frame, body, app);
    render_footer(frame, footer, app);

    if let Some(busy) = app.busy(now) {
        render_busy(frame, body, &format!("{} {}", busy.glyph, busy.label));
    }
    if let Some(modal) = app.modal() {
        render_modal(frame, modal);
    }
}

fn render_too_small(frame: &mut Frame, area: Rect) {
    let message = format!(
        "Terminal is {}x{}; rutil needs at least {MIN_WIDTH}x{MIN_HEIGHT}.",
        area.width, area.height
    );
    frame.render_widget(
        Paragraph::new(message)
            .wrap(Wrap { trim: true })
            .style(Style::default().bg(BG).fg(WARN)),
        area,
    );
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, " rutil ", Color::Black, ACCENT, PL_A);
    push_powerline_segment(
        &mut spans,
        format!(" {} ", app.engine()),
        Color::White,
        PL_A,
        BG,
    );
    let used = spans_width(&spans);
    let crumbs = compact_text(
        &app.breadcrumbs(),
        usize::from(area.width).saturating_sub(used + 2).max(8),
    );
    spans.push(Span::styled(format!(" {crumbs}"), Style::default().fg(MUTED)));
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG).fg(Color::White)),
        area,
    );
}

fn render_body(frame: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .title(Span::styled(
            format!(" {} ", app.screen().title()),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(MUTED))
        .style(Style::default().bg(PANEL));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    app.compose().draw(frame.buffer_mut(), inner);
}

fn render_footer(frame: &mut Frame, area: Rect, app: &App) {
    if let Some(prompt) = app.text_prompt() {
        let mut spans = Vec::new();
        push_powerline_segment(&mut spans, " txt ", Color::Black, WARN, PL_B);
        push_powerline_segment(
            &mut spans,
            format!(" {prompt}: {}_ ", app.input()),
            Color::White,
            PL_B,
            BG,
        );
        spans.push(Span::styled(
            " Enter: apply | Esc: cancel",
            Style::default().fg(MUTED),
        ));
        frame.render_widget(
            Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
            area,
        );
        return;
    }

    let (label, label_bg) = match app.mode() {
        InputMode::ModalConfirm => (" dlg ", WARN),
        _ => (" nav ", PL_A),
    };
    let status = app.status();
    let status_bg = if status.contains("failed") { ERROR } else { PL_B };
    let mut spans = Vec::new();
    push_powerline_segment(&mut spans, label, Color::Black, label_bg, status_bg);
    push_powerline_segment(
        &mut spans,
        format!(
            " {} ",
            compact_text(&status, usize::from(area.width / 2).max(24))
        ),
        Color::White,
        status_bg,
        BG,
    );

    let help = app.help();
    let left_width = spans_width(&spans) as u16;
    let right_width = (display_width(help) as u16).min(area.width.saturating_sub(left_width));
    let [left, right] =
        Layout::horizontal([Constraint::Min(1), Constraint::Length(right_width)]).areas(area);
    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(BG)),
        left,
    );
    frame.render_widget(
        Paragraph::new(Span::styled(help, Style::default().fg(MUTED)))
            .style(Style::default().bg(BG))
            .alignment(Alignment::Right),
        right,
    );
}

fn render_busy(frame: &mut Frame, body: Rect, label: &str) {
    let width = u16::try_from(display_width(label))
        .unwrap_or(u16::MAX)
        .saturating_add(6)
        .min(body.width);
    let area = Rect {
        x: body.x + (body.width.saturating_sub(width)) / 2,
        y: body.y + body.height.saturating_sub(3) / 2,
        width,
        height: 3.min(body.height),
    };
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(label.to_string())
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(WARN))
                    .style(Style::default().bg(PANEL)),
            )
            .style(Style::default().fg(Color::White)),
        area,
    );
}

fn render_modal(frame: &mut Frame, modal: &Modal) {
    let area = centered_rect(60, 40, frame.area());
    frame.render_widget(Clear, area);

    let border = match modal {
        Modal::Confirm(_) => WARN,
        Modal::Notice { title, .. } if title.ends_with("failed") => ERROR,
        _ => ACCENT,
    };
    let popup = Paragraph::new(modal.body())
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(format!(" {} ", modal.title()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .style(Style::default().bg(PANEL)),
        )
        .style(Style::default().fg(Color::White));
    frame.render_widget(popup, area);
}

fn push_powerline_segment(
    spans: &mut Vec<Span<'static>>,
    content: impl Into<String>,
    fg: Color,
    bg: Color,
    next_bg: Color,
) {
    spans.push(Span::styled(
        content.into(),
        Style::default().fg(fg).bg(bg).add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::styled("", Style::default().fg(bg).bg(next_bg)));
}

fn spans_width(spans: &[Span<'_>]) -> usize {
    spans.iter().map(|span| display_width(&span.content)).sum()
}

/// Cuts `value` to `max_width` display cells, ending in an ellipsis when cut.
fn compact_text(value: &str, max_width: usize) -> String {
    if display_width(value) <= max_width {
        return value.to_string();
    }
    let budget = max_width.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for c in value.chars() {
        let width = c.width().unwrap_or(0);
        if used + width > budget {
            break;
        }
        used += width;
        out.push(c);
    }
    out.push('…');
    out
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let [band] = Layout::vertical([Constraint::Percentage(percent_y)])
        .flex(Flex::Center)
        .areas(area);
    let [popup] = Layout::horizontal([Constraint::Percentage(percent_x)])
        .flex(Flex::Center)
        .areas(band);
    popup
}

#[cfg(test)]
mod tests {
    use super::{compact_text, render, render_busy};
    use crate::app::App;
    use crate::input::Action;
    use crate::session::test_session;
    use crate::source::fake::FakeSource;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use ratatui::buffer::Buffer;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn screen_text(buf: &Buffer) -> Vec<String> {
        (0..buf.area.height)
            .map(|y| {
                (0..buf.area.width)
                    .map(|x| buf[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect()
    }

    fn draw(app: &App, width: u16, height: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).expect("test terminal");
        terminal
            .draw(|frame| render(frame, app, Instant::now()))
            .expect("draw");
        screen_text(terminal.backend().buffer())
    }

    #[test]
    fn compact_text_adds_ellipsis() {
        assert_eq!(compact_text("Virtual Machines", 7), "Virtua…");
        assert_eq!(compact_text("VMs", 7), "VMs");
    }

    #[test]
    fn oversized_busy_label_is_clipped_to_the_body() {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).expect("test terminal");
        let label = "x".repeat(70_000);
        terminal
            .draw(|frame| {
                let area = frame.area();
                render_busy(frame, area, &label);
            })
            .expect("draw");
        let lines = screen_text(terminal.backend().buffer());
        assert!(lines[11].contains("xxxx"));
    }

    #[tokio::test]
    async fn menu_frame_shows_engine_and_cursor() {
        let app = App::new(test_session(Arc::new(FakeSource::new())));
        let lines = draw(&app, 100, 30);
        assert!(lines[0].contains("engine.test"));
        assert!(lines[0].contains("Main menu"));
        assert!(lines.iter().any(|line| line.contains("> Virtual Machines")));
        assert!(lines[29].contains("Connected to engine.test"));
    }

    #[tokio::test]
    async fn text_entry_replaces_footer_with_prompt() {
        let mut app = App::new(test_session(Arc::new(FakeSource::new())));
        let now = Instant::now();
        app.apply_action(Action::Open, now);
        app.apply_action(Action::ToggleSearch, now);
        app.apply_action(Action::InputChar('w'), now);
        let lines = draw(&app, 100, 30);
        assert!(lines[29].contains("Search: w_"));
        assert!(lines[0].contains("Main menu > Virtual Machines"));
    }

    #[tokio::test]
    async fn small_terminal_shows_resize_notice() {
        let app = App::new(test_session(Arc::new(FakeSource::new())));
        let lines = draw(&app, 40, 10);
        assert!(lines.join(" ").contains("needs at least"));
    }
}
