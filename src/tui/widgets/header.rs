use ratatui::widgets::Paragraph;
use ratatui::style::{Style, Modifier};
use ratatui::text::{Line, Span};
use ratatui::Frame;
use ratatui::layout::Rect;
use crate::tui::widgets::color::Palette;

/// Date title on the left, per-tab statistics on the right
pub fn render_header(f: &mut Frame, area: Rect, title: &str, stats: &str, palette: &Palette) {
    let title_width = Span::raw(title).width();
    let stats_width = Span::raw(stats).width();
    let gap = (area.width as usize).saturating_sub(title_width + stats_width).max(1);

    let line = Line::from(vec![
        Span::styled(title.to_string(), Style::default().fg(palette.accent).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(gap)),
        Span::styled(stats.to_string(), Style::default().fg(palette.muted)),
    ]);
    f.render_widget(Paragraph::new(line).style(Style::default().fg(palette.fg).bg(palette.bg)), area);
}
