use ratatui::widgets::Tabs;
use ratatui::style::{Style, Modifier};
use ratatui::text::{Line, Span};
use ratatui::Frame;
use ratatui::layout::Rect;
use crate::tui::app::Tab;
use crate::tui::widgets::color::Palette;

/// Tab strip; each title carries the count of open tasks or notes
pub fn render_tabs(f: &mut Frame, area: Rect, current_tab: Tab, open_tasks: usize, notes: usize, palette: &Palette) {
    let tab_style = Style::default().fg(palette.fg).bg(palette.muted);
    let titles: Vec<Line> = [format!("待办 {}", open_tasks), format!("记录 {}", notes)]
        .into_iter()
        .map(|title| {
            Line::from(vec![
                Span::styled("  ", tab_style),
                Span::styled(title, tab_style),
                Span::styled("  ", tab_style),
            ])
        })
        .collect();

    let tab_index = match current_tab {
        Tab::Tasks => 0,
        Tab::Notes => 1,
    };

    let tabs = Tabs::new(titles)
        .select(tab_index)
        .style(Style::default().fg(palette.fg).bg(palette.bg))
        .highlight_style(
            Style::default()
                .fg(palette.highlight_fg)
                .bg(palette.highlight)
                .add_modifier(Modifier::BOLD),
        )
        .divider("  ")
        .padding("", "");

    f.render_widget(tabs, area);
}
