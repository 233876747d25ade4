use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::style::{Style, Modifier};
use ratatui::text::{Line, Span};
use ratatui::Frame;
use ratatui::layout::{Rect, Alignment};
use chrono::{DateTime, Local};
use crate::models::Note;
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::task_list::truncate;

fn created_label(created_at: i64) -> String {
    DateTime::from_timestamp_millis(created_at)
        .map(|dt| dt.with_timezone(&Local).format("%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Newest first: bold title with timestamp, then the start of the content
pub fn render_note_list(f: &mut Frame, area: Rect, notes: &[&Note], list_state: &mut ListState, palette: &Palette) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" 记录 ")
        .style(Style::default().fg(palette.fg).bg(palette.bg));

    if notes.is_empty() {
        let empty = Paragraph::new("还没有记录，按 n 写下第一条")
            .alignment(Alignment::Center)
            .style(Style::default().fg(palette.muted))
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let max_width = area.width.saturating_sub(4) as usize;

    let items: Vec<ListItem> = notes
        .iter()
        .map(|note| {
            let first = Line::from(vec![
                Span::styled(note.title.clone(), Style::default().fg(palette.fg).add_modifier(Modifier::BOLD)),
                Span::styled(format!("  {}", created_label(note.created_at)), Style::default().fg(palette.muted)),
            ]);
            let preview = Line::from(Span::styled(
                format!("  {}", truncate(&note.content, max_width.saturating_sub(2))),
                Style::default().fg(palette.muted),
            ));
            ListItem::new(vec![first, preview])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(palette.highlight).fg(palette.highlight_fg))
        .highlight_symbol("▌");

    f.render_stateful_widget(list, area, list_state);
}
