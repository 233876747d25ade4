use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::style::{Style, Modifier};
use ratatui::text::{Line, Span};
use ratatui::Frame;
use ratatui::layout::{Rect, Alignment};
use chrono::{NaiveDate, NaiveTime};
use crate::models::{Task, clock};
use crate::tui::widgets::color::Palette;
use crate::utils::relative_date_label;

/// Two-line rows: status and content, then date, time and location
pub fn render_task_list(
    f: &mut Frame,
    area: Rect,
    tasks: &[&Task],
    today: NaiveDate,
    now: NaiveTime,
    list_state: &mut ListState,
    palette: &Palette,
) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" 待办 ")
        .style(Style::default().fg(palette.fg).bg(palette.bg));

    if tasks.is_empty() {
        let empty = Paragraph::new("还没有任务，按 n 添加或按 F3 说一句")
            .alignment(Alignment::Center)
            .style(Style::default().fg(palette.muted))
            .block(block);
        f.render_widget(empty, area);
        return;
    }

    let max_width = area.width.saturating_sub(4) as usize;

    let items: Vec<ListItem> = tasks
        .iter()
        .map(|task| {
            let overdue = task.is_overdue(today, now);
            let (marker, content_style) = if task.completed {
                ("✓", Style::default().fg(palette.muted).add_modifier(Modifier::CROSSED_OUT))
            } else if overdue {
                ("!", Style::default().fg(palette.danger))
            } else {
                ("○", Style::default().fg(palette.fg))
            };

            let content = truncate(&task.content, max_width.saturating_sub(2));
            let first = Line::from(vec![
                Span::styled(format!("{} ", marker), content_style),
                Span::styled(content, content_style),
            ]);

            let mut details = vec![Span::styled(
                format!("  {}", relative_date_label(task.date, today)),
                Style::default().fg(if overdue { palette.danger } else { palette.accent }),
            )];
            if let Some(time) = task.time {
                details.push(Span::styled(format!(" {}", clock::format(time)), Style::default().fg(palette.muted)));
            }
            if let Some(location) = &task.location {
                details.push(Span::styled(format!("  @{}", location), Style::default().fg(palette.muted)));
            }
            if overdue {
                details.push(Span::styled("  已过期", Style::default().fg(palette.danger)));
            }

            ListItem::new(vec![first, Line::from(details)])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(palette.highlight).fg(palette.highlight_fg))
        .highlight_symbol("▌");

    f.render_stateful_widget(list, area, list_state);
}

/// Cut to `max` characters with an ellipsis
pub fn truncate(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > max {
        first_line.chars().take(max.saturating_sub(3)).collect::<String>() + "..."
    } else {
        first_line.to_string()
    }
}
