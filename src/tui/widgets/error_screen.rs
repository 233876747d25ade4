use ratatui::widgets::{Block, Borders, Paragraph, Clear, Wrap};
use ratatui::style::{Style, Color, Modifier};
use ratatui::Frame;
use ratatui::layout::{Rect, Alignment};
use ratatui::text::{Line, Span};
use crate::tui::widgets::popup_area;

/// Static fallback shown after the main loop panicked
pub fn render_error_screen(f: &mut Frame, area: Rect, message: &str) {
    let popup_area = popup_area(area, 70, 50);
    f.render_widget(Clear, popup_area);

    let lines = vec![
        Line::from(Span::styled("出错了", Style::default().fg(Color::LightRed).add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from(message.to_string()),
        Line::from(""),
        Line::from(Span::styled("r: 重新加载    q: 退出", Style::default().fg(Color::Cyan))),
    ];

    let paragraph = Paragraph::new(lines)
        .block(Block::default()
            .borders(Borders::ALL)
            .title(" sxj ")
            .title_alignment(Alignment::Center)
            .border_style(Style::default().fg(Color::LightRed)))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    f.render_widget(paragraph, popup_area);
}
