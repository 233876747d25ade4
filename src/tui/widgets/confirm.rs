use ratatui::widgets::{Block, Borders, Paragraph, Clear, Wrap};
use ratatui::style::{Style, Modifier};
use ratatui::Frame;
use ratatui::layout::{Rect, Alignment};
use ratatui::text::{Line, Span};
use crate::tui::app::PendingConfirm;
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::popup_area;

pub fn render_confirm(f: &mut Frame, area: Rect, pending: &PendingConfirm, selection: usize, palette: &Palette) {
    let popup_area = popup_area(area, 50, 35);
    f.render_widget(Clear, popup_area);

    let base = Style::default().fg(palette.fg).bg(palette.bg);
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(pending.prompt(), base.add_modifier(Modifier::BOLD))),
        Line::from(""),
    ];

    let options = ["确定", "取消"];
    let buttons: Vec<Span> = options
        .iter()
        .enumerate()
        .flat_map(|(index, option)| {
            let style = if index == selection {
                Style::default().fg(palette.highlight_fg).bg(palette.highlight)
            } else {
                base
            };
            [Span::styled(format!("  {}  ", option), style), Span::raw("   ")]
        })
        .collect();
    lines.push(Line::from(buttons));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "←/→ 选择, Enter 确认, y/n, Esc 取消",
        Style::default().fg(palette.muted),
    )));

    let paragraph = Paragraph::new(lines)
        .block(Block::default()
            .borders(Borders::ALL)
            .title(" 确认 ")
            .title_alignment(Alignment::Center)
            .border_style(Style::default().fg(palette.danger))
            .style(base))
        .style(base)
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center);

    f.render_widget(paragraph, popup_area);
}
