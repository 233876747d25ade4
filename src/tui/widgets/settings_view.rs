use ratatui::widgets::{Block, Borders, Paragraph, Clear};
use ratatui::style::{Style, Modifier};
use ratatui::Frame;
use ratatui::layout::{Rect, Layout, Constraint, Alignment};
use ratatui::text::{Line, Span};
use crate::tui::app::{SettingsField, SettingsFormState};
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::editor::Editor;
use crate::tui::widgets::popup_area;

/// AI settings form: API key (masked unless revealed), base URL, model
pub fn render_settings_view_modal(f: &mut Frame, area: Rect, form: &mut SettingsFormState, palette: &Palette) {
    let popup_area = popup_area(area, 70, 70);
    f.render_widget(Clear, popup_area);

    let base = Style::default().fg(palette.fg).bg(palette.bg);
    let outer = Block::default()
        .borders(Borders::ALL)
        .title(" 设置 ")
        .title_alignment(Alignment::Center)
        .style(base);
    let inner = outer.inner(popup_area);
    f.render_widget(outer, popup_area);

    let rows = Layout::vertical([
        Constraint::Length(1), // Notice
        Constraint::Length(3), // API key
        Constraint::Length(3), // Base URL
        Constraint::Length(3), // Model
        Constraint::Min(0),
        Constraint::Length(1), // Hints
    ])
    .split(inner);

    let notice = if form.required {
        Span::styled("请先配置 API Key 才能使用 AI 功能", Style::default().fg(palette.danger).add_modifier(Modifier::BOLD))
    } else {
        Span::styled("OpenAI 兼容接口 (默认: 通义千问 DashScope)", Style::default().fg(palette.muted))
    };
    f.render_widget(Paragraph::new(Line::from(notice)), rows[0]);

    let active = form.field;
    let reveal = form.reveal_key;

    let mut masked = mask_editor(&form.api_key);
    let key_editor = if reveal { &mut form.api_key } else { &mut masked };
    render_field(f, rows[1], "API Key", key_editor, active == SettingsField::ApiKey, palette);
    render_field(f, rows[2], "Base URL", &mut form.base_url, active == SettingsField::BaseUrl, palette);
    render_field(f, rows[3], "Model", &mut form.model, active == SettingsField::Model, palette);

    let hints = "Tab/↑↓: 切换字段 • Enter/Ctrl+s: 保存 • Ctrl+v: 显示/隐藏 Key • Esc: 取消";
    f.render_widget(
        Paragraph::new(Span::styled(hints, Style::default().fg(palette.muted))),
        rows[5],
    );
}

/// Same cursor, every character replaced by `*`
fn mask_editor(editor: &Editor) -> Editor {
    let mut masked = editor.clone();
    masked.lines = editor
        .lines
        .iter()
        .map(|line| "*".repeat(line.chars().count()))
        .collect();
    masked
}

fn render_field(f: &mut Frame, area: Rect, label: &str, editor: &mut Editor, focused: bool, palette: &Palette) {
    let inner_width = area.width.saturating_sub(2) as usize;
    editor.update_horizontal_scroll(inner_width);

    let border = if focused {
        Style::default().fg(palette.accent)
    } else {
        Style::default().fg(palette.muted)
    };
    let text = editor.visible_lines(1, inner_width).into_iter().next().unwrap_or_default();
    let paragraph = Paragraph::new(text)
        .style(Style::default().fg(palette.fg).bg(palette.bg))
        .block(Block::default().borders(Borders::ALL).title(format!(" {} ", label)).border_style(border));
    f.render_widget(paragraph, area);

    if focused {
        if let Some(position) = editor.cursor_screen_pos(area) {
            f.set_cursor_position(position);
        }
    }
}
