use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::style::Style;
use ratatui::text::Line;
use ratatui::Frame;
use ratatui::layout::Rect;
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::editor::Editor;

/// Bordered text box; the terminal cursor is placed when `focused`
pub fn render_input_box(
    f: &mut Frame,
    area: Rect,
    title: &str,
    editor: &mut Editor,
    focused: bool,
    listening: bool,
    palette: &Palette,
) {
    if area.height < 3 {
        return;
    }
    let inner_height = area.height.saturating_sub(2) as usize;
    let inner_width = area.width.saturating_sub(2) as usize;
    editor.update_scroll(inner_height);
    editor.update_horizontal_scroll(inner_width);

    let border_color = if listening { palette.danger } else { palette.accent };
    let title = if listening {
        format!(" {} · 正在听... ", title)
    } else {
        format!(" {} ", title)
    };

    let lines: Vec<Line> = editor
        .visible_lines(inner_height, inner_width)
        .into_iter()
        .map(Line::from)
        .collect();

    let paragraph = Paragraph::new(lines)
        .style(Style::default().fg(palette.fg).bg(palette.bg))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(Style::default().fg(border_color)),
        );
    f.render_widget(paragraph, area);

    if focused {
        if let Some((x, y)) = editor.cursor_screen_pos(area) {
            f.set_cursor_position((x, y));
        }
    }
}
