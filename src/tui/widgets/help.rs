use ratatui::widgets::{Block, Borders, Paragraph, Clear, Wrap};
use ratatui::style::Style;
use ratatui::Frame;
use ratatui::layout::{Rect, Alignment};
use crate::config::KeyBindings;
use crate::tui::widgets::color::Palette;
use crate::tui::widgets::popup_area;
use crate::utils::format_key_binding_for_display as key;

pub fn render_help(f: &mut Frame, area: Rect, bindings: &KeyBindings, palette: &Palette) {
    let popup_area = popup_area(area, 60, 75);
    f.render_widget(Clear, popup_area);

    let paragraph = Paragraph::new(build_help_text(bindings))
        .block(Block::default()
            .borders(Borders::ALL)
            .title(" 帮助 - 快捷键 ")
            .title_alignment(Alignment::Center)
            .style(Style::default().fg(palette.fg).bg(palette.bg)))
        .style(Style::default().fg(palette.fg).bg(palette.bg))
        .wrap(Wrap { trim: false });

    f.render_widget(paragraph, popup_area);
}

pub fn build_help_text(kb: &KeyBindings) -> String {
    let mut text = String::new();

    text.push_str("Navigation:\n");
    text.push_str(&format!("  {} / {}: Switch tabs\n", key(&kb.tab_left), key(&kb.tab_right)));
    text.push_str(&format!("  {} / {}: Tasks / Notes\n", key(&kb.tab_1), key(&kb.tab_2)));
    text.push_str("  ↑ / ↓: Move selection\n");
    text.push('\n');

    text.push_str("Actions:\n");
    text.push_str(&format!("  {}: New task or note\n", key(&kb.new)));
    text.push_str(&format!("  {}: Speak (again to stop)\n", key(&kb.voice)));
    text.push_str(&format!("  {}: Edit selected\n", key(&kb.edit)));
    text.push_str(&format!("  {}: Delete selected\n", key(&kb.delete)));
    text.push_str(&format!("  {}: Toggle task done\n", key(&kb.toggle)));
    text.push_str(&format!("  {}: Clear completed tasks\n", key(&kb.clear_completed)));
    text.push_str(&format!("  {}: Clear today's tasks\n", key(&kb.clear_today)));
    text.push_str(&format!("  {}: Clear all notes\n", key(&kb.clear_notes)));
    text.push('\n');

    text.push_str("Input box:\n");
    text.push_str("  Enter: Submit (tasks go through the AI)\n");
    text.push_str(&format!("  {}: Save note as typed\n", key(&kb.save)));
    text.push_str(&format!("  {}: Polish note with AI\n", key(&kb.ai)));
    text.push_str("  Alt+Enter: New line\n");
    text.push_str("  While listening: Enter stops, Esc discards\n");
    text.push_str("  Esc: Cancel\n");
    text.push('\n');

    text.push_str("General:\n");
    text.push_str(&format!("  {}: AI settings\n", key(&kb.settings)));
    text.push_str(&format!("  {}: Show/hide help\n", key(&kb.help)));
    text.push_str(&format!("  {}: Quit\n", key(&kb.quit)));

    text
}
