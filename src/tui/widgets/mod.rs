pub mod color;
pub mod confirm;
pub mod editor;
pub mod error_screen;
pub mod header;
pub mod help;
pub mod input_box;
pub mod note_list;
pub mod settings_view;
pub mod status_bar;
pub mod tabs;
pub mod task_list;

use ratatui::layout::{Rect, Constraint, Layout, Flex};

/// Centered rect taking the given percentages of `area`
/// Based on ratatui popup example: https://ratatui.rs/examples/apps/popup/
pub fn popup_area(area: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let vertical = Layout::vertical([Constraint::Percentage(percent_y)]).flex(Flex::Center);
    let horizontal = Layout::horizontal([Constraint::Percentage(percent_x)]).flex(Flex::Center);
    let [area] = vertical.areas(area);
    let [area] = horizontal.areas(area);
    area
}
