use ratatui::layout::{Rect, Layout as RatLayout, Direction, Constraint};

pub struct Layout {
    pub inner_area: Rect,  // Area inside the outer border
    pub header_area: Rect,
    pub tabs_area: Rect,
    pub main_area: Rect,
    pub input_area: Rect,  // Zero height unless the input box is open
    pub status_area: Rect,
}

impl Layout {
    /// Minimum terminal dimensions required for the application
    /// Height: 2 borders + header + tabs + 3 list lines + input (5) + status
    pub const MIN_WIDTH: u16 = 36;
    pub const MIN_HEIGHT: u16 = 12;

    /// Height of the input box including its border
    pub const INPUT_HEIGHT: u16 = 6;

    pub fn calculate(size: Rect, input_open: bool) -> Self {
        let width = size.width.max(Self::MIN_WIDTH + 2);
        let height = size.height.max(Self::MIN_HEIGHT + 2);
        let size = Rect::new(size.x, size.y, width, height);

        let inner_area = Rect::new(
            size.x + 1,
            size.y + 1,
            size.width.saturating_sub(2),
            size.height.saturating_sub(2),
        );

        let input_height = if input_open { Self::INPUT_HEIGHT } else { 0 };

        let vertical = RatLayout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),            // Header
                Constraint::Length(1),            // Tabs
                Constraint::Min(1),               // List
                Constraint::Length(input_height), // Input
                Constraint::Length(1),            // Status
            ])
            .split(inner_area);

        Self {
            inner_area,
            header_area: vertical[0],
            tabs_area: vertical[1],
            main_area: vertical[2],
            input_area: vertical[3],
            status_area: vertical[4],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_box_takes_space_only_when_open() {
        let size = Rect::new(0, 0, 80, 24);
        let closed = Layout::calculate(size, false);
        let open = Layout::calculate(size, true);
        assert_eq!(closed.input_area.height, 0);
        assert_eq!(open.input_area.height, Layout::INPUT_HEIGHT);
        assert_eq!(closed.main_area.height, open.main_area.height + Layout::INPUT_HEIGHT);
        assert_eq!(closed.status_area.y, 22);
    }
}
