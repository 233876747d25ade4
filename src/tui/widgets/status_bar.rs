use ratatui::widgets::Paragraph;
use ratatui::style::{Style, Modifier};
use ratatui::Frame;
use ratatui::layout::Rect;
use crate::tui::widgets::color::Palette;

/// Fit as many hints as the width allows, ending with `...` when some are cut
pub fn fit_hints(key_hints: &[String], max_width: usize) -> String {
    const SEPARATOR: &str = " • ";
    const ELLIPSIS: &str = "...";

    let mut hints_text = String::new();
    for (i, hint) in key_hints.iter().enumerate() {
        let current_len = hints_text.chars().count();
        let would_be_len = if i == 0 {
            hint.chars().count()
        } else {
            current_len + SEPARATOR.chars().count() + hint.chars().count()
        };

        if would_be_len > max_width {
            if hints_text.is_empty() {
                hints_text = hint.chars().take(max_width.saturating_sub(ELLIPSIS.len())).collect();
            } else if current_len + ELLIPSIS.len() > max_width {
                hints_text = hints_text.chars().take(max_width.saturating_sub(ELLIPSIS.len())).collect();
            }
            hints_text.push_str(ELLIPSIS);
            break;
        }

        if i > 0 {
            hints_text.push_str(SEPARATOR);
        }
        hints_text.push_str(hint);
    }
    hints_text
}

/// One line: the busy indicator, else the status message, else key hints
pub fn render_status_bar(
    f: &mut Frame,
    area: Rect,
    busy: Option<&str>,
    message: Option<&str>,
    key_hints: &[String],
    palette: &Palette,
) {
    let max_width = area.width as usize;

    let (content, style) = match (busy, message) {
        (Some(busy), _) => (
            busy.to_string(),
            Style::default().fg(palette.accent).bg(palette.bg).add_modifier(Modifier::BOLD),
        ),
        (None, Some(msg)) => {
            let mut content = msg.to_string();
            if content.chars().count() > max_width {
                content = content.chars().take(max_width.saturating_sub(3)).collect::<String>() + "...";
            }
            (
                content,
                Style::default().fg(palette.highlight_fg).bg(palette.highlight).add_modifier(Modifier::BOLD),
            )
        }
        (None, None) => (fit_hints(key_hints, max_width), Style::default().fg(palette.fg).bg(palette.bg)),
    };

    f.render_widget(Paragraph::new(content).style(style), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints() -> Vec<String> {
        vec!["q: Quit".to_string(), "n: New".to_string(), "F1: Help".to_string()]
    }

    #[test]
    fn all_hints_fit_on_a_wide_bar() {
        assert_eq!(fit_hints(&hints(), 80), "q: Quit • n: New • F1: Help");
    }

    #[test]
    fn narrow_bar_ends_with_ellipsis() {
        let text = fit_hints(&hints(), 18);
        assert!(text.ends_with("..."));
        assert!(text.chars().count() <= 18);
        assert!(text.starts_with("q: Quit"));
    }
}
