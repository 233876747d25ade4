use ratatui::layout::Rect;
use ratatui::text::Span;
use std::cmp;

/// Multi-line text buffer with a char-indexed cursor.
///
/// Horizontal scrolling is measured in terminal cells so wide (CJK)
/// characters never push the cursor past the box edge.
#[derive(Debug, Clone, Default)]
pub struct Editor {
    pub lines: Vec<String>,
    pub cursor_line: usize,
    pub cursor_col: usize,
    pub scroll_offset: usize,
    pub scroll_col: usize,
}

fn char_width(ch: char) -> usize {
    let mut buf = [0u8; 4];
    Span::raw(&*ch.encode_utf8(&mut buf)).width()
}

fn cells(chars: &[char]) -> usize {
    chars.iter().map(|c| char_width(*c)).sum()
}

impl Editor {
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
            ..Self::default()
        }
    }

    pub fn from_string(content: &str) -> Self {
        let lines: Vec<String> = if content.is_empty() {
            vec![String::new()]
        } else {
            content.split('\n').map(str::to_string).collect()
        };
        let cursor_line = lines.len().saturating_sub(1);
        let cursor_col = lines.last().map(|l| l.chars().count()).unwrap_or(0);
        Self {
            lines,
            cursor_line,
            cursor_col,
            scroll_offset: 0,
            scroll_col: 0,
        }
    }

    /// Replace the whole buffer, cursor at the end
    pub fn set_text(&mut self, content: &str) {
        *self = Self::from_string(content);
    }

    fn current_chars(&self) -> Vec<char> {
        self.lines
            .get(self.cursor_line)
            .map(|l| l.chars().collect())
            .unwrap_or_default()
    }

    fn set_current(&mut self, chars: Vec<char>) {
        if self.lines.is_empty() {
            self.lines.push(String::new());
            self.cursor_line = 0;
        }
        if let Some(line) = self.lines.get_mut(self.cursor_line) {
            *line = chars.into_iter().collect();
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        let mut chars = self.current_chars();
        let col = cmp::min(self.cursor_col, chars.len());
        chars.insert(col, ch);
        self.set_current(chars);
        self.cursor_col = col + 1;
    }

    pub fn insert_str(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.insert_newline();
            } else if ch != '\r' {
                self.insert_char(ch);
            }
        }
    }

    /// Backspace: delete before the cursor, joining lines at column zero
    pub fn delete_char(&mut self) {
        let mut chars = self.current_chars();
        let col = cmp::min(self.cursor_col, chars.len());
        if col > 0 {
            chars.remove(col - 1);
            self.set_current(chars);
            self.cursor_col = col - 1;
        } else if self.cursor_line > 0 && self.cursor_line < self.lines.len() {
            let current = self.lines.remove(self.cursor_line);
            self.cursor_line -= 1;
            if let Some(prev) = self.lines.get_mut(self.cursor_line) {
                self.cursor_col = prev.chars().count();
                prev.push_str(&current);
            }
        }
    }

    pub fn insert_newline(&mut self) {
        let mut chars = self.current_chars();
        let col = cmp::min(self.cursor_col, chars.len());
        let remainder: String = chars.split_off(col).into_iter().collect();
        self.set_current(chars);
        self.lines.insert(self.cursor_line + 1, remainder);
        self.cursor_line += 1;
        self.cursor_col = 0;
    }

    pub fn move_cursor_up(&mut self) {
        if self.cursor_line > 0 {
            self.cursor_line -= 1;
            self.cursor_col = cmp::min(self.cursor_col, self.current_chars().len());
        }
    }

    pub fn move_cursor_down(&mut self) {
        if self.cursor_line + 1 < self.lines.len() {
            self.cursor_line += 1;
            self.cursor_col = cmp::min(self.cursor_col, self.current_chars().len());
        }
    }

    pub fn move_cursor_left(&mut self) {
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
        } else if self.cursor_line > 0 {
            self.cursor_line -= 1;
            self.cursor_col = self.current_chars().len();
        }
    }

    pub fn move_cursor_right(&mut self) {
        let len = self.current_chars().len();
        if self.cursor_col < len {
            self.cursor_col += 1;
        } else if self.cursor_line + 1 < self.lines.len() {
            self.cursor_line += 1;
            self.cursor_col = 0;
        }
    }

    pub fn move_cursor_home(&mut self) {
        self.cursor_col = 0;
    }

    pub fn move_cursor_end(&mut self) {
        self.cursor_col = self.current_chars().len();
    }

    pub fn update_scroll(&mut self, viewport_height: usize) {
        let viewport_height = viewport_height.max(1);
        if self.cursor_line < self.scroll_offset {
            self.scroll_offset = self.cursor_line;
        } else if self.cursor_line >= self.scroll_offset + viewport_height {
            self.scroll_offset = self.cursor_line + 1 - viewport_height;
        }
    }

    /// Keep the cursor inside `viewport_width` cells (borders excluded by the caller)
    pub fn update_horizontal_scroll(&mut self, viewport_width: usize) {
        let width = viewport_width.max(1);
        let chars = self.current_chars();
        let col = cmp::min(self.cursor_col, chars.len());
        if col < self.scroll_col {
            self.scroll_col = col;
        }
        while self.scroll_col < col && cells(&chars[self.scroll_col..col]) >= width {
            self.scroll_col += 1;
        }
    }

    /// Lines in view, each clipped to `viewport_width` cells
    pub fn visible_lines(&self, viewport_height: usize, viewport_width: usize) -> Vec<String> {
        let start = cmp::min(self.scroll_offset, self.lines.len());
        let end = cmp::min(start + viewport_height, self.lines.len());
        self.lines[start..end]
            .iter()
            .map(|line| {
                let mut used = 0;
                line.chars()
                    .skip(self.scroll_col)
                    .take_while(|c| {
                        used += char_width(*c);
                        used <= viewport_width
                    })
                    .collect()
            })
            .collect()
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Screen position of the cursor inside a bordered `area`
    pub fn cursor_screen_pos(&self, area: Rect) -> Option<(u16, u16)> {
        let inner_height = area.height.saturating_sub(2) as usize;
        let inner_width = area.width.saturating_sub(2) as usize;
        if self.cursor_line < self.scroll_offset || self.cursor_line >= self.scroll_offset + inner_height {
            return None;
        }
        let chars = self.current_chars();
        let col = cmp::min(self.cursor_col, chars.len());
        if col < self.scroll_col {
            return None;
        }
        let x = cells(&chars[self.scroll_col..col]);
        if x >= inner_width.max(1) {
            return None;
        }
        let y = self.cursor_line - self.scroll_offset;
        Some((area.x + 1 + x as u16, area.y + 1 + y as u16))
    }
}
