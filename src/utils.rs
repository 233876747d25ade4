use chrono::{Datelike, NaiveDate, Weekday};
use directories::{ProjectDirs, BaseDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "sxj-dev",
            Profile::Prod => "sxj",
        }
    }
}

/// Get the configuration directory path for sxj
/// If profile is Dev, uses "sxj-dev" instead of "sxj"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "sxj", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path for sxj
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "sxj", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse a date string in ISO 8601 format (YYYY-MM-DD)
pub fn parse_date(date_str: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
}

/// `今天`, `明天`, or `M月D日` for any other date
pub fn relative_date_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "今天".to_string()
    } else if today.succ_opt() == Some(date) {
        "明天".to_string()
    } else {
        format!("{}月{}日", date.month(), date.day())
    }
}

/// Header line such as `10月19日 周一`
pub fn header_title(today: NaiveDate) -> String {
    let weekday = match today.weekday() {
        Weekday::Mon => "一",
        Weekday::Tue => "二",
        Weekday::Wed => "三",
        Weekday::Thu => "四",
        Weekday::Fri => "五",
        Weekday::Sat => "六",
        Weekday::Sun => "日",
    };
    format!("{}月{}日 周{}", today.month(), today.day(), weekday)
}

/// First three characters of the key followed by `****`
pub fn mask_api_key(key: &str) -> String {
    let key = key.trim();
    if key.is_empty() {
        return "(not set)".to_string();
    }
    let visible: String = key.chars().take(3).collect();
    format!("{}****", visible)
}

/// Parsed key binding information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKeyBinding {
    pub key_code: crossterm::event::KeyCode,
    pub requires_ctrl: bool,
}

impl ParsedKeyBinding {
    pub fn matches(&self, key: &crossterm::event::KeyEvent) -> bool {
        key.code == self.key_code && has_primary_modifier(key.modifiers) == self.requires_ctrl
    }
}

/// Check if a key event has the primary modifier (Ctrl on Windows/Linux, Option/Alt on macOS)
pub fn has_primary_modifier(modifiers: crossterm::event::KeyModifiers) -> bool {
    #[cfg(target_os = "macos")]
    {
        modifiers.contains(crossterm::event::KeyModifiers::CONTROL)
            || modifiers.contains(crossterm::event::KeyModifiers::ALT)
    }

    #[cfg(not(target_os = "macos"))]
    {
        modifiers.contains(crossterm::event::KeyModifiers::CONTROL)
    }
}

/// Format a key binding string for display, showing the platform-appropriate modifier
/// On macOS, "Ctrl+" is replaced with "Opt+"
pub fn format_key_binding_for_display(key_binding: &str) -> String {
    #[cfg(target_os = "macos")]
    {
        key_binding.replace("Ctrl+", "Opt+")
    }

    #[cfg(not(target_os = "macos"))]
    {
        key_binding.to_string()
    }
}

/// Parse a key binding string from config into a ParsedKeyBinding
/// Supports: single keys ("q", "n"), special keys ("Enter", "F3"),
/// and modifiers ("Ctrl+s")
pub fn parse_key_binding(key_str: &str) -> Result<ParsedKeyBinding, String> {
    let key_str = key_str.trim();

    if let Some(key_part) = key_str.strip_prefix("Ctrl+") {
        let key_code = parse_key_code(key_part)?;
        return Ok(ParsedKeyBinding {
            key_code,
            requires_ctrl: true,
        });
    }

    let key_code = parse_key_code(key_str)?;
    Ok(ParsedKeyBinding {
        key_code,
        requires_ctrl: false,
    })
}

/// Parse a key code from a string (without modifiers)
fn parse_key_code(key_str: &str) -> Result<crossterm::event::KeyCode, String> {
    use crossterm::event::KeyCode;

    match key_str {
        "Enter" => Ok(KeyCode::Enter),
        "Esc" | "Escape" => Ok(KeyCode::Esc),
        "Backspace" => Ok(KeyCode::Backspace),
        "Tab" => Ok(KeyCode::Tab),
        "BackTab" => Ok(KeyCode::BackTab),
        "Space" | " " => Ok(KeyCode::Char(' ')),
        "Left" => Ok(KeyCode::Left),
        "Right" => Ok(KeyCode::Right),
        "Up" => Ok(KeyCode::Up),
        "Down" => Ok(KeyCode::Down),
        "Home" => Ok(KeyCode::Home),
        "End" => Ok(KeyCode::End),
        "PageUp" => Ok(KeyCode::PageUp),
        "PageDown" => Ok(KeyCode::PageDown),
        "Delete" => Ok(KeyCode::Delete),
        "Insert" => Ok(KeyCode::Insert),
        _ => {
            if let Some(n) = key_str.strip_prefix('F').and_then(|n| n.parse::<u8>().ok()) {
                if (1..=12).contains(&n) {
                    return Ok(KeyCode::F(n));
                }
            }
            let mut chars = key_str.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(KeyCode::Char(c)),
                _ => Err(format!("Unknown key binding: {}", key_str)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn date(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn relative_labels() {
        let today = date("2026-10-19");
        assert_eq!(relative_date_label(today, today), "今天");
        assert_eq!(relative_date_label(date("2026-10-20"), today), "明天");
        assert_eq!(relative_date_label(date("2026-10-18"), today), "10月18日");
        assert_eq!(relative_date_label(date("2027-01-05"), today), "1月5日");
    }

    #[test]
    fn header_includes_weekday() {
        assert_eq!(header_title(date("2026-10-19")), "10月19日 周一");
        assert_eq!(header_title(date("2026-10-25")), "10月25日 周日");
    }

    #[test]
    fn key_bindings_parse() {
        assert_eq!(parse_key_binding("q").unwrap().key_code, KeyCode::Char('q'));
        assert_eq!(parse_key_binding("F3").unwrap().key_code, KeyCode::F(3));
        let save = parse_key_binding("Ctrl+s").unwrap();
        assert!(save.requires_ctrl);
        assert!(save.matches(&KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL)));
        assert!(!save.matches(&KeyEvent::new(KeyCode::Char('s'), KeyModifiers::NONE)));
        assert!(parse_key_binding("F13").is_err());
        assert!(parse_key_binding("Nope").is_err());
    }

    #[test]
    fn api_key_is_masked() {
        assert_eq!(mask_api_key("sk-abcdef"), "sk-****");
        assert_eq!(mask_api_key("  "), "(not set)");
    }

    #[test]
    fn tilde_expands_to_home() {
        let expanded = expand_path("~/sxj/data.db");
        assert!(expanded.ends_with("sxj/data.db"));
        assert_eq!(expand_path("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }
}
