use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Title used for directly saved notes whose first sentence is empty
pub const PLACEHOLDER_NOTE_TITLE: &str = "无标题记录";

/// Maximum number of characters kept when deriving a note title
pub const NOTE_TITLE_MAX_CHARS: usize = 15;

/// Default OpenAI-compatible endpoint (DashScope compatible mode)
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-plus";

/// Environment variable holding the default API key, read at build time and at run time
pub const API_KEY_ENV: &str = "SXJ_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub content: String,
    pub date: NaiveDate, // YYYY-MM-DD
    #[serde(default, with = "clock", skip_serializing_if = "Option::is_none")]
    pub time: Option<NaiveTime>, // HH:mm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: i64, // epoch millis
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub raw: String,
    #[serde(default)]
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Structured fields pulled out of a free-text task by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskExtraction {
    pub task: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub location: Option<String>,
}

/// Title and rewritten body produced for a note
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteExtraction {
    pub title: String,
    pub content: String,
}

impl Task {
    pub fn from_extraction(id: String, extraction: TaskExtraction, created_at: i64) -> Self {
        Self {
            id,
            content: extraction.task,
            date: extraction.date,
            time: extraction.time,
            location: extraction.location,
            completed: false,
            created_at,
        }
    }

    /// A task is overdue when it is still open and its date (and time, when
    /// set) is not in the future.
    pub fn is_overdue(&self, today: NaiveDate, now: NaiveTime) -> bool {
        if self.completed {
            return false;
        }
        if self.date < today {
            return true;
        }
        match self.time {
            Some(time) if self.date == today => clock::truncate(time) <= clock::truncate(now),
            _ => false,
        }
    }
}

impl Note {
    /// Build a note saved without AI: the title is the first sentence of the input
    pub fn direct(id: String, raw: String, created_at: i64) -> Self {
        Self {
            id,
            title: derive_title(&raw),
            content: raw.clone(),
            raw,
            created_at,
        }
    }

    pub fn from_extraction(id: String, raw: String, extraction: NoteExtraction, created_at: i64) -> Self {
        Self {
            id,
            title: extraction.title,
            content: extraction.content,
            raw,
            created_at,
        }
    }
}

/// Text up to the first newline, comma or period (full- or half-width),
/// cut to [`NOTE_TITLE_MAX_CHARS`] characters.
pub fn derive_title(text: &str) -> String {
    let first = text
        .split(['\n', ',', '，', '.', '。'])
        .next()
        .unwrap_or_default();
    let title: String = first.chars().take(NOTE_TITLE_MAX_CHARS).collect();
    if title.is_empty() {
        PLACEHOLDER_NOTE_TITLE.to_string()
    } else {
        title
    }
}

impl Settings {
    /// Default settings; the API key comes from the environment when available
    pub fn defaults() -> Self {
        Self {
            api_key: default_api_key(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Key baked in at build time, else taken from the running environment
pub fn default_api_key() -> String {
    match option_env!("SXJ_API_KEY") {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => std::env::var(API_KEY_ENV).unwrap_or_default(),
    }
}

/// `HH:mm` (de)serialisation for optional clock values. Stored values that
/// are not a clock time (older records kept words like `下午`) read as `None`.
pub mod clock {
    use chrono::{NaiveTime, Timelike};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn parse(value: &str) -> Result<NaiveTime, chrono::ParseError> {
        let value = value.trim();
        NaiveTime::parse_from_str(value, FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S").map(truncate))
    }

    pub fn format(time: NaiveTime) -> String {
        time.format(FORMAT).to_string()
    }

    /// Drop seconds so comparisons happen at minute precision
    pub fn truncate(time: NaiveTime) -> NaiveTime {
        time.with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(time)
    }

    pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(time) => serializer.serialize_str(&format(*time)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => match parse(value) {
                Ok(time) => Ok(Some(time)),
                Err(e) => {
                    tracing::warn!(value, "Ignoring stored time that is not HH:mm: {}", e);
                    Ok(None)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        clock::parse(s).unwrap()
    }

    fn task(date_str: &str, time_str: Option<&str>, completed: bool) -> Task {
        Task {
            id: "1".to_string(),
            content: "call mum".to_string(),
            date: date(date_str),
            time: time_str.map(time),
            location: None,
            completed,
            created_at: 0,
        }
    }

    #[test]
    fn title_stops_at_first_delimiter() {
        assert_eq!(derive_title("买牛奶,记得买两瓶"), "买牛奶");
        assert_eq!(derive_title("买牛奶，记得买两瓶"), "买牛奶");
        assert_eq!(derive_title("first line\nsecond"), "first line");
        assert_eq!(derive_title("今天天气很好。出去走走"), "今天天气很好");
    }

    #[test]
    fn title_is_truncated_to_fifteen_chars() {
        let title = derive_title("一二三四五六七八九十一二三四五六七八");
        assert_eq!(title.chars().count(), 15);
        assert_eq!(title, "一二三四五六七八九十一二三四五");
    }

    #[test]
    fn empty_title_falls_back_to_placeholder() {
        assert_eq!(derive_title(""), PLACEHOLDER_NOTE_TITLE);
        assert_eq!(derive_title(",后面才有内容"), PLACEHOLDER_NOTE_TITLE);
    }

    #[test]
    fn yesterday_is_overdue_regardless_of_time() {
        let today = date("2026-10-19");
        let now = time("08:00");
        assert!(task("2026-10-18", None, false).is_overdue(today, now));
        assert!(task("2026-10-18", Some("23:59"), false).is_overdue(today, now));
    }

    #[test]
    fn today_is_overdue_only_once_time_has_passed() {
        let today = date("2026-10-19");
        let now = time("15:00");
        assert!(task("2026-10-19", Some("14:30"), false).is_overdue(today, now));
        assert!(task("2026-10-19", Some("15:00"), false).is_overdue(today, now));
        assert!(!task("2026-10-19", Some("15:01"), false).is_overdue(today, now));
        assert!(!task("2026-10-19", None, false).is_overdue(today, now));
        assert!(!task("2026-10-20", Some("09:00"), false).is_overdue(today, now));
    }

    #[test]
    fn completed_task_is_never_overdue() {
        let today = date("2026-10-19");
        let now = time("15:00");
        assert!(!task("2026-10-01", Some("09:00"), true).is_overdue(today, now));
    }

    #[test]
    fn task_json_uses_web_field_names() {
        let t = task("2026-10-19", Some("09:05"), false);
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["date"], "2026-10-19");
        assert_eq!(json["time"], "09:05");
        assert_eq!(json["createdAt"], 0);
        assert!(json.get("location").is_none());

        let parsed: Task = serde_json::from_str(
            r#"{"id":"9","content":"x","date":"2026-01-02","time":"","completed":true,"createdAt":5}"#,
        )
        .unwrap();
        assert_eq!(parsed.time, None);
        assert!(parsed.completed);
    }

    #[test]
    fn loose_web_records_still_parse() {
        let parsed: Task = serde_json::from_str(
            r#"{"id":"7","content":"开会","date":"2026-10-20","time":"下午"}"#,
        )
        .unwrap();
        assert_eq!(parsed.time, None);
        assert!(!parsed.completed);
        assert_eq!(parsed.created_at, 0);
    }
}
