use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;

use crate::models::{Note, Settings, Task};

pub const TASKS_KEY: &str = "sxj_tasks";
pub const NOTES_KEY: &str = "sxj_notes";
pub const SETTINGS_KEY: &str = "sxj_settings";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Failed to serialize value: {0}")]
    SerializeError(#[from] serde_json::Error),
    #[error("Failed to create store directory: {0}")]
    DirectoryError(String),
}

/// String-keyed JSON values, one row per key. Writes overwrite; there is no merging.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store file and initialize the schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::DirectoryError(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Store { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Store that lives only as long as the value (used by tests)
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = Store { conn: Connection::open_in_memory()? };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Refuse every later write, as a full or read-only disk would
    #[cfg(test)]
    pub(crate) fn make_read_only(&self) -> Result<(), StoreError> {
        self.conn.execute_batch("PRAGMA query_only = ON")?;
        Ok(())
    }

    /// Raw JSON text saved under `key`, if any
    pub fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Overwrite `key` with raw text
    pub fn set_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Value saved under `key`, or `fallback` when nothing was saved, the row
    /// cannot be read, or the JSON does not parse. Failures are logged only.
    pub fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        let raw = match self.get_raw(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return fallback,
            Err(e) => {
                tracing::error!(key, "Failed to read stored value: {}", e);
                return fallback;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, "Failed to parse stored data: {}", e);
                fallback
            }
        }
    }

    /// Serialize `value` and overwrite `key` unconditionally
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.set_raw(key, &json)
    }

    /// Records saved as a JSON array under `key`. A record that does not fit
    /// `T` is logged and skipped so the rest of the list still loads.
    pub fn get_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let records: Vec<serde_json::Value> = self.get(key, Vec::new());
        records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value(record) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(key, index, "Skipping unreadable record: {}", e);
                    None
                }
            })
            .collect()
    }

    pub fn load_tasks(&self) -> Vec<Task> {
        self.get_list(TASKS_KEY)
    }

    pub fn save_tasks(&self, tasks: &[Task]) -> Result<(), StoreError> {
        self.set(TASKS_KEY, tasks)
    }

    pub fn load_notes(&self) -> Vec<Note> {
        self.get_list(NOTES_KEY)
    }

    pub fn save_notes(&self, notes: &[Note]) -> Result<(), StoreError> {
        self.set(NOTES_KEY, notes)
    }

    /// Stored settings merged field by field over the defaults.
    ///
    /// Fields missing from the stored record are backfilled, an empty stored
    /// API key is replaced by the environment default, and an unreadable
    /// record yields the defaults unchanged.
    pub fn load_settings(&self) -> Settings {
        let defaults = Settings::defaults();
        let stored: Option<serde_json::Value> = self.get(SETTINGS_KEY, None);

        let Some(serde_json::Value::Object(fields)) = stored else {
            return defaults;
        };

        let field = |name: &str, default: &str| -> String {
            fields
                .get(name)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| default.to_string())
        };

        let api_key = match fields.get("apiKey").and_then(serde_json::Value::as_str) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => defaults.api_key.clone(),
        };

        Settings {
            api_key,
            base_url: field("baseUrl", &defaults.base_url),
            model: field("model", &defaults.model),
        }
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.set(SETTINGS_KEY, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_tasks() -> Vec<Task> {
        vec![
            Task {
                id: "1700000000000".to_string(),
                content: "开会".to_string(),
                date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
                time: crate::models::clock::parse("15:00").ok(),
                location: Some("会议室".to_string()),
                completed: false,
                created_at: 1_700_000_000_000,
            },
            Task {
                id: "1700000000001".to_string(),
                content: "买菜".to_string(),
                date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
                time: None,
                location: None,
                completed: true,
                created_at: 1_700_000_000_001,
            },
        ]
    }

    #[test]
    fn tasks_round_trip() {
        let store = Store::in_memory().unwrap();
        let tasks = sample_tasks();
        store.save_tasks(&tasks).unwrap();
        assert_eq!(store.load_tasks(), tasks);

        store.save_tasks(&[]).unwrap();
        assert!(store.load_tasks().is_empty());
    }

    #[test]
    fn notes_round_trip() {
        let store = Store::in_memory().unwrap();
        let notes = vec![Note::direct("1".to_string(), "买牛奶,记得买两瓶".to_string(), 1)];
        store.save_notes(&notes).unwrap();
        assert_eq!(store.load_notes(), notes);
    }

    #[test]
    fn missing_key_returns_fallback() {
        let store = Store::in_memory().unwrap();
        assert!(store.load_tasks().is_empty());
        assert_eq!(store.get("nothing-here", 42u32), 42);
    }

    #[test]
    fn corrupt_value_returns_fallback() {
        let store = Store::in_memory().unwrap();
        store.set_raw(TASKS_KEY, "[{not json").unwrap();
        assert!(store.load_tasks().is_empty());
    }

    #[test]
    fn one_bad_record_does_not_drop_the_list() {
        let store = Store::in_memory().unwrap();
        store.set_raw(TASKS_KEY, r#"[
            {"id":"1","content":"开会","date":"2026-10-20","time":"15:00","completed":false,"createdAt":1},
            {"id":"2","content":"散步","date":"2026-10-20","time":"下午","completed":false,"createdAt":2},
            {"id":"3","content":"no date","completed":false,"createdAt":3},
            {"id":"4","content":"买菜","date":"2026-10-21","createdAt":4}
        ]"#).unwrap();

        let tasks = store.load_tasks();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "4"]);
        assert_eq!(tasks[1].time, None);
        assert!(!tasks[2].completed);
    }

    #[test]
    fn set_overwrites_previous_value() {
        let store = Store::in_memory().unwrap();
        store.set("k", &vec![1, 2, 3]).unwrap();
        store.set("k", &vec![4]).unwrap();
        assert_eq!(store.get::<Vec<i32>>("k", Vec::new()), vec![4]);
    }

    #[test]
    fn corrupt_settings_yield_defaults() {
        let store = Store::in_memory().unwrap();
        store.set_raw(SETTINGS_KEY, "{\"apiKey\": ").unwrap();
        assert_eq!(store.load_settings(), Settings::defaults());

        store.set_raw(SETTINGS_KEY, "[1,2]").unwrap();
        assert_eq!(store.load_settings(), Settings::defaults());
    }

    #[test]
    fn partial_settings_are_backfilled() {
        let store = Store::in_memory().unwrap();
        store.set_raw(SETTINGS_KEY, r#"{"apiKey":"sk-test","model":"qwen-max"}"#).unwrap();
        let settings = store.load_settings();
        assert_eq!(settings.api_key, "sk-test");
        assert_eq!(settings.model, "qwen-max");
        assert_eq!(settings.base_url, crate::models::DEFAULT_BASE_URL);
    }

    #[test]
    fn empty_stored_key_uses_default_key() {
        let store = Store::in_memory().unwrap();
        store.set_raw(SETTINGS_KEY, r#"{"apiKey":"","baseUrl":"http://localhost:8080/v1","model":"m"}"#).unwrap();
        let settings = store.load_settings();
        assert_eq!(settings.api_key, crate::models::default_api_key());
        assert_eq!(settings.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn settings_round_trip() {
        let store = Store::in_memory().unwrap();
        let settings = Settings {
            api_key: "sk-1".to_string(),
            base_url: "https://example.test/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
        };
        store.save_settings(&settings).unwrap();
        assert_eq!(store.load_settings(), settings);
    }
}
