//! In-memory task and note lists plus settings, with a store write after
//! every change.
//!
//! AI-backed additions are split in two: `begin_*` checks the input and
//! settings, marks the state busy and hands back an [`AiJob`] for the caller
//! to run; [`AppState::finish_ai`] applies the job's [`AiOutcome`]. The
//! lists are only touched by `finish_ai`, so a failed request leaves them as
//! they were.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::ai::{AiClient, AiError};
use crate::models::{Note, NoteExtraction, Settings, Task, TaskExtraction};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Input is empty")]
    EmptyInput,
    #[error("Please configure your API key in Settings first")]
    MissingApiKey,
    #[error("An AI request is already in progress")]
    Busy,
    #[error("AI processing failed: {0}")]
    Ai(#[from] AiError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("No {kind} with id {id}")]
    NotFound { kind: &'static str, id: String },
}

/// A request for the AI gateway, captured with the settings in effect when it was made
#[derive(Debug, Clone)]
pub enum AiJob {
    Task { text: String, reference_date: NaiveDate, settings: Settings },
    Note { text: String, settings: Settings },
}

#[derive(Debug)]
pub enum AiOutcome {
    Task(Result<TaskExtraction, AiError>),
    Note { raw: String, result: Result<NoteExtraction, AiError> },
}

/// What `finish_ai` added
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Added {
    Task(String),
    Note(String),
}

impl AiJob {
    /// Call the gateway. Never retried; errors end up in the outcome.
    pub async fn run(self) -> AiOutcome {
        match self {
            AiJob::Task { text, reference_date, settings } => {
                let result = match AiClient::new(settings) {
                    Ok(client) => client.extract_task(&text, reference_date).await,
                    Err(e) => Err(e),
                };
                AiOutcome::Task(result)
            }
            AiJob::Note { text, settings } => {
                let result = match AiClient::new(settings) {
                    Ok(client) => client.extract_note(&text).await,
                    Err(e) => Err(e),
                };
                AiOutcome::Note { raw: text, result }
            }
        }
    }
}

/// Source of the current instant; swapped for a fixed one in tests
pub type Clock = Box<dyn Fn() -> DateTime<Local>>;

pub struct AppState {
    tasks: Vec<Task>,
    notes: Vec<Note>,
    settings: Settings,
    is_loading: bool,
    last_id: i64,
    store: Store,
    clock: Clock,
}

impl AppState {
    /// Read all collections once from the store
    pub fn load(store: Store) -> Self {
        Self::load_with_clock(store, Box::new(Local::now))
    }

    pub fn load_with_clock(store: Store, clock: Clock) -> Self {
        let tasks = store.load_tasks();
        let notes = store.load_notes();
        let settings = store.load_settings();
        tracing::info!(tasks = tasks.len(), notes = notes.len(), "Loaded data from store");
        Self {
            tasks,
            notes,
            settings,
            is_loading: false,
            last_id: 0,
            store,
            clock,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Local wall-clock time
    pub fn now(&self) -> NaiveDateTime {
        (self.clock)().naive_local()
    }

    /// The local calendar date; used for extraction, overdue checks and clear-today alike
    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Creation timestamp in millis and an id derived from it, unique within this state
    fn next_id(&mut self) -> (String, i64) {
        let created_at = (self.clock)().timestamp_millis();
        let existing_max = self.tasks.iter().map(|t| t.id.as_str())
            .chain(self.notes.iter().map(|n| n.id.as_str()))
            .filter_map(|id| id.parse::<i64>().ok())
            .max()
            .unwrap_or(0);
        let id = created_at.max(self.last_id + 1).max(existing_max + 1);
        self.last_id = id;
        (id.to_string(), created_at)
    }

    /// Write the task list. If the write fails the list goes back to
    /// `previous`, so memory never holds a change the store lacks.
    fn commit_tasks(&mut self, previous: Vec<Task>) -> Result<(), StateError> {
        if let Err(e) = self.store.save_tasks(&self.tasks) {
            tracing::error!("Saving tasks failed, change reverted: {}", e);
            self.tasks = previous;
            return Err(e.into());
        }
        Ok(())
    }

    fn commit_notes(&mut self, previous: Vec<Note>) -> Result<(), StateError> {
        if let Err(e) = self.store.save_notes(&self.notes) {
            tracing::error!("Saving notes failed, change reverted: {}", e);
            self.notes = previous;
            return Err(e.into());
        }
        Ok(())
    }

    fn begin_ai(&mut self, text: &str) -> Result<(), StateError> {
        if text.trim().is_empty() {
            return Err(StateError::EmptyInput);
        }
        if !self.settings.has_api_key() {
            return Err(StateError::MissingApiKey);
        }
        if self.is_loading {
            return Err(StateError::Busy);
        }
        self.is_loading = true;
        Ok(())
    }

    /// Start an AI task extraction with today as the reference date
    pub fn begin_add_task(&mut self, text: &str) -> Result<AiJob, StateError> {
        self.begin_ai(text)?;
        Ok(AiJob::Task {
            text: text.to_string(),
            reference_date: self.today(),
            settings: self.settings.clone(),
        })
    }

    /// Start an AI rewrite of a note
    pub fn begin_add_note_ai(&mut self, text: &str) -> Result<AiJob, StateError> {
        self.begin_ai(text)?;
        Ok(AiJob::Note {
            text: text.to_string(),
            settings: self.settings.clone(),
        })
    }

    /// Apply a finished AI job. On error nothing is added.
    pub fn finish_ai(&mut self, outcome: AiOutcome) -> Result<Added, StateError> {
        self.is_loading = false;
        match outcome {
            AiOutcome::Task(result) => {
                let extraction = result?;
                let (id, created_at) = self.next_id();
                let previous = self.tasks.clone();
                self.tasks.push(Task::from_extraction(id.clone(), extraction, created_at));
                self.commit_tasks(previous)?;
                tracing::info!(%id, "Task added");
                Ok(Added::Task(id))
            }
            AiOutcome::Note { raw, result } => {
                let extraction = result?;
                let (id, created_at) = self.next_id();
                let previous = self.notes.clone();
                self.notes.push(Note::from_extraction(id.clone(), raw, extraction, created_at));
                self.commit_notes(previous)?;
                tracing::info!(%id, "Note added");
                Ok(Added::Note(id))
            }
        }
    }

    /// Save a note as typed, without asking the model
    pub fn add_note_direct(&mut self, text: &str) -> Result<&Note, StateError> {
        if text.trim().is_empty() {
            return Err(StateError::EmptyInput);
        }
        let (id, created_at) = self.next_id();
        let previous = self.notes.clone();
        self.notes.push(Note::direct(id, text.to_string(), created_at));
        self.commit_notes(previous)?;
        self.notes.last().ok_or(StateError::EmptyInput)
    }

    fn task_index(&self, id: &str) -> Result<usize, StateError> {
        self.tasks.iter().position(|t| t.id == id)
            .ok_or_else(|| StateError::NotFound { kind: "task", id: id.to_string() })
    }

    fn note_index(&self, id: &str) -> Result<usize, StateError> {
        self.notes.iter().position(|n| n.id == id)
            .ok_or_else(|| StateError::NotFound { kind: "note", id: id.to_string() })
    }

    pub fn toggle_task(&mut self, id: &str) -> Result<bool, StateError> {
        let index = self.task_index(id)?;
        let previous = self.tasks.clone();
        let completed = !previous[index].completed;
        self.tasks[index].completed = completed;
        self.commit_tasks(previous)?;
        Ok(completed)
    }

    /// Replace a task's text. Blank text is rejected and the task kept as is.
    pub fn update_task(&mut self, id: &str, content: &str) -> Result<(), StateError> {
        if content.trim().is_empty() {
            return Err(StateError::EmptyInput);
        }
        let index = self.task_index(id)?;
        let previous = self.tasks.clone();
        self.tasks[index].content = content.to_string();
        self.commit_tasks(previous)
    }

    pub fn delete_task(&mut self, id: &str) -> Result<Task, StateError> {
        let index = self.task_index(id)?;
        let previous = self.tasks.clone();
        let removed = self.tasks.remove(index);
        self.commit_tasks(previous)?;
        Ok(removed)
    }

    /// Replace a note's content; its raw input stays untouched
    pub fn update_note(&mut self, id: &str, content: &str) -> Result<(), StateError> {
        if content.trim().is_empty() {
            return Err(StateError::EmptyInput);
        }
        let index = self.note_index(id)?;
        let previous = self.notes.clone();
        self.notes[index].content = content.to_string();
        self.commit_notes(previous)
    }

    pub fn delete_note(&mut self, id: &str) -> Result<Note, StateError> {
        let index = self.note_index(id)?;
        let previous = self.notes.clone();
        let removed = self.notes.remove(index);
        self.commit_notes(previous)?;
        Ok(removed)
    }

    /// Drop every completed task; returns how many were removed
    pub fn clear_completed(&mut self) -> Result<usize, StateError> {
        let before = self.tasks.len();
        let previous = self.tasks.clone();
        self.tasks.retain(|t| !t.completed);
        self.commit_tasks(previous)?;
        Ok(before - self.tasks.len())
    }

    /// Drop every task dated today
    pub fn clear_today(&mut self) -> Result<usize, StateError> {
        let today = self.today();
        let before = self.tasks.len();
        let previous = self.tasks.clone();
        self.tasks.retain(|t| t.date != today);
        self.commit_tasks(previous)?;
        Ok(before - self.tasks.len())
    }

    pub fn clear_notes(&mut self) -> Result<usize, StateError> {
        let previous = std::mem::take(&mut self.notes);
        let removed = previous.len();
        self.commit_notes(previous)?;
        Ok(removed)
    }

    pub fn update_settings(&mut self, settings: Settings) -> Result<(), StateError> {
        self.store.save_settings(&settings)?;
        self.settings = settings;
        tracing::info!(base_url = %self.settings.base_url, model = %self.settings.model, "Settings saved");
        Ok(())
    }

    pub fn is_overdue(&self, task: &Task) -> bool {
        let now = self.now();
        task.is_overdue(now.date(), now.time())
    }

    /// Open tasks first, then by date, then by time (untimed first)
    pub fn visible_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().collect();
        tasks.sort_by(|a, b| {
            a.completed.cmp(&b.completed)
                .then(a.date.cmp(&b.date))
                .then(a.time.cmp(&b.time))
        });
        tasks
    }

    /// Newest first
    pub fn visible_notes(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.notes.iter().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notes
    }

    /// Number of notes and total characters of their content
    pub fn note_stats(&self) -> (usize, usize) {
        let chars = self.notes.iter().map(|n| n.content.chars().count()).sum();
        (self.notes.len(), chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::clock;
    use chrono::{NaiveTime, TimeZone, Utc};

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
            .and_time(NaiveTime::from_hms_opt(15, 0, 0).unwrap())
    }

    fn state_with_key(key: &str) -> AppState {
        let store = Store::in_memory().unwrap();
        store.save_settings(&Settings {
            api_key: key.to_string(),
            base_url: "https://example.test/v1".to_string(),
            model: "qwen-plus".to_string(),
        }).unwrap();
        AppState::load_with_clock(store, Box::new(|| Local.from_local_datetime(&fixed_now()).single().unwrap()))
    }

    fn extraction(task: &str, date: NaiveDate, time: Option<&str>) -> TaskExtraction {
        TaskExtraction {
            task: task.to_string(),
            date,
            time: time.and_then(|t| clock::parse(t).ok()),
            location: None,
        }
    }

    fn add_task(state: &mut AppState, task: &str, date: NaiveDate) -> String {
        state.begin_add_task(task).unwrap();
        match state.finish_ai(AiOutcome::Task(Ok(extraction(task, date, None)))).unwrap() {
            Added::Task(id) => id,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn add_task_requires_api_key_and_makes_no_request() {
        let mut state = state_with_key("");
        if state.settings().has_api_key() {
            // A key baked in from the environment makes this case moot
            return;
        }
        assert!(matches!(state.begin_add_task("明天开会"), Err(StateError::MissingApiKey)));
        assert!(!state.is_loading());
        assert!(state.tasks().is_empty());
    }

    #[test]
    fn begin_add_task_uses_today_as_reference() {
        let mut state = state_with_key("sk-test");
        let job = state.begin_add_task("明天开会").unwrap();
        assert!(state.is_loading());
        match job {
            AiJob::Task { reference_date, text, .. } => {
                assert_eq!(reference_date, fixed_now().date());
                assert_eq!(text, "明天开会");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn second_request_is_refused_while_busy() {
        let mut state = state_with_key("sk-test");
        state.begin_add_task("a").unwrap();
        assert!(matches!(state.begin_add_note_ai("b"), Err(StateError::Busy)));
    }

    #[test]
    fn successful_extraction_appends_incomplete_task_and_persists() {
        let mut state = state_with_key("sk-test");
        state.begin_add_task("明天下午3点在会议室开会").unwrap();
        let mut result = extraction("开会", NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(), Some("15:00"));
        result.location = Some("会议室".to_string());
        let added = state.finish_ai(AiOutcome::Task(Ok(result))).unwrap();

        assert!(!state.is_loading());
        assert_eq!(state.tasks().len(), 1);
        let task = &state.tasks()[0];
        assert!(matches!(added, Added::Task(ref id) if *id == task.id));
        assert!(!task.completed);
        assert_eq!(task.location.as_deref(), Some("会议室"));
        assert_eq!(state.store.load_tasks(), state.tasks().to_vec());
    }

    #[test]
    fn non_json_reply_leaves_lists_unchanged_and_clears_busy_flag() {
        let mut state = state_with_key("sk-test");
        add_task(&mut state, "existing", fixed_now().date());
        let before = state.tasks().to_vec();

        state.begin_add_task("随便说点什么").unwrap();
        let parse_error = crate::ai::parse_task_reply("not json at all", fixed_now().date()).unwrap_err();
        let err = state.finish_ai(AiOutcome::Task(Err(parse_error))).unwrap_err();

        assert!(matches!(err, StateError::Ai(AiError::InvalidJson(_))));
        assert!(err.to_string().starts_with("AI processing failed"));
        assert!(!state.is_loading());
        assert_eq!(state.tasks(), before.as_slice());

        state.begin_add_note_ai("灵感").unwrap();
        let parse_error = crate::ai::parse_note_reply("<html>").unwrap_err();
        assert!(state.finish_ai(AiOutcome::Note { raw: "灵感".to_string(), result: Err(parse_error) }).is_err());
        assert!(state.notes().is_empty());
        assert!(!state.is_loading());
    }

    #[test]
    fn ai_note_keeps_raw_input() {
        let mut state = state_with_key("sk-test");
        state.begin_add_note_ai("嗯那个今天散步想到").unwrap();
        state.finish_ai(AiOutcome::Note {
            raw: "嗯那个今天散步想到".to_string(),
            result: Ok(NoteExtraction { title: "散步".to_string(), content: "今天散步时想到。".to_string() }),
        }).unwrap();

        let id = state.notes()[0].id.clone();
        state.update_note(&id, "改过的内容").unwrap();
        let note = &state.notes()[0];
        assert_eq!(note.raw, "嗯那个今天散步想到");
        assert_eq!(note.content, "改过的内容");
        assert_eq!(note.title, "散步");
    }

    #[test]
    fn direct_note_derives_title() {
        let mut state = state_with_key("");
        let note = state.add_note_direct("买牛奶,记得买两瓶").unwrap().clone();
        assert_eq!(note.title, "买牛奶");
        assert_eq!(note.content, note.raw);
        assert_eq!(state.store.load_notes(), vec![note]);
        assert!(matches!(state.add_note_direct("   "), Err(StateError::EmptyInput)));
    }

    #[test]
    fn ids_are_unique_within_the_same_millisecond() {
        let mut state = state_with_key("sk-test");
        let a = state.add_note_direct("one").unwrap().id.clone();
        let b = state.add_note_direct("two").unwrap().id.clone();
        let c = add_task(&mut state, "three", fixed_now().date());
        assert_ne!(a, b);
        assert_ne!(b, c);
    }

    #[test]
    fn clear_completed_keeps_open_tasks_untouched() {
        let mut state = state_with_key("sk-test");
        let today = fixed_now().date();
        let done = add_task(&mut state, "done", today);
        let open_a = add_task(&mut state, "open a", today);
        let open_b = add_task(&mut state, "open b", today.succ_opt().unwrap());
        state.toggle_task(&done).unwrap();
        let open_before: Vec<Task> = state.tasks().iter().filter(|t| !t.completed).cloned().collect();

        assert_eq!(state.clear_completed().unwrap(), 1);
        assert_eq!(state.tasks(), open_before.as_slice());
        assert!(state.tasks().iter().any(|t| t.id == open_a));
        assert!(state.tasks().iter().any(|t| t.id == open_b));
        assert_eq!(state.store.load_tasks(), open_before);
    }

    #[test]
    fn clear_today_keeps_other_dates() {
        let mut state = state_with_key("sk-test");
        let today = fixed_now().date();
        add_task(&mut state, "today", today);
        let tomorrow = add_task(&mut state, "tomorrow", today.succ_opt().unwrap());
        assert_eq!(state.clear_today().unwrap(), 1);
        assert_eq!(state.tasks().len(), 1);
        assert_eq!(state.tasks()[0].id, tomorrow);
    }

    #[test]
    fn toggle_edit_delete_by_id() {
        let mut state = state_with_key("sk-test");
        let id = add_task(&mut state, "write report", fixed_now().date());

        assert!(state.toggle_task(&id).unwrap());
        assert!(!state.toggle_task(&id).unwrap());

        state.update_task(&id, "write the report").unwrap();
        assert_eq!(state.tasks()[0].content, "write the report");
        assert!(matches!(state.update_task(&id, "  "), Err(StateError::EmptyInput)));
        assert_eq!(state.tasks()[0].content, "write the report");

        assert!(matches!(state.toggle_task("missing"), Err(StateError::NotFound { .. })));
        state.delete_task(&id).unwrap();
        assert!(state.tasks().is_empty());
        assert!(state.store.load_tasks().is_empty());
    }

    #[test]
    fn clear_notes_removes_everything() {
        let mut state = state_with_key("");
        state.add_note_direct("a").unwrap();
        state.add_note_direct("b").unwrap();
        assert_eq!(state.clear_notes().unwrap(), 2);
        assert!(state.store.load_notes().is_empty());
    }

    #[test]
    fn visible_tasks_put_open_first_then_date_then_time() {
        let mut state = state_with_key("sk-test");
        let today = fixed_now().date();
        let tomorrow = today.succ_opt().unwrap();
        let late = add_task(&mut state, "late", tomorrow);
        let done = add_task(&mut state, "done", today);
        state.toggle_task(&done).unwrap();
        let early = add_task(&mut state, "early", today);

        let order: Vec<&str> = state.visible_tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec![early.as_str(), late.as_str(), done.as_str()]);
    }

    #[test]
    fn overdue_uses_the_state_clock() {
        let mut state = state_with_key("sk-test");
        let yesterday = fixed_now().date().pred_opt().unwrap();
        let id = add_task(&mut state, "old", yesterday);
        let task = state.tasks().iter().find(|t| t.id == id).unwrap().clone();
        assert!(state.is_overdue(&task));
    }

    #[test]
    fn note_stats_count_characters() {
        let mut state = state_with_key("");
        state.add_note_direct("你好").unwrap();
        state.add_note_direct("abc").unwrap();
        assert_eq!(state.note_stats(), (2, 5));
    }

    #[test]
    fn settings_update_is_persisted() {
        let mut state = state_with_key("sk-old");
        let mut settings = state.settings().clone();
        settings.model = "qwen-max".to_string();
        state.update_settings(settings.clone()).unwrap();
        assert_eq!(state.store.load_settings(), settings);
    }

    #[test]
    fn created_at_is_epoch_millis_of_the_current_instant() {
        let mut state = AppState::load(Store::in_memory().unwrap());
        let before = Utc::now().timestamp_millis();
        let created_at = state.add_note_direct("hello").unwrap().created_at;
        let after = Utc::now().timestamp_millis();
        assert!(before <= created_at && created_at <= after, "{before} <= {created_at} <= {after}");
    }

    #[test]
    fn created_at_follows_the_local_clock_instant() {
        let mut state = state_with_key("");
        let expected = Local.from_local_datetime(&fixed_now()).single().unwrap().timestamp_millis();
        assert_eq!(state.add_note_direct("hello").unwrap().created_at, expected);
        assert_eq!(state.now(), fixed_now());
    }

    #[test]
    fn failed_write_reverts_the_in_memory_change() {
        let mut state = state_with_key("sk-old");
        let id = add_task(&mut state, "write report", fixed_now().date());
        let note = state.add_note_direct("keep me").unwrap().id.clone();
        let tasks = state.tasks().to_vec();
        let notes = state.notes().to_vec();
        let settings = state.settings().clone();
        state.store.make_read_only().unwrap();

        assert!(matches!(state.toggle_task(&id), Err(StateError::Store(_))));
        assert!(matches!(state.update_task(&id, "new text"), Err(StateError::Store(_))));
        assert!(matches!(state.delete_task(&id), Err(StateError::Store(_))));
        assert!(matches!(state.clear_today(), Err(StateError::Store(_))));
        assert_eq!(state.tasks(), tasks.as_slice());

        assert!(state.add_note_direct("lost").is_err());
        assert!(state.update_note(&note, "changed").is_err());
        assert!(state.delete_note(&note).is_err());
        assert!(state.clear_notes().is_err());
        assert_eq!(state.notes(), notes.as_slice());

        state.begin_add_task("another").unwrap();
        let outcome = AiOutcome::Task(Ok(extraction("another", fixed_now().date(), None)));
        assert!(state.finish_ai(outcome).is_err());
        assert!(!state.is_loading());
        assert_eq!(state.tasks(), tasks.as_slice());

        let mut changed = settings.clone();
        changed.model = "qwen-max".to_string();
        assert!(state.update_settings(changed).is_err());
        assert_eq!(state.settings(), &settings);
    }
}
