use crate::Config;
use crate::config::ParsedKeyBindings;
use crate::models::Settings;
use crate::speech::{CommandEngine, RecognitionEngine, SpeechCapture};
use crate::state::{Added, AiJob, AiOutcome, AppState, StateError};
use crate::tui::error::TuiError;
use crate::tui::widgets::editor::Editor;
use ratatui::widgets::ListState;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Shown while an AI request is in flight
pub const THINKING_MESSAGE: &str = "AI 正在思考...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Tasks,
    Notes,
}

impl Tab {
    pub fn toggled(self) -> Self {
        match self {
            Tab::Tasks => Tab::Notes,
            Tab::Notes => Tab::Tasks,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    View,
    Input,
    Settings,
    Help,
}

/// What the input box is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    NewTask,
    NewNote,
    EditTask(String),
    EditNote(String),
}

impl InputKind {
    pub fn title(&self) -> &'static str {
        match self {
            InputKind::NewTask => "新任务",
            InputKind::NewNote => "新记录",
            InputKind::EditTask(_) => "编辑任务",
            InputKind::EditNote(_) => "编辑记录",
        }
    }

    pub fn is_edit(&self) -> bool {
        matches!(self, InputKind::EditTask(_) | InputKind::EditNote(_))
    }
}

/// Destructive action waiting for a yes/no
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingConfirm {
    DeleteTask { id: String, label: String },
    DeleteNote { id: String, label: String },
    ClearCompleted,
    ClearToday,
    ClearNotes,
}

impl PendingConfirm {
    pub fn prompt(&self) -> String {
        match self {
            PendingConfirm::DeleteTask { label, .. } => format!("确定删除任务「{}」吗？", label),
            PendingConfirm::DeleteNote { label, .. } => format!("确定删除记录「{}」吗？", label),
            PendingConfirm::ClearCompleted => "确定清除所有已完成的任务吗？".to_string(),
            PendingConfirm::ClearToday => "确定清除今天的所有任务吗？".to_string(),
            PendingConfirm::ClearNotes => "确定清空所有记录吗？此操作不可恢复。".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    ApiKey,
    BaseUrl,
    Model,
}

impl SettingsField {
    pub fn next(self) -> Self {
        match self {
            SettingsField::ApiKey => SettingsField::BaseUrl,
            SettingsField::BaseUrl => SettingsField::Model,
            SettingsField::Model => SettingsField::ApiKey,
        }
    }

    pub fn previous(self) -> Self {
        match self {
            SettingsField::ApiKey => SettingsField::Model,
            SettingsField::BaseUrl => SettingsField::ApiKey,
            SettingsField::Model => SettingsField::BaseUrl,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UiState {
    pub current_tab: Tab,
    pub mode: Mode,
    pub selected_index: usize,
    pub list_state: ListState,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            current_tab: Tab::Tasks,
            mode: Mode::View,
            selected_index: 0,
            list_state: ListState::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputState {
    pub kind: Option<InputKind>,
    pub editor: Editor,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            kind: None,
            editor: Editor::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModalState {
    pub confirm: Option<PendingConfirm>,
    /// 0 = confirm, 1 = cancel
    pub selection: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StatusState {
    pub message: Option<String>,
    pub message_time: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct SettingsFormState {
    pub field: SettingsField,
    pub api_key: Editor,
    pub base_url: Editor,
    pub model: Editor,
    pub reveal_key: bool,
    /// Opened because an AI action needed a key
    pub required: bool,
}

impl SettingsFormState {
    fn from_settings(settings: &Settings, required: bool) -> Self {
        Self {
            field: SettingsField::ApiKey,
            api_key: Editor::from_string(&settings.api_key),
            base_url: Editor::from_string(&settings.base_url),
            model: Editor::from_string(&settings.model),
            reveal_key: false,
            required,
        }
    }

    pub fn current_editor(&mut self) -> &mut Editor {
        match self.field {
            SettingsField::ApiKey => &mut self.api_key,
            SettingsField::BaseUrl => &mut self.base_url,
            SettingsField::Model => &mut self.model,
        }
    }

    pub fn to_settings(&self) -> Settings {
        Settings {
            api_key: self.api_key.text().trim().to_string(),
            base_url: self.base_url.text().trim().to_string(),
            model: self.model.text().trim().to_string(),
        }
    }
}

pub struct App {
    // Core infrastructure
    pub config: Config,
    pub keys: ParsedKeyBindings,
    pub state: AppState,
    pub speech: SpeechCapture,
    runtime: Handle,
    ai_tx: UnboundedSender<AiOutcome>,
    ai_rx: UnboundedReceiver<AiOutcome>,
    last_speech_error: Option<String>,

    // Grouped state
    pub ui: UiState,
    pub input: InputState,
    pub modals: ModalState,
    pub status: StatusState,
    pub settings_form: SettingsFormState,
}

impl App {
    pub fn new(config: Config, state: AppState, runtime: Handle) -> Result<Self, TuiError> {
        let keys = config.parsed_key_bindings()?;
        let engine = CommandEngine::from_argv(&config.speech_command)
            .map(|engine| Box::new(engine) as Box<dyn RecognitionEngine>);
        let speech = SpeechCapture::new(engine);
        let (ai_tx, ai_rx) = mpsc::unbounded_channel();
        let settings_form = SettingsFormState::from_settings(state.settings(), false);

        let mut app = Self {
            config,
            keys,
            state,
            last_speech_error: speech.error().map(str::to_string),
            speech,
            runtime,
            ai_tx,
            ai_rx,
            ui: UiState::default(),
            input: InputState::default(),
            modals: ModalState::default(),
            status: StatusState::default(),
            settings_form,
        };
        app.adjust_selected_index();
        Ok(app)
    }

    pub fn runtime(&self) -> Handle {
        self.runtime.clone()
    }

    pub fn item_count(&self) -> usize {
        match self.ui.current_tab {
            Tab::Tasks => self.state.tasks().len(),
            Tab::Notes => self.state.notes().len(),
        }
    }

    pub fn selected_task_id(&self) -> Option<String> {
        if self.ui.current_tab != Tab::Tasks {
            return None;
        }
        self.state.visible_tasks().get(self.ui.selected_index).map(|t| t.id.clone())
    }

    pub fn selected_note_id(&self) -> Option<String> {
        if self.ui.current_tab != Tab::Notes {
            return None;
        }
        self.state.visible_notes().get(self.ui.selected_index).map(|n| n.id.clone())
    }

    /// Clamp the selection after the list changed
    pub fn adjust_selected_index(&mut self) {
        let count = self.item_count();
        if count == 0 {
            self.ui.selected_index = 0;
        } else if self.ui.selected_index >= count {
            self.ui.selected_index = count - 1;
        }
        self.sync_list_state();
    }

    pub fn sync_list_state(&mut self) {
        let selected = if self.item_count() == 0 {
            None
        } else {
            Some(self.ui.selected_index)
        };
        self.ui.list_state.select(selected);
    }

    pub fn move_selection_up(&mut self) {
        if self.ui.selected_index > 0 {
            self.ui.selected_index -= 1;
        }
        self.sync_list_state();
    }

    pub fn move_selection_down(&mut self) {
        if self.ui.selected_index + 1 < self.item_count() {
            self.ui.selected_index += 1;
        }
        self.sync_list_state();
    }

    fn select_task(&mut self, id: &str) {
        if let Some(index) = self.state.visible_tasks().iter().position(|t| t.id == id) {
            self.ui.selected_index = index;
        }
        self.sync_list_state();
    }

    fn select_note(&mut self, id: &str) {
        if let Some(index) = self.state.visible_notes().iter().position(|n| n.id == id) {
            self.ui.selected_index = index;
        }
        self.sync_list_state();
    }

    pub fn switch_tab(&mut self, tab: Tab) {
        if self.ui.current_tab == tab {
            return;
        }
        self.ui.current_tab = tab;
        self.ui.selected_index = 0;
        self.adjust_selected_index();
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status.message = Some(message.into());
        self.status.message_time = Some(Instant::now());
    }

    pub fn clear_status_message(&mut self) {
        self.status.message = None;
        self.status.message_time = None;
    }

    /// Check if status message should be auto-cleared
    pub fn check_status_message_timeout(&mut self) {
        const STATUS_MESSAGE_TIMEOUT_SECS: u64 = 4;
        if let Some(time) = self.status.message_time {
            if time.elapsed().as_secs() >= STATUS_MESSAGE_TIMEOUT_SECS {
                self.clear_status_message();
            }
        }
    }

    pub fn new_input_kind(&self) -> InputKind {
        match self.ui.current_tab {
            Tab::Tasks => InputKind::NewTask,
            Tab::Notes => InputKind::NewNote,
        }
    }

    pub fn enter_input_mode(&mut self, kind: InputKind) {
        let text = match &kind {
            InputKind::EditTask(id) => self.state.tasks().iter()
                .find(|t| &t.id == id)
                .map(|t| t.content.clone())
                .unwrap_or_default(),
            InputKind::EditNote(id) => self.state.notes().iter()
                .find(|n| &n.id == id)
                .map(|n| n.content.clone())
                .unwrap_or_default(),
            InputKind::NewTask | InputKind::NewNote => String::new(),
        };
        self.input.editor = Editor::from_string(&text);
        self.input.kind = Some(kind);
        self.ui.mode = Mode::Input;
    }

    pub fn exit_input_mode(&mut self) {
        if self.speech.is_listening() {
            self.speech.abort();
        }
        self.input = InputState::default();
        self.ui.mode = Mode::View;
    }

    /// Submit the input box. `use_ai` only matters for new notes; new tasks
    /// always go through the model.
    pub fn submit_input(&mut self, use_ai: bool) {
        let Some(kind) = self.input.kind.clone() else {
            return;
        };
        if self.state.is_loading() && !kind.is_edit() {
            self.set_status_message(StateError::Busy.to_string());
            return;
        }
        let text = self.input.editor.text();

        let result: Result<Option<AiJob>, StateError> = match &kind {
            InputKind::NewTask => self.state.begin_add_task(&text).map(Some),
            InputKind::NewNote if use_ai => self.state.begin_add_note_ai(&text).map(Some),
            InputKind::NewNote => self.state.add_note_direct(&text).map(|_| None),
            InputKind::EditTask(id) => self.state.update_task(id, &text).map(|_| None),
            InputKind::EditNote(id) => self.state.update_note(id, &text).map(|_| None),
        };

        match result {
            Ok(Some(job)) => {
                // Input stays open until the reply arrives so a failure keeps the text
                self.spawn_ai(job);
                self.set_status_message(THINKING_MESSAGE);
            }
            Ok(None) => {
                self.exit_input_mode();
                match kind {
                    InputKind::NewNote => {
                        self.ui.selected_index = 0;
                        self.sync_list_state();
                        self.set_status_message("记录已保存");
                    }
                    _ => self.set_status_message("已更新"),
                }
            }
            Err(StateError::EmptyInput) => {
                if kind.is_edit() {
                    self.exit_input_mode();
                }
            }
            Err(StateError::MissingApiKey) => {
                self.set_status_message(StateError::MissingApiKey.to_string());
                self.enter_settings_mode(true);
            }
            Err(e) => {
                tracing::error!("Input submit failed: {}", e);
                self.set_status_message(e.to_string());
            }
        }
    }

    fn spawn_ai(&self, job: AiJob) {
        let tx = self.ai_tx.clone();
        self.runtime.spawn(async move {
            let outcome = job.run().await;
            // The app may have quit meanwhile
            let _ = tx.send(outcome);
        });
    }

    /// Drain finished AI requests and speech events. Called once per tick.
    pub fn poll_background(&mut self) {
        while let Ok(outcome) = self.ai_rx.try_recv() {
            self.apply_ai_outcome(outcome);
        }

        if let Some(transcript) = self.speech.poll() {
            if self.ui.mode == Mode::Input {
                self.input.editor.set_text(&transcript);
                self.set_status_message("识别完成，可编辑后提交");
            }
        }

        let error = self.speech.error().map(str::to_string);
        if error != self.last_speech_error {
            if let Some(ref message) = error {
                self.set_status_message(format!("语音识别出错: {}", message));
            }
            self.last_speech_error = error;
        }
    }

    pub fn apply_ai_outcome(&mut self, outcome: AiOutcome) {
        match self.state.finish_ai(outcome) {
            Ok(Added::Task(id)) => {
                self.close_input_after_ai(InputKind::NewTask);
                self.switch_tab(Tab::Tasks);
                self.select_task(&id);
                self.set_status_message("任务已添加");
            }
            Ok(Added::Note(id)) => {
                self.close_input_after_ai(InputKind::NewNote);
                self.switch_tab(Tab::Notes);
                self.select_note(&id);
                self.set_status_message("记录已保存");
            }
            Err(e) => {
                tracing::error!("AI request failed: {}", e);
                self.set_status_message(e.to_string());
            }
        }
    }

    fn close_input_after_ai(&mut self, kind: InputKind) {
        if self.ui.mode == Mode::Input && self.input.kind.as_ref() == Some(&kind) {
            self.exit_input_mode();
        }
    }

    /// Start listening, or stop when already listening
    pub fn toggle_voice(&mut self) {
        if self.speech.is_listening() {
            self.speech.stop();
            return;
        }
        if !self.speech.is_supported() {
            self.set_status_message(crate::speech::SpeechError::Unsupported.to_string());
            return;
        }
        if self.ui.mode != Mode::Input {
            let kind = self.new_input_kind();
            self.enter_input_mode(kind);
        }
        self.speech.start();
        if self.speech.is_listening() {
            self.set_status_message("正在听... Enter 结束, Esc 取消");
        }
    }

    pub fn request_confirm(&mut self, pending: PendingConfirm) {
        self.modals.confirm = Some(pending);
        self.modals.selection = 0;
    }

    pub fn request_delete_selected(&mut self) {
        let pending = match self.ui.current_tab {
            Tab::Tasks => self.selected_task_id().and_then(|id| {
                self.state.tasks().iter().find(|t| t.id == id)
                    .map(|t| PendingConfirm::DeleteTask { id, label: t.content.clone() })
            }),
            Tab::Notes => self.selected_note_id().and_then(|id| {
                self.state.notes().iter().find(|n| n.id == id)
                    .map(|n| PendingConfirm::DeleteNote { id, label: n.title.clone() })
            }),
        };
        if let Some(pending) = pending {
            self.request_confirm(pending);
        }
    }

    pub fn cancel_confirm(&mut self) {
        self.modals = ModalState::default();
    }

    /// Run the pending destructive action
    pub fn confirm_pending(&mut self) {
        let Some(pending) = self.modals.confirm.take() else {
            return;
        };
        self.modals.selection = 0;

        let result = match pending {
            PendingConfirm::DeleteTask { id, .. } => self.state.delete_task(&id).map(|_| "任务已删除".to_string()),
            PendingConfirm::DeleteNote { id, .. } => self.state.delete_note(&id).map(|_| "记录已删除".to_string()),
            PendingConfirm::ClearCompleted => self.state.clear_completed()
                .map(|n| format!("已清除 {} 个已完成任务", n)),
            PendingConfirm::ClearToday => self.state.clear_today()
                .map(|n| format!("已清除今天的 {} 个任务", n)),
            PendingConfirm::ClearNotes => self.state.clear_notes()
                .map(|n| format!("已清空 {} 条记录", n)),
        };

        match result {
            Ok(message) => self.set_status_message(message),
            Err(e) => {
                tracing::error!("Destructive action failed: {}", e);
                self.set_status_message(e.to_string());
            }
        }
        self.adjust_selected_index();
    }

    pub fn toggle_selected_task(&mut self) {
        let Some(id) = self.selected_task_id() else {
            return;
        };
        match self.state.toggle_task(&id) {
            // Sorting moves the task; keep it selected
            Ok(_) => self.select_task(&id),
            Err(e) => self.set_status_message(e.to_string()),
        }
    }

    pub fn edit_selected(&mut self) {
        let kind = match self.ui.current_tab {
            Tab::Tasks => self.selected_task_id().map(InputKind::EditTask),
            Tab::Notes => self.selected_note_id().map(InputKind::EditNote),
        };
        if let Some(kind) = kind {
            self.enter_input_mode(kind);
        }
    }

    pub fn enter_settings_mode(&mut self, required: bool) {
        if self.speech.is_listening() {
            self.speech.abort();
        }
        self.settings_form = SettingsFormState::from_settings(self.state.settings(), required);
        self.ui.mode = Mode::Settings;
    }

    /// Return to the input box if one is open, otherwise to the list
    pub fn exit_settings_mode(&mut self) {
        self.ui.mode = if self.input.kind.is_some() { Mode::Input } else { Mode::View };
    }

    pub fn save_settings_form(&mut self) {
        let settings = self.settings_form.to_settings();
        match self.state.update_settings(settings) {
            Ok(()) => {
                self.set_status_message("设置已保存");
                self.exit_settings_mode();
            }
            Err(e) => self.set_status_message(e.to_string()),
        }
    }

    pub fn enter_help_mode(&mut self) {
        self.ui.mode = Mode::Help;
    }

    pub fn exit_help_mode(&mut self) {
        self.ui.mode = if self.input.kind.is_some() { Mode::Input } else { Mode::View };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskExtraction;
    use crate::store::Store;
    use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
            .and_time(NaiveTime::from_hms_opt(9, 0, 0).unwrap())
    }

    fn app_with_key(key: &str) -> (App, tokio::runtime::Runtime) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let store = Store::in_memory().unwrap();
        store.save_settings(&Settings {
            api_key: key.to_string(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            model: "m".to_string(),
        }).unwrap();
        let state = AppState::load_with_clock(
            store,
            Box::new(|| Local.from_local_datetime(&fixed_now()).single().unwrap()),
        );
        let app = App::new(Config::default(), state, runtime.handle().clone()).unwrap();
        (app, runtime)
    }

    #[test]
    fn direct_note_from_input_box() {
        let (mut app, _rt) = app_with_key("");
        app.switch_tab(Tab::Notes);
        app.enter_input_mode(app.new_input_kind());
        app.input.editor.insert_str("买牛奶,记得买两瓶");
        app.submit_input(false);

        assert_eq!(app.ui.mode, Mode::View);
        assert_eq!(app.state.notes().len(), 1);
        assert_eq!(app.state.notes()[0].title, "买牛奶");
    }

    #[test]
    fn missing_key_opens_settings() {
        let (mut app, _rt) = app_with_key("");
        if app.state.settings().has_api_key() {
            return;
        }
        app.enter_input_mode(InputKind::NewTask);
        app.input.editor.insert_str("明天开会");
        app.submit_input(true);

        assert_eq!(app.ui.mode, Mode::Settings);
        assert!(app.settings_form.required);
        assert!(!app.state.is_loading());
        // Closing settings returns to the still-open input box
        app.exit_settings_mode();
        assert_eq!(app.ui.mode, Mode::Input);
        assert_eq!(app.input.editor.text(), "明天开会");
    }

    #[test]
    fn ai_outcome_closes_input_and_selects_new_task() {
        let (mut app, _rt) = app_with_key("sk-test");
        app.enter_input_mode(InputKind::NewTask);
        app.input.editor.insert_str("明天开会");
        // Begin directly so no request is spawned
        app.state.begin_add_task("明天开会").unwrap();
        app.apply_ai_outcome(AiOutcome::Task(Ok(TaskExtraction {
            task: "开会".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            time: None,
            location: None,
        })));

        assert_eq!(app.ui.mode, Mode::View);
        assert_eq!(app.selected_task_id(), Some(app.state.tasks()[0].id.clone()));
        assert!(!app.state.is_loading());
    }

    #[test]
    fn delete_needs_confirmation() {
        let (mut app, _rt) = app_with_key("");
        app.switch_tab(Tab::Notes);
        app.enter_input_mode(InputKind::NewNote);
        app.input.editor.insert_str("一条记录");
        app.submit_input(false);

        app.request_delete_selected();
        assert!(matches!(app.modals.confirm, Some(PendingConfirm::DeleteNote { .. })));
        assert_eq!(app.state.notes().len(), 1);

        app.cancel_confirm();
        assert_eq!(app.state.notes().len(), 1);

        app.request_delete_selected();
        app.confirm_pending();
        assert!(app.state.notes().is_empty());
        assert!(app.modals.confirm.is_none());
    }

    #[test]
    fn blank_edit_leaves_task_alone() {
        let (mut app, _rt) = app_with_key("sk-test");
        app.state.begin_add_task("x").unwrap();
        app.apply_ai_outcome(AiOutcome::Task(Ok(TaskExtraction {
            task: "写周报".to_string(),
            date: fixed_now().date(),
            time: None,
            location: None,
        })));
        app.edit_selected();
        assert_eq!(app.input.editor.text(), "写周报");
        app.input.editor.set_text("   ");
        app.submit_input(false);
        assert_eq!(app.ui.mode, Mode::View);
        assert_eq!(app.state.tasks()[0].content, "写周报");
    }

    #[test]
    fn voice_without_engine_reports_unavailable() {
        let (mut app, _rt) = app_with_key("");
        app.toggle_voice();
        assert!(!app.speech.is_listening());
        assert!(app.status.message.as_deref().unwrap_or_default().contains("not available"));
    }
}
