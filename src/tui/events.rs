use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
    LeaveAlternateScreen, size as terminal_size,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Duration;
use crate::state::AppState;
use crate::store::Store;
use crate::tui::App;
use crate::tui::app::{Mode, PendingConfirm, Tab};
use crate::tui::error::TuiError;
use crate::tui::layout::Layout;
use crate::tui::widgets::editor::Editor;
use crate::tui::widgets::error_screen::render_error_screen;
use crate::utils::has_primary_modifier;

type Term = Terminal<CrosstermBackend<Stdout>>;

/// Guard that ensures terminal state is restored even on panic
struct TerminalGuard {
    raw_mode_enabled: bool,
    alternate_screen_enabled: bool,
    /// Set when the terminal reports modifiers on Enter (needed for Shift+Enter)
    keyboard_enhanced: bool,
}

impl TerminalGuard {
    fn new() -> Result<Self, TuiError> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
        if keyboard_enhanced {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
            )?;
        }

        Ok(Self {
            raw_mode_enabled: true,
            alternate_screen_enabled: true,
            keyboard_enhanced,
        })
    }

    /// Restore terminal state on normal exit; the guard does nothing on drop afterwards
    fn restore(&mut self) -> Result<(), TuiError> {
        if self.keyboard_enhanced {
            execute!(io::stdout(), PopKeyboardEnhancementFlags)?;
            self.keyboard_enhanced = false;
        }
        if self.raw_mode_enabled {
            disable_raw_mode()?;
            self.raw_mode_enabled = false;
        }
        if self.alternate_screen_enabled {
            execute!(io::stdout(), LeaveAlternateScreen)?;
            self.alternate_screen_enabled = false;
        }
        Ok(())
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        // Errors are ignored, we're already in a cleanup path
        if self.keyboard_enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        if self.raw_mode_enabled {
            let _ = disable_raw_mode();
        }
        if self.alternate_screen_enabled {
            let _ = execute!(io::stdout(), LeaveAlternateScreen);
        }
    }
}

/// Run the TUI until the user quits.
///
/// A panic inside the loop is caught and replaced by an error screen that
/// offers to reload (rebuild the app from the store at `data_path`) or quit.
pub fn run_event_loop(mut app: App, data_path: &Path) -> Result<(), TuiError> {
    // Check terminal size before entering alternate screen so the message stays readable
    let (width, height) = terminal_size()?;
    let min_width = Layout::MIN_WIDTH + 2;
    let min_height = Layout::MIN_HEIGHT + 2;
    if width < min_width || height < min_height {
        return Err(TuiError::RenderError(format!(
            "Terminal size too small. Current: {}x{}, Minimum required: {}x{}. Please resize your terminal window.",
            width, height, min_width, min_height
        )));
    }

    let mut guard = TerminalGuard::new()?;
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let config = app.config.clone();
    let runtime = app.runtime();

    // Panic output would land on the alternate screen; log it instead
    let previous_hook = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        tracing::error!("UI panic: {}", info);
    }));

    let outcome = loop {
        let result = panic::catch_unwind(AssertUnwindSafe(|| run_app(&mut terminal, &mut app)));
        match result {
            Ok(result) => break result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                match show_error_screen(&mut terminal, &message) {
                    Ok(true) => {
                        tracing::info!("Reloading after UI error");
                        let rebuilt = Store::open(data_path)
                            .map_err(TuiError::from)
                            .and_then(|store| App::new(config.clone(), AppState::load(store), runtime.clone()));
                        match rebuilt {
                            Ok(fresh) => app = fresh,
                            Err(e) => break Err(e),
                        }
                        if let Err(e) = terminal.clear() {
                            break Err(e.into());
                        }
                    }
                    Ok(false) => break Ok(()),
                    Err(e) => break Err(e),
                }
            }
        }
    };

    panic::set_hook(previous_hook);
    guard.restore()?;
    outcome
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}

/// Returns true to reload, false to quit
fn show_error_screen(terminal: &mut Term, message: &str) -> Result<bool, TuiError> {
    loop {
        terminal.draw(|f| render_error_screen(f, f.area(), message))?;
        if let Event::Key(key_event) = event::read()? {
            if key_event.kind != KeyEventKind::Press {
                continue;
            }
            match key_event.code {
                KeyCode::Char('r') | KeyCode::Enter => return Ok(true),
                KeyCode::Char('q') | KeyCode::Esc => return Ok(false),
                _ => {}
            }
        }
    }
}

fn run_app(terminal: &mut Term, app: &mut App) -> Result<(), TuiError> {
    loop {
        app.check_status_message_timeout();
        app.poll_background();

        let size = terminal.size()?;
        let rect = Rect::new(0, 0, size.width, size.height);
        terminal.draw(|f| {
            let layout = Layout::calculate(rect, app.input.kind.is_some());
            crate::tui::render::render(f, app, &layout);
        })?;

        // Only process Press events to avoid duplicate processing on Windows
        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press && handle_key_event(app, key_event)? {
                    return Ok(());
                }
            }
        }
    }
}

/// Returns true when the user asked to quit
pub fn handle_key_event(app: &mut App, key_event: KeyEvent) -> Result<bool, TuiError> {
    if key_event.code == KeyCode::Char('c') && key_event.modifiers.contains(KeyModifiers::CONTROL) {
        return Ok(true);
    }
    if app.modals.confirm.is_some() {
        handle_confirm_modal(app, key_event);
        return Ok(false);
    }
    match app.ui.mode {
        Mode::View => return Ok(handle_view_mode(app, key_event)),
        Mode::Input => handle_input_mode(app, key_event),
        Mode::Settings => handle_settings_mode(app, key_event),
        Mode::Help => handle_help_mode(app, key_event),
    }
    Ok(false)
}

fn handle_confirm_modal(app: &mut App, key_event: KeyEvent) {
    match key_event.code {
        KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::Up | KeyCode::Down => {
            app.modals.selection = 1 - app.modals.selection.min(1);
        }
        KeyCode::Enter => {
            if app.modals.selection == 0 {
                app.confirm_pending();
            } else {
                app.cancel_confirm();
            }
        }
        KeyCode::Char('y') => app.confirm_pending(),
        KeyCode::Char('n') | KeyCode::Esc => app.cancel_confirm(),
        _ => {}
    }
}

fn handle_view_mode(app: &mut App, key_event: KeyEvent) -> bool {
    let keys = app.keys.clone();
    let tab = app.ui.current_tab;

    if keys.quit.matches(&key_event) {
        return true;
    } else if keys.help.matches(&key_event) {
        app.enter_help_mode();
    } else if keys.settings.matches(&key_event) {
        app.enter_settings_mode(false);
    } else if keys.new.matches(&key_event) {
        let kind = app.new_input_kind();
        app.enter_input_mode(kind);
    } else if keys.voice.matches(&key_event) {
        app.toggle_voice();
    } else if keys.edit.matches(&key_event) {
        app.edit_selected();
    } else if keys.delete.matches(&key_event) {
        app.request_delete_selected();
    } else if keys.toggle.matches(&key_event) && tab == Tab::Tasks {
        app.toggle_selected_task();
    } else if keys.clear_completed.matches(&key_event) && tab == Tab::Tasks {
        app.request_confirm(PendingConfirm::ClearCompleted);
    } else if keys.clear_today.matches(&key_event) && tab == Tab::Tasks {
        app.request_confirm(PendingConfirm::ClearToday);
    } else if keys.clear_notes.matches(&key_event) && tab == Tab::Notes {
        app.request_confirm(PendingConfirm::ClearNotes);
    } else if keys.tab_left.matches(&key_event) || keys.tab_right.matches(&key_event) {
        app.switch_tab(tab.toggled());
    } else if keys.tab_1.matches(&key_event) {
        app.switch_tab(Tab::Tasks);
    } else if keys.tab_2.matches(&key_event) {
        app.switch_tab(Tab::Notes);
    } else {
        match key_event.code {
            KeyCode::Up | KeyCode::Char('k') => app.move_selection_up(),
            KeyCode::Down | KeyCode::Char('j') => app.move_selection_down(),
            KeyCode::Tab | KeyCode::BackTab => app.switch_tab(tab.toggled()),
            KeyCode::Enter => app.edit_selected(),
            _ => {}
        }
    }
    false
}

fn handle_input_mode(app: &mut App, key_event: KeyEvent) {
    let keys = app.keys.clone();

    if app.speech.is_listening() {
        match key_event.code {
            KeyCode::Esc => app.speech.abort(),
            KeyCode::Enter => app.speech.stop(),
            _ if keys.voice.matches(&key_event) => app.speech.stop(),
            _ => {}
        }
        return;
    }

    if keys.voice.matches(&key_event) {
        app.toggle_voice();
        return;
    }
    if keys.save.matches(&key_event) {
        app.submit_input(false);
        return;
    }
    if keys.ai.matches(&key_event) {
        app.submit_input(true);
        return;
    }
    if keys.help.matches(&key_event) {
        app.enter_help_mode();
        return;
    }
    if keys.settings.matches(&key_event) {
        app.enter_settings_mode(false);
        return;
    }

    match key_event.code {
        KeyCode::Esc => app.exit_input_mode(),
        KeyCode::Enter if key_event.modifiers.intersects(KeyModifiers::ALT | KeyModifiers::SHIFT) => {
            app.input.editor.insert_newline();
        }
        KeyCode::Enter => app.submit_input(false),
        _ => edit_text(&mut app.input.editor, key_event, true),
    }
}

/// Cursor movement and typing shared by the input box and the settings form
fn edit_text(editor: &mut Editor, key_event: KeyEvent, multiline: bool) {
    match key_event.code {
        KeyCode::Backspace => editor.delete_char(),
        KeyCode::Left => editor.move_cursor_left(),
        KeyCode::Right => editor.move_cursor_right(),
        KeyCode::Up if multiline => editor.move_cursor_up(),
        KeyCode::Down if multiline => editor.move_cursor_down(),
        KeyCode::Home => editor.move_cursor_home(),
        KeyCode::End => editor.move_cursor_end(),
        KeyCode::Char(c) if !has_primary_modifier(key_event.modifiers) => editor.insert_char(c),
        _ => {}
    }
}

fn handle_settings_mode(app: &mut App, key_event: KeyEvent) {
    if app.keys.save.matches(&key_event) {
        app.save_settings_form();
        return;
    }
    if key_event.code == KeyCode::Char('v') && has_primary_modifier(key_event.modifiers) {
        app.settings_form.reveal_key = !app.settings_form.reveal_key;
        return;
    }

    match key_event.code {
        KeyCode::Esc => app.exit_settings_mode(),
        KeyCode::Enter => app.save_settings_form(),
        KeyCode::Tab | KeyCode::Down => app.settings_form.field = app.settings_form.field.next(),
        KeyCode::BackTab | KeyCode::Up => app.settings_form.field = app.settings_form.field.previous(),
        _ => edit_text(app.settings_form.current_editor(), key_event, false),
    }
}

fn handle_help_mode(app: &mut App, key_event: KeyEvent) {
    if key_event.code == KeyCode::Esc
        || app.keys.help.matches(&key_event)
        || app.keys.quit.matches(&key_event)
    {
        app.exit_help_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use crate::models::Settings;

    fn app() -> (App, tokio::runtime::Runtime) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let store = Store::in_memory().unwrap();
        store.save_settings(&Settings {
            api_key: String::new(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            model: "m".to_string(),
        }).unwrap();
        let app = App::new(Config::default(), AppState::load(store), runtime.handle().clone()).unwrap();
        (app, runtime)
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        handle_key_event(app, KeyEvent::new(code, KeyModifiers::NONE)).unwrap()
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn quit_key_in_view_mode() {
        let (mut app, _rt) = app();
        assert!(press(&mut app, KeyCode::Char('q')));
    }

    #[test]
    fn typing_q_in_input_does_not_quit() {
        let (mut app, _rt) = app();
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.ui.mode, Mode::Input);
        assert!(!press(&mut app, KeyCode::Char('q')));
        assert_eq!(app.input.editor.text(), "q");
    }

    #[test]
    fn note_typed_and_saved_then_cleared_with_confirmation() {
        let (mut app, _rt) = app();
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('n'));
        type_text(&mut app, "今天很好。散步");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state.notes().len(), 1);
        assert_eq!(app.state.notes()[0].title, "今天很好");

        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.modals.confirm, Some(PendingConfirm::ClearNotes));
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.state.notes().len(), 1);

        press(&mut app, KeyCode::Char('x'));
        press(&mut app, KeyCode::Enter);
        assert!(app.state.notes().is_empty());
    }

    #[test]
    fn settings_form_saves_key() {
        let (mut app, _rt) = app();
        handle_key_event(&mut app, KeyEvent::new(KeyCode::F(2), KeyModifiers::NONE)).unwrap();
        assert_eq!(app.ui.mode, Mode::Settings);
        // Replace whatever key is prefilled
        for _ in 0..app.settings_form.api_key.text().chars().count() {
            press(&mut app, KeyCode::Backspace);
        }
        type_text(&mut app, "sk-new");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.ui.mode, Mode::View);
        assert_eq!(app.state.settings().api_key, "sk-new");
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bad index"));
        assert_eq!(panic_message(payload.as_ref()), "bad index");
    }

    #[test]
    fn modified_enter_inserts_newline_instead_of_submitting() {
        let (mut app, _rt) = app();
        press(&mut app, KeyCode::Char('2'));
        press(&mut app, KeyCode::Char('n'));
        type_text(&mut app, "第一行");
        handle_key_event(&mut app, KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT)).unwrap();
        type_text(&mut app, "第二行");
        handle_key_event(&mut app, KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT)).unwrap();
        type_text(&mut app, "第三行");

        assert_eq!(app.ui.mode, Mode::Input);
        assert!(app.state.notes().is_empty());
        assert_eq!(app.input.editor.text(), "第一行\n第二行\n第三行");

        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state.notes().len(), 1);
        assert_eq!(app.state.notes()[0].raw, "第一行\n第二行\n第三行");
    }
}
