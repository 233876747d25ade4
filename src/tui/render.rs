use ratatui::Frame;
use ratatui::widgets::{Block, Borders};
use ratatui::style::Style;
use crate::tui::{App, Layout};
use crate::tui::app::{Mode, Tab, THINKING_MESSAGE};
use crate::tui::widgets::{
    color::Palette,
    confirm::render_confirm,
    header::render_header,
    help::render_help,
    input_box::render_input_box,
    note_list::render_note_list,
    settings_view::render_settings_view_modal,
    status_bar::render_status_bar,
    tabs::render_tabs,
    task_list::render_task_list,
};
use crate::utils::{format_key_binding_for_display as key, header_title};

pub fn render(f: &mut Frame, app: &mut App, layout: &Layout) {
    let palette = Palette::from_theme(&app.config.theme);

    let outer_block = Block::default()
        .borders(Borders::ALL)
        .title(" 随心记 ")
        .title_alignment(ratatui::layout::Alignment::Center)
        .style(Style::default().fg(palette.fg).bg(palette.bg));
    f.render_widget(outer_block, f.area());

    let now = app.state.now();
    let today = now.date();

    let open_tasks = app.state.tasks().iter().filter(|t| !t.completed).count();
    let (note_count, note_chars) = app.state.note_stats();
    let stats = match app.ui.current_tab {
        Tab::Tasks => format!("{} 项待办", open_tasks),
        Tab::Notes => format!("{} 篇 · {} 字", note_count, note_chars),
    };
    render_header(f, layout.header_area, &header_title(today), &stats, &palette);
    render_tabs(f, layout.tabs_area, app.ui.current_tab, open_tasks, note_count, &palette);

    match app.ui.current_tab {
        Tab::Tasks => {
            let tasks = app.state.visible_tasks();
            render_task_list(f, layout.main_area, &tasks, today, now.time(), &mut app.ui.list_state, &palette);
        }
        Tab::Notes => {
            let notes = app.state.visible_notes();
            render_note_list(f, layout.main_area, &notes, &mut app.ui.list_state, &palette);
        }
    }

    if let Some(kind) = app.input.kind.clone() {
        let focused = app.ui.mode == Mode::Input && app.modals.confirm.is_none();
        render_input_box(
            f,
            layout.input_area,
            kind.title(),
            &mut app.input.editor,
            focused,
            app.speech.is_listening(),
            &palette,
        );
    }

    match app.ui.mode {
        Mode::Help => render_help(f, f.area(), &app.config.key_bindings, &palette),
        Mode::Settings => render_settings_view_modal(f, f.area(), &mut app.settings_form, &palette),
        Mode::View | Mode::Input => {}
    }

    if let Some(ref pending) = app.modals.confirm {
        render_confirm(f, f.area(), pending, app.modals.selection, &palette);
    }

    let busy = app.state.is_loading().then_some(THINKING_MESSAGE);
    let key_hints = get_key_hints(app);
    render_status_bar(f, layout.status_area, busy, app.status.message.as_deref(), &key_hints, &palette);
}

fn get_key_hints(app: &App) -> Vec<String> {
    let kb = &app.config.key_bindings;
    match app.ui.mode {
        Mode::Help => vec![format!("Esc or {}: Exit help", key(&kb.help))],
        Mode::Settings => vec!["Enter: Save".to_string(), "Esc: Cancel".to_string()],
        Mode::Input if app.speech.is_listening() => {
            vec!["Enter: Stop listening".to_string(), "Esc: Discard".to_string()]
        }
        Mode::Input => {
            let mut hints = vec!["Enter: Submit".to_string()];
            if app.input.kind == Some(crate::tui::app::InputKind::NewNote) {
                hints.push(format!("{}: Save as typed", key(&kb.save)));
                hints.push(format!("{}: AI polish", key(&kb.ai)));
            }
            hints.push(format!("{}: Speak", key(&kb.voice)));
            hints.push("Alt+Enter: New line".to_string());
            hints.push("Esc: Cancel".to_string());
            hints
        }
        Mode::View => {
            let mut hints = vec![
                format!("{}: Quit", key(&kb.quit)),
                format!("{}: New", key(&kb.new)),
                format!("{}: Speak", key(&kb.voice)),
                format!("{}: Edit", key(&kb.edit)),
                format!("{}: Delete", key(&kb.delete)),
            ];
            match app.ui.current_tab {
                Tab::Tasks => {
                    hints.push(format!("{}: Done", key(&kb.toggle)));
                    hints.push(format!("{}: Clear done", key(&kb.clear_completed)));
                    hints.push(format!("{}: Clear today", key(&kb.clear_today)));
                }
                Tab::Notes => hints.push(format!("{}: Clear notes", key(&kb.clear_notes))),
            }
            hints.push(format!("{}: Settings", key(&kb.settings)));
            hints.push(format!("{}: Help", key(&kb.help)));
            hints
        }
    }
}
