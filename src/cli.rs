use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use thiserror::Error;

use crate::models::{Note, Task, clock};
use crate::state::{Added, AppState, StateError};
use crate::utils::{mask_api_key, relative_date_label};

#[derive(Parser)]
#[command(name = "sxj")]
#[command(about = "随心记 - voice and AI assisted tasks and notes for the terminal")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Use development mode (uses separate dev config/store)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Launch interactive TUI (default if no subcommand)
    Tui,
    /// Add a task; date, time and location are extracted by the AI
    AddTask {
        /// What to do, in free text
        text: String,
    },
    /// Add a note
    AddNote {
        /// Note text
        text: String,
        /// Let the AI title and polish the note
        #[arg(long)]
        ai: bool,
    },
    /// List tasks (open ones only unless --all)
    Tasks {
        #[arg(long)]
        all: bool,
    },
    /// List notes, newest first
    Notes,
    /// Toggle a task between open and done
    Done {
        id: String,
    },
    /// Delete a task
    DeleteTask {
        id: String,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Delete a note
    DeleteNote {
        id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Remove every completed task
    ClearCompleted {
        #[arg(long)]
        yes: bool,
    },
    /// Remove every task dated today
    ClearToday {
        #[arg(long)]
        yes: bool,
    },
    /// Remove all notes
    ClearNotes {
        #[arg(long)]
        yes: bool,
    },
    /// Show or change the AI settings
    Config {
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    StateError(#[from] StateError),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Ask a yes/no question; anything other than y/yes counts as no
pub fn confirm(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
    write!(output, "{} [y/N] ", prompt)?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn confirmed(prompt: &str, yes: bool) -> Result<bool, CliError> {
    if yes {
        return Ok(true);
    }
    let stdin = io::stdin();
    let ok = confirm(prompt, &mut stdin.lock(), &mut io::stdout())?;
    if !ok {
        println!("Cancelled");
    }
    Ok(ok)
}

/// One line per task: status, id, when, what and where
pub fn format_task_line(task: &Task, state: &AppState) -> String {
    let status = if task.completed {
        "[x]"
    } else if state.is_overdue(task) {
        "[!]"
    } else {
        "[ ]"
    };
    let mut line = format!("{} {}  {}", status, task.id, relative_date_label(task.date, state.today()));
    if let Some(time) = task.time {
        line.push(' ');
        line.push_str(&clock::format(time));
    }
    line.push_str("  ");
    line.push_str(&task.content);
    if let Some(location) = &task.location {
        line.push_str(" @ ");
        line.push_str(location);
    }
    line
}

pub fn format_note_line(note: &Note) -> String {
    let created = chrono::DateTime::from_timestamp_millis(note.created_at)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    format!("{}  {}  {}", note.id, created, note.title)
}

/// Handle the add-task command
pub fn handle_add_task(
    text: String,
    state: &mut AppState,
    runtime: &tokio::runtime::Runtime,
) -> Result<(), CliError> {
    let job = state.begin_add_task(&text)?;
    println!("AI 正在思考...");
    let outcome = runtime.block_on(job.run());
    if let Added::Task(id) = state.finish_ai(outcome)? {
        if let Some(task) = state.tasks().iter().find(|t| t.id == id) {
            println!("Task created: {}", format_task_line(task, state));
        }
    }
    Ok(())
}

/// Handle the add-note command
pub fn handle_add_note(
    text: String,
    ai: bool,
    state: &mut AppState,
    runtime: &tokio::runtime::Runtime,
) -> Result<(), CliError> {
    if !ai {
        let note = state.add_note_direct(&text)?;
        println!("Note created: {}", format_note_line(note));
        return Ok(());
    }

    let job = state.begin_add_note_ai(&text)?;
    println!("AI 正在思考...");
    let outcome = runtime.block_on(job.run());
    if let Added::Note(id) = state.finish_ai(outcome)? {
        if let Some(note) = state.notes().iter().find(|n| n.id == id) {
            println!("Note created: {}", format_note_line(note));
            println!();
            println!("{}", note.content);
        }
    }
    Ok(())
}

pub fn handle_list_tasks(all: bool, state: &AppState) -> Result<(), CliError> {
    let tasks: Vec<&Task> = state
        .visible_tasks()
        .into_iter()
        .filter(|t| all || !t.completed)
        .collect();
    if tasks.is_empty() {
        println!("No tasks");
    }
    for task in tasks {
        println!("{}", format_task_line(task, state));
    }
    Ok(())
}

pub fn handle_list_notes(state: &AppState) -> Result<(), CliError> {
    let (count, chars) = state.note_stats();
    println!("{} notes, {} characters", count, chars);
    for note in state.visible_notes() {
        println!("{}", format_note_line(note));
    }
    Ok(())
}

pub fn handle_done(id: String, state: &mut AppState) -> Result<(), CliError> {
    let completed = state.toggle_task(&id)?;
    println!("Task {} marked {}", id, if completed { "done" } else { "open" });
    Ok(())
}

pub fn handle_delete_task(id: String, yes: bool, state: &mut AppState) -> Result<(), CliError> {
    // Resolve first so a bad id fails before prompting
    let content = state
        .tasks()
        .iter()
        .find(|t| t.id == id)
        .map(|t| t.content.clone())
        .ok_or_else(|| StateError::NotFound { kind: "task", id: id.clone() })?;
    if confirmed(&format!("Delete task \"{}\"?", content), yes)? {
        state.delete_task(&id)?;
        println!("Task deleted");
    }
    Ok(())
}

pub fn handle_delete_note(id: String, yes: bool, state: &mut AppState) -> Result<(), CliError> {
    let title = state
        .notes()
        .iter()
        .find(|n| n.id == id)
        .map(|n| n.title.clone())
        .ok_or_else(|| StateError::NotFound { kind: "note", id: id.clone() })?;
    if confirmed(&format!("Delete note \"{}\"?", title), yes)? {
        state.delete_note(&id)?;
        println!("Note deleted");
    }
    Ok(())
}

pub fn handle_clear_completed(yes: bool, state: &mut AppState) -> Result<(), CliError> {
    if confirmed("Remove all completed tasks?", yes)? {
        let removed = state.clear_completed()?;
        println!("Removed {} completed tasks", removed);
    }
    Ok(())
}

pub fn handle_clear_today(yes: bool, state: &mut AppState) -> Result<(), CliError> {
    if confirmed("Remove all tasks dated today?", yes)? {
        let removed = state.clear_today()?;
        println!("Removed {} tasks", removed);
    }
    Ok(())
}

pub fn handle_clear_notes(yes: bool, state: &mut AppState) -> Result<(), CliError> {
    if confirmed("Remove ALL notes?", yes)? {
        let removed = state.clear_notes()?;
        println!("Removed {} notes", removed);
    }
    Ok(())
}

/// Handle the config command; with no flags the current settings are printed
pub fn handle_config(
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    state: &mut AppState,
) -> Result<(), CliError> {
    let changed = api_key.is_some() || base_url.is_some() || model.is_some();
    if changed {
        let mut settings = state.settings().clone();
        if let Some(key) = api_key {
            settings.api_key = key.trim().to_string();
        }
        if let Some(url) = base_url {
            settings.base_url = url.trim().to_string();
        }
        if let Some(model) = model {
            settings.model = model.trim().to_string();
        }
        state.update_settings(settings)?;
        println!("Settings saved");
    }

    let settings = state.settings();
    println!("api_key  = {}", mask_api_key(&settings.api_key));
    println!("base_url = {}", settings.base_url);
    println!("model    = {}", settings.model);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn confirm_accepts_only_yes() {
        let mut out = Vec::new();
        assert!(confirm("Delete?", &mut Cursor::new("y\n"), &mut out).unwrap());
        assert!(confirm("Delete?", &mut Cursor::new("YES\n"), &mut out).unwrap());
        assert!(!confirm("Delete?", &mut Cursor::new("\n"), &mut out).unwrap());
        assert!(!confirm("Delete?", &mut Cursor::new("nope\n"), &mut out).unwrap());
        assert!(!confirm("Delete?", &mut Cursor::new(""), &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().starts_with("Delete? [y/N] "));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["sxj", "--dev", "add-note", "买牛奶", "--ai"]).unwrap();
        assert!(cli.dev);
        assert!(matches!(cli.command, Some(Commands::AddNote { ai: true, .. })));

        let cli = Cli::try_parse_from(["sxj", "delete-task", "42", "--yes"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::DeleteTask { ref id, yes: true }) if id == "42"));

        let cli = Cli::try_parse_from(["sxj"]).unwrap();
        assert!(cli.command.is_none());
    }
}
