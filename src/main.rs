use color_eyre::Result;
use clap::Parser;
use std::path::PathBuf;
use sxj::{AppState, Config, Profile, Store, cli::{self, Cli, Commands}};

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();

    // Profile is chosen by the --dev flag only
    let profile = if cli.dev {
        Profile::Dev
    } else {
        Profile::Prod
    };

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from_path(&sxj::utils::expand_path(path), profile)?,
        None => Config::load_with_profile(profile)?,
    };

    sxj::logging::init(&config.get_log_path(), &config.log_level)?;
    tracing::info!(?profile, data_path = %config.data_path, "Starting sxj");

    let data_path: PathBuf = config.get_data_path();
    let store = Store::open(&data_path)?;
    let mut state = AppState::load(store);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => {
            let app = sxj::tui::App::new(config, state, runtime.handle().clone())?;
            sxj::tui::run_event_loop(app, &data_path)?;
        }
        Commands::AddTask { text } => cli::handle_add_task(text, &mut state, &runtime)?,
        Commands::AddNote { text, ai } => cli::handle_add_note(text, ai, &mut state, &runtime)?,
        Commands::Tasks { all } => cli::handle_list_tasks(all, &state)?,
        Commands::Notes => cli::handle_list_notes(&state)?,
        Commands::Done { id } => cli::handle_done(id, &mut state)?,
        Commands::DeleteTask { id, yes } => cli::handle_delete_task(id, yes, &mut state)?,
        Commands::DeleteNote { id, yes } => cli::handle_delete_note(id, yes, &mut state)?,
        Commands::ClearCompleted { yes } => cli::handle_clear_completed(yes, &mut state)?,
        Commands::ClearToday { yes } => cli::handle_clear_today(yes, &mut state)?,
        Commands::ClearNotes { yes } => cli::handle_clear_notes(yes, &mut state)?,
        Commands::Config { api_key, base_url, model } => {
            cli::handle_config(api_key, base_url, model, &mut state)?
        }
    }

    Ok(())
}
