use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::utils::{self, ParsedKeyBinding};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_path")]
    pub data_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Speech recogniser argv; its stdout is taken as the transcript. Empty disables voice input.
    #[serde(default)]
    pub speech_command: Vec<String>,
    #[serde(default)]
    pub key_bindings: KeyBindings,
    #[serde(default)]
    pub theme: Theme,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBindings {
    #[serde(default = "default_quit")]
    pub quit: String,
    #[serde(default = "default_new")]
    pub new: String,
    #[serde(default = "default_edit")]
    pub edit: String,
    #[serde(default = "default_delete")]
    pub delete: String,
    #[serde(default = "default_toggle")]
    pub toggle: String,
    #[serde(default = "default_tab_left")]
    pub tab_left: String,
    #[serde(default = "default_tab_right")]
    pub tab_right: String,
    #[serde(default = "default_tab_1")]
    pub tab_1: String,
    #[serde(default = "default_tab_2")]
    pub tab_2: String,
    #[serde(default = "default_settings")]
    pub settings: String,
    #[serde(default = "default_help")]
    pub help: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_save")]
    pub save: String,
    #[serde(default = "default_ai")]
    pub ai: String,
    #[serde(default = "default_clear_completed")]
    pub clear_completed: String,
    #[serde(default = "default_clear_today")]
    pub clear_today: String,
    #[serde(default = "default_clear_notes")]
    pub clear_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    #[serde(default = "default_fg")]
    pub fg: String,
    #[serde(default = "default_bg")]
    pub bg: String,
    #[serde(default = "default_highlight")]
    pub highlight: String,
    #[serde(default = "default_accent")]
    pub accent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            log_level: default_log_level(),
            speech_command: Vec::new(),
            key_bindings: KeyBindings::default(),
            theme: Theme::default(),
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            quit: default_quit(),
            new: default_new(),
            edit: default_edit(),
            delete: default_delete(),
            toggle: default_toggle(),
            tab_left: default_tab_left(),
            tab_right: default_tab_right(),
            tab_1: default_tab_1(),
            tab_2: default_tab_2(),
            settings: default_settings(),
            help: default_help(),
            voice: default_voice(),
            save: default_save(),
            ai: default_ai(),
            clear_completed: default_clear_completed(),
            clear_today: default_clear_today(),
            clear_notes: default_clear_notes(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: default_fg(),
            bg: default_bg(),
            highlight: default_highlight(),
            accent: default_accent(),
        }
    }
}

// Default value functions
fn default_data_path() -> String {
    // Fallback only; load_* rewrites it for the active profile
    Config::default_data_path_for_profile(utils::Profile::Prod)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_quit() -> String {
    "q".to_string()
}

fn default_new() -> String {
    "n".to_string()
}

fn default_edit() -> String {
    "e".to_string()
}

fn default_delete() -> String {
    "d".to_string()
}

fn default_toggle() -> String {
    "Space".to_string()
}

fn default_tab_left() -> String {
    "Left".to_string()
}

fn default_tab_right() -> String {
    "Right".to_string()
}

fn default_tab_1() -> String {
    "1".to_string()
}

fn default_tab_2() -> String {
    "2".to_string()
}

fn default_settings() -> String {
    "F2".to_string()
}

fn default_help() -> String {
    "F1".to_string()
}

fn default_voice() -> String {
    "F3".to_string()
}

fn default_save() -> String {
    "Ctrl+s".to_string()
}

fn default_ai() -> String {
    "Ctrl+r".to_string()
}

fn default_clear_completed() -> String {
    "c".to_string()
}

fn default_clear_today() -> String {
    "t".to_string()
}

fn default_clear_notes() -> String {
    "x".to_string()
}

fn default_fg() -> String {
    "white".to_string()
}

fn default_bg() -> String {
    "reset".to_string()
}

fn default_highlight() -> String {
    "blue".to_string()
}

fn default_accent() -> String {
    "cyan".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Invalid key binding for {name}: {reason}")]
    KeyBindingError { name: &'static str, reason: String },
}

impl Config {
    /// Load configuration from the profile's config dir, creating a default file if missing
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        let mut config = Self::load_from_path(&config_path, profile)?;
        config.ensure_profile_data_path(profile);
        Ok(config)
    }

    /// Load configuration from an explicit file, creating it with defaults if missing.
    /// A `data_path` set in the file is honoured.
    pub fn load_from_path(path: &Path, profile: utils::Profile) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let mut config = Config::default();
            config.data_path = Self::default_data_path_for_profile(profile);
            config.save_to_path(path)?;
            Ok(config)
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile)
            .ok_or_else(|| ConfigError::ConfigDirError("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("config.toml"))
    }

    /// Keep dev and prod data apart when the file still points at the prod default
    fn ensure_profile_data_path(&mut self, profile: utils::Profile) {
        if profile == utils::Profile::Dev
            && self.data_path == Self::default_data_path_for_profile(utils::Profile::Prod)
        {
            self.data_path = Self::default_data_path_for_profile(profile);
        }
    }

    /// Get default store path for a specific profile
    fn default_data_path_for_profile(profile: utils::Profile) -> String {
        if let Some(data_dir) = utils::get_data_dir(profile) {
            data_dir.join("sxj.db").to_string_lossy().to_string()
        } else {
            match profile {
                utils::Profile::Dev => "~/.local/share/sxj-dev/sxj.db".to_string(),
                utils::Profile::Prod => "~/.local/share/sxj/sxj.db".to_string(),
            }
        }
    }

    /// Get the expanded store path (with ~ expansion)
    pub fn get_data_path(&self) -> PathBuf {
        utils::expand_path(&self.data_path)
    }

    /// Log file next to the store
    pub fn get_log_path(&self) -> PathBuf {
        let data_path = self.get_data_path();
        match data_path.parent() {
            Some(dir) => dir.join("sxj.log"),
            None => PathBuf::from("sxj.log"),
        }
    }

    /// Parse every key binding, failing on the first invalid one
    pub fn parsed_key_bindings(&self) -> Result<ParsedKeyBindings, ConfigError> {
        let kb = &self.key_bindings;
        let parse = |name: &'static str, value: &str| {
            utils::parse_key_binding(value)
                .map_err(|reason| ConfigError::KeyBindingError { name, reason })
        };
        Ok(ParsedKeyBindings {
            quit: parse("quit", &kb.quit)?,
            new: parse("new", &kb.new)?,
            edit: parse("edit", &kb.edit)?,
            delete: parse("delete", &kb.delete)?,
            toggle: parse("toggle", &kb.toggle)?,
            tab_left: parse("tab_left", &kb.tab_left)?,
            tab_right: parse("tab_right", &kb.tab_right)?,
            tab_1: parse("tab_1", &kb.tab_1)?,
            tab_2: parse("tab_2", &kb.tab_2)?,
            settings: parse("settings", &kb.settings)?,
            help: parse("help", &kb.help)?,
            voice: parse("voice", &kb.voice)?,
            save: parse("save", &kb.save)?,
            ai: parse("ai", &kb.ai)?,
            clear_completed: parse("clear_completed", &kb.clear_completed)?,
            clear_today: parse("clear_today", &kb.clear_today)?,
            clear_notes: parse("clear_notes", &kb.clear_notes)?,
        })
    }
}

/// Key bindings resolved to key codes once at startup
#[derive(Debug, Clone)]
pub struct ParsedKeyBindings {
    pub quit: ParsedKeyBinding,
    pub new: ParsedKeyBinding,
    pub edit: ParsedKeyBinding,
    pub delete: ParsedKeyBinding,
    pub toggle: ParsedKeyBinding,
    pub tab_left: ParsedKeyBinding,
    pub tab_right: ParsedKeyBinding,
    pub tab_1: ParsedKeyBinding,
    pub tab_2: ParsedKeyBinding,
    pub settings: ParsedKeyBinding,
    pub help: ParsedKeyBinding,
    pub voice: ParsedKeyBinding,
    pub save: ParsedKeyBinding,
    pub ai: ParsedKeyBinding,
    pub clear_completed: ParsedKeyBinding,
    pub clear_today: ParsedKeyBinding,
    pub clear_notes: ParsedKeyBinding,
}
