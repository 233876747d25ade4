pub mod ai;
pub mod cli;
pub mod config;
pub mod logging;
pub mod models;
pub mod speech;
pub mod state;
pub mod store;
pub mod tui;
pub mod utils;

pub use config::Config;
pub use models::{Note, Settings, Task};
pub use state::AppState;
pub use store::Store;
pub use utils::Profile;
