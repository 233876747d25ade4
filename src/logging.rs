use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Send `tracing` output to `log_path` (appending, no ANSI colours).
/// `RUST_LOG` wins over `level` when set.
pub fn init(log_path: &Path, level: &str) -> std::io::Result<()> {
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sxj={level},warn")));

    // A second init (tests, reload) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init();

    Ok(())
}
