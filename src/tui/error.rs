use thiserror::Error;
use crate::config::ConfigError;
use crate::state::StateError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("IO/Terminal error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    StoreError(#[from] StoreError),

    #[error(transparent)]
    StateError(#[from] StateError),

    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Render error: {0}")]
    RenderError(String),
}
