use thiserror::Error;

use crate::adapter::AdapterError;

#[derive(Debug, Error)]
pub enum NowPlayingError {
    #[error("config error: {0}")]
    Config(String),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
