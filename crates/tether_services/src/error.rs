//! Service error types

use tether_script::BridgeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("event loop I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The fetch transport could not complete a request.
    #[error("fetch failed: {0}")]
    Transport(String),

    #[error("invalid settings: {0}")]
    Settings(String),
}
