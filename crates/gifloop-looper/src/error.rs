//! Error types for the looper and the front loop

use thiserror::Error;

/// Result type for looper operations
pub type LooperResult<T> = Result<T, LooperError>;

/// Errors returned by [`crate::Looper`] operations
#[derive(Debug, Error)]
pub enum LooperError {
    /// The looper was asked to quit; it accepts no further work
    #[error("Looper has quit; operation rejected")]
    Stopped,

    /// The worker thread could not be started
    #[error("Failed to spawn looper worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors returned while pumping a [`crate::FrontLoop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrontError {
    /// No callback arrived before the deadline
    #[error("Timed out waiting for front callbacks")]
    Timeout,

    /// Every handle to the loop was dropped
    #[error("All front handles were dropped")]
    Disconnected,

    /// A handle asked the loop to exit
    #[error("Front loop was asked to exit")]
    Exited,
}
