//! Error types for probing and conversion

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

/// Errors that can occur while talking to the encoder
#[derive(Debug, Error)]
pub enum MediaError {
    /// IO error while reading encoder output or waiting for it
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The input file does not exist or is not a regular file
    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The encoder binary could not be started
    #[error("Failed to launch {}: {source}", .program.display())]
    Spawn {
        /// Program that failed to start
        program: PathBuf,
        /// Underlying launch error
        #[source]
        source: io::Error,
    },

    /// Probe output did not describe a video
    #[error("Could not read media info: {0}")]
    Probe(String),

    /// A conversion parameter is out of range
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The selected time range exceeds the allowed span
    #[error("Selected range is too long: {span:.1}s (max {max:.1}s)")]
    SpanTooLong {
        /// Requested span in seconds
        span: f64,
        /// Allowed span in seconds
        max: f64,
    },

    /// The selected time range is below one second
    #[error("Selected range is too short: {span:.1}s")]
    SpanTooShort {
        /// Requested span in seconds
        span: f64,
    },

    /// The encoder exited unsuccessfully
    #[error("Encoder exited with {status}: {tail}")]
    EncoderFailed {
        /// Exit status of the encoder
        status: ExitStatus,
        /// Last lines the encoder printed
        tail: String,
    },

    /// The operation was cancelled before it produced a result
    #[error("Operation cancelled")]
    Cancelled,
}
