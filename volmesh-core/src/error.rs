//! Error types for volmesh

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for volmesh operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Volume has no foreground voxels")]
    EmptyVolume,

    #[error("Failed to create pipe workspace at {path}: {source}")]
    PipeCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Simplifier executable not found or not executable: {program}")]
    SimplifierNotFound { program: String },

    #[error("Simplifier exited with code {exit_code}{}", writer_note(.writer_error))]
    Simplification {
        exit_code: i32,
        writer_error: Option<String>,
    },

    #[error("Simplifier did not finish within {seconds:.1}s")]
    SimplificationTimeout { seconds: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file error: {0}")]
    Config(#[from] toml::de::Error),
}

fn writer_note(writer_error: &Option<String>) -> String {
    match writer_error {
        Some(message) => format!(" (request writer also failed: {message})"),
        None => String::new(),
    }
}

/// Result type alias for volmesh operations
pub type Result<T> = std::result::Result<T, Error>;
