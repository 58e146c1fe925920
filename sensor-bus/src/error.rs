use std::path::PathBuf;

/// A line that could not be turned into a sample. The line is dropped.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("expected {expected} fields, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("field {index} has no ':' separator: {segment:?}")]
    MissingSeparator { index: usize, segment: String },

    #[error("field {index} is not a number: {value:?}")]
    NotANumber { index: usize, value: String },
}

/// Serial device open/read failure. Leaves the live path inert.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("no device attached at {0}")]
    NoDevice(String),

    #[error("open {path} failed: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Demo recording could not be loaded. Playback retries later.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("read recording {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse recording: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("recording has no entries")]
    Empty,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HubError {
    #[error("another producer already publishes into this hub")]
    ProducerBusy,
}

/// Store write/read failure, wrapped so callers can tell it apart from other glue errors.
#[derive(Debug, thiserror::Error)]
#[error("persistence: {0:#}")]
pub struct PersistenceError(#[from] pub anyhow::Error);
