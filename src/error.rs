//! Error types for a classification session.
//!
//! Storage and parse failures abort the current sample and the controller
//! re-prompts. Channel failures are fatal to the sample because the
//! accelerator's event stream cannot be resynchronized mid-sequence.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the file storage provider.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The named resource does not exist.
    #[error("resource not found: {}", path.display())]
    NotFound {
        /// Path that was checked
        path: PathBuf,
    },

    /// The resource exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The resource is larger than the configured read limit.
    #[error("{} is {size} bytes, limit is {limit}", path.display())]
    TooLarge {
        path: PathBuf,
        size: u64,
        limit: usize,
    },
}

/// Errors raised while turning delimited text into numeric records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A token is not a valid decimal integer.
    #[error("token {index} is not a valid integer: {token:?}")]
    InvalidToken { index: usize, token: String },

    /// Fewer tokens than the record layout requires.
    #[error("expected {expected} tokens, found {found}")]
    TooFewTokens { expected: usize, found: usize },

    /// More tokens than the record layout allows.
    #[error("expected {expected} tokens, found {found}")]
    TooManyTokens { expected: usize, found: usize },

    /// The token count is not a whole number of rows.
    #[error("{found} tokens do not form complete rows of {width}")]
    PartialRow { found: usize, width: usize },

    /// A field holds a value outside its legal range.
    #[error("row {row}: {field} = {value} is out of range")]
    FieldOutOfRange {
        row: usize,
        field: &'static str,
        value: u32,
    },

    /// More rows than the configured capacity.
    #[error("{rows} rows exceed capacity of {capacity}")]
    CapacityExceeded { rows: usize, capacity: usize },

    /// The buffer held no records at all.
    #[error("no records found")]
    Empty,
}

/// Errors raised by the hardware event and result channels.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The other end of the channel has gone away.
    #[error("channel disconnected")]
    Disconnected,

    /// A word could not be written.
    #[error("write failed: {reason}")]
    Write { reason: String },

    /// A word could not be read.
    #[error("read failed at offset {offset}: {reason}")]
    Read { offset: usize, reason: String },

    /// A completion notification arrived while the chunk queue was full.
    #[error("completion queue full, chunk dropped")]
    Overrun,
}

/// Errors that end one sample's classification cycle.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Completion notifications stopped before the feature vector was complete.
    #[error("accelerator stalled: {chunks_received} of 4 chunks after {}ms", deadline.as_millis())]
    ProtocolStall {
        chunks_received: usize,
        deadline: Duration,
    },

    /// Every event was past the time budget, so the accelerator got nothing.
    #[error("no events within the time budget of {budget}")]
    NothingTransmitted { budget: u32 },

    /// The accumulator worker is not running.
    #[error("accumulator is not running")]
    AccumulatorDown,
}

impl SessionError {
    /// Whether the error came from the hardware channel itself.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Channel(_) | SessionError::AccumulatorDown)
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_errors_are_fatal() {
        let err = SessionError::from(ChannelError::Disconnected);
        assert!(err.is_fatal());

        let err = SessionError::from(ParseError::Empty);
        assert!(!err.is_fatal());

        let err = SessionError::NothingTransmitted { budget: 200_000 };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "no events within the time budget of 200000");
    }

    #[test]
    fn test_stall_message() {
        let err = SessionError::ProtocolStall {
            chunks_received: 3,
            deadline: Duration::from_millis(500),
        };
        assert_eq!(err.to_string(), "accelerator stalled: 3 of 4 chunks after 500ms");
    }
}
