//! # error
//!
//! why: give callers stable values to branch on when the log refuses an operation
//! relations: returned by store.rs and codec.rs, re-exported from lib.rs
//! what: LogError, CodecError, CallbackError, Result alias

use thiserror::Error;

/// Result type alias for log operations
pub type Result<T> = std::result::Result<T, LogError>;

/// Error type returned by external callbacks (configuration changes, peers)
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the log store
#[derive(Error, Debug)]
pub enum LogError {
    #[error("term too small")]
    TermTooSmall,

    #[error("index too small")]
    IndexTooSmall,

    #[error("index too big")]
    IndexTooBig,

    #[error("bad term")]
    BadTerm,

    #[error("sink write failed: {0}")]
    Sink(#[from] std::io::Error),

    /// A failed write could not be cut back out of the sink
    #[error("sink holds a torn record that could not be removed; commits are refused")]
    SinkUnavailable,

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("configuration entry {index} has an undecodable peer set: {source}")]
    BadConfiguration {
        index: u64,
        #[source]
        source: serde_json::Error,
    },
}

impl PartialEq for LogError {
    /// Sentinels compare by variant; wrapped errors never compare equal.
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (LogError::TermTooSmall, LogError::TermTooSmall)
                | (LogError::IndexTooSmall, LogError::IndexTooSmall)
                | (LogError::IndexTooBig, LogError::IndexTooBig)
                | (LogError::BadTerm, LogError::BadTerm)
                | (LogError::SinkUnavailable, LogError::SinkUnavailable)
        )
    }
}

/// Errors raised while framing or parsing a single log record
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended on a record boundary; not corruption.
    #[error("end of stream")]
    EndOfStream,

    #[error("record truncated")]
    Truncated,

    #[error("record length {len} exceeds limit {max}")]
    RecordTooLarge { len: u32, max: u32 },

    #[error("checksum mismatch: stored {expected:08x}, computed {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A well-formed record whose (index, term) does not follow its predecessor
    #[error("record {next:?} out of sequence after {prev:?}")]
    OutOfSequence { prev: (u64, u64), next: (u64, u64) },
}

impl CodecError {
    /// Check if the stream simply ended between records
    pub fn is_clean_eof(&self) -> bool {
        matches!(self, CodecError::EndOfStream)
    }

    /// Check if this error marks a damaged or partially written record
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            CodecError::Truncated
                | CodecError::RecordTooLarge { .. }
                | CodecError::ChecksumMismatch { .. }
                | CodecError::Malformed(_)
                | CodecError::OutOfSequence { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_compare_by_variant() {
        assert_eq!(LogError::TermTooSmall, LogError::TermTooSmall);
        assert_ne!(LogError::IndexTooSmall, LogError::IndexTooBig);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_ne!(LogError::Sink(io), LogError::BadTerm);
    }

    #[test]
    fn codec_error_classification() {
        assert!(CodecError::EndOfStream.is_clean_eof());
        assert!(!CodecError::EndOfStream.is_corruption());
        assert!(CodecError::Truncated.is_corruption());
        assert!(CodecError::ChecksumMismatch { expected: 1, actual: 2 }.is_corruption());
    }
}
