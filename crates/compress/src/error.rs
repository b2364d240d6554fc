//! Compression Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Callers match on [`ErrorKind`] to decide what to do;
//! the underlying `io::Error` (if any) is kept as a child frame.

use derive_more::{Display, Error};
use exn::ResultExt;
use std::io::{Error as IoError, ErrorKind as IoErrorKind, Result as IoResult};

/// A compression error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for compression operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Failed to initialize an encoder for the requested compression format.
    #[display("failed to initialize encoder")]
    Encoder,
    /// Data is corrupt or malformed. Don't retry with the same input.
    #[display("invalid or corrupted data")]
    InvalidData,
    /// The detected or requested format has no codec in the registry in use.
    /// Carries the format's extension (empty for uncompressed).
    #[display("unsupported compression format {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// A signature can't be registered without making detection ambiguous.
    #[display("ambiguous signature for {_0}")]
    AmbiguousSignature(#[error(not(source))] String),
    /// Reading from or writing to the underlying stream failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }

    /// Categorise an error coming out of a decoding reader. Codecs report
    /// malformed input as `InvalidData` or a premature `UnexpectedEof`;
    /// anything else came from the source stream.
    pub(crate) fn from_read(err: &IoError) -> Self {
        match err.kind() {
            IoErrorKind::InvalidData | IoErrorKind::InvalidInput | IoErrorKind::UnexpectedEof => {
                ErrorKind::InvalidData
            },
            _ => ErrorKind::Io,
        }
    }

    /// Raise a decoding reader's error under the kind [`from_read`](Self::from_read)
    /// picks for it.
    #[track_caller]
    pub(crate) fn raise_read<T>(result: IoResult<T>) -> Result<T> {
        result.or_else(|err| {
            let kind = Self::from_read(&err);
            Err(err).or_raise(|| kind)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::InvalidData.to_string(), "invalid or corrupted data");
        assert_eq!(
            ErrorKind::UnsupportedFormat("bz2".to_string()).to_string(),
            "unsupported compression format bz2"
        );
        assert_eq!(ErrorKind::Io.to_string(), "I/O error");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(!ErrorKind::InvalidData.is_retryable());
        assert!(!ErrorKind::UnsupportedFormat("zst".to_string()).is_retryable());
        assert!(!ErrorKind::AmbiguousSignature("gz".to_string()).is_retryable());
        assert!(ErrorKind::Io.is_retryable());
    }

    #[rstest]
    #[case(IoErrorKind::InvalidData, ErrorKind::InvalidData)]
    #[case(IoErrorKind::UnexpectedEof, ErrorKind::InvalidData)]
    #[case(IoErrorKind::BrokenPipe, ErrorKind::Io)]
    #[case(IoErrorKind::TimedOut, ErrorKind::Io)]
    fn error_kind_from_read(#[case] kind: IoErrorKind, #[case] expected: ErrorKind) {
        assert_eq!(ErrorKind::from_read(&IoError::from(kind)), expected);
    }

    #[rstest]
    #[case(IoErrorKind::InvalidInput, ErrorKind::InvalidData)]
    #[case(IoErrorKind::ConnectionReset, ErrorKind::Io)]
    fn error_raise_read(#[case] kind: IoErrorKind, #[case] expected: ErrorKind) {
        let err = ErrorKind::raise_read::<()>(Err(IoError::from(kind))).unwrap_err();
        assert_eq!(*err, expected);
        assert!(ErrorKind::raise_read(Ok(7)).is_ok());
    }

    #[test]
    fn error_from_result() {
        let result: std::result::Result<(), IoError> = Err(IoError::new(IoErrorKind::NotFound, "layer not found"));
        let err: Result<()> = result.or_raise(|| ErrorKind::Io);
        let exn = err.unwrap_err();
        assert_eq!(*exn, ErrorKind::Io);
    }
}
