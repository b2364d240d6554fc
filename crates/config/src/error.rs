//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;
use strata_compress::error::{Error as CompressionError, ErrorKind as CompressionErrorKind};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// An explicitly requested configuration file does not exist
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The file extension doesn't name a supported configuration format
    #[display("unsupported configuration format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// A source couldn't be parsed or didn't fit the configuration shape
    #[display("failed to load configuration")]
    Load,
    /// The configuration loaded, but its values contradict each other
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// Building the compression registry failed
    #[display("compression error: {_0}")]
    Compression(CompressionErrorKind),
}

impl ErrorKind {
    /// Convert a compression error into a configuration error, keeping the
    /// compress crate's frame as a child in the error tree.
    #[track_caller]
    pub fn compression(err: CompressionError) -> Error {
        let inner = (*err).clone();
        err.raise(ErrorKind::Compression(inner))
    }
}
