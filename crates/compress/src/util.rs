use crate::Compression;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::RangeInclusive;

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Compression {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl Compression {
    /// Returns the canonical file extension (without the leading dot) for
    /// this compression format. Uncompressed has no extension.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => "gz",
            Compression::Bzip2 => "bz2",
            Compression::Xz => "xz",
            Compression::Zstd => "zst",
        }
    }

    /// Returns the short name for configuration (for displaying to user)
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
            Compression::Xz => "xz",
            Compression::Zstd => "zstd",
        }
    }

    /// Encoder levels the codec for this format accepts, or `None` when the
    /// format has no notion of a level.
    #[must_use]
    pub fn levels(&self) -> Option<RangeInclusive<u32>> {
        match self {
            Compression::None => None,
            Compression::Gzip | Compression::Xz => Some(0..=9),
            Compression::Bzip2 => Some(1..=9),
            Compression::Zstd => Some(1..=22),
        }
    }
}
