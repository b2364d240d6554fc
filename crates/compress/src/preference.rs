//! Choosing the output compression when re-packing a layer.

use crate::error::{Error, ErrorKind, Result};
use crate::{Compression, Registry};
use std::str::FromStr;

/// A command-line `--compress[=FORMAT]` flag: absent, present without a
/// value, or present with one.
pub type Flag = Option<Option<String>>;

/// What the caller asked for when re-packing a layer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Preference {
    /// A specific format, `none` included.
    Explicit(Compression),
    /// Compress, with whatever the configuration says.
    Implicit,
    /// Leave the layer as it was stored.
    NotSpecified,
}

impl TryFrom<Flag> for Preference {
    type Error = Error;
    /// Flag values are format names or extensions; a leading dot is allowed
    /// so `--compress=.zst` reads the same as `--compress=zst`.
    fn try_from(value: Flag) -> Result<Self> {
        let Some(value) = value else {
            return Ok(Self::NotSpecified);
        };
        match value.as_deref().map(|s| s.trim_start_matches('.')) {
            None | Some("") => Ok(Self::Implicit),
            Some(s) => Ok(Self::Explicit(Compression::from_str(s)?)),
        }
    }
}

impl Preference {
    /// Pick the output compression.
    ///
    /// An explicit format always wins; an implicit request uses the
    /// configured format; otherwise the layer keeps the compression it was
    /// detected with (uncompressed if nothing was detected).
    pub fn resolve(&self, configured: Compression, detected: Option<Compression>) -> Compression {
        match self {
            Self::Explicit(c) => *c,
            Self::Implicit => configured,
            Self::NotSpecified => detected.unwrap_or(Compression::None),
        }
    }
}

impl Registry {
    /// Resolve `preference` and check this registry can write the result,
    /// so a re-pack fails before any layer data is read.
    ///
    /// ```
    /// use strata_compress::{Compression, Preference, Registry};
    ///
    /// let registry = Registry::builtin();
    /// let keep = registry.resolve(Preference::NotSpecified, Compression::Gzip, Some(Compression::Gzip));
    /// assert_eq!(keep.unwrap(), Compression::Gzip);
    /// assert!(registry.resolve(Preference::Explicit(Compression::Zstd), Compression::Gzip, None).is_err());
    /// ```
    pub fn resolve(
        &self,
        preference: Preference,
        configured: Compression,
        detected: Option<Compression>,
    ) -> Result<Compression> {
        let target = preference.resolve(configured, detected);
        let writable = target == Compression::None || self.get(target).is_some_and(|format| format.encoder.is_some());
        if !writable {
            exn::bail!(ErrorKind::UnsupportedFormat(target.extension().to_string()));
        }
        Ok(target)
    }
}
