//! Format Registry
//!
//! Each supported format is a [`Format`] record: the kind, the magic bytes
//! that identify it, and (optionally) how to build its decoder and encoder.
//! The detector and both stream adapters only ever go through a
//! [`Registry`], so supporting a new format means registering one more record.

use crate::Compression;
use crate::codec::{BoxedEncoder, BoxedRead, BoxedWrite, bzip2_decoder, bzip2_encoder, gzip_decoder, gzip_encoder};
#[cfg(feature = "xz")]
use crate::codec::{xz_decoder, xz_encoder};
#[cfg(feature = "zstd")]
use crate::codec::{zstd_decoder, zstd_encoder};
use crate::error::{ErrorKind, Result};
use crate::peek::LayerReader;
use crate::stream::PEEK_LEN;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::Result as IoResult;

/// Builds a decoder on top of a peek reader. Fails on a malformed header.
pub type DecoderFn = for<'a> fn(LayerReader<'a>) -> IoResult<BoxedRead<'a>>;
/// Builds an encoder on top of a writer at the given level.
pub type EncoderFn = for<'a> fn(BoxedWrite<'a>, u32) -> IoResult<BoxedEncoder<'a>>;

pub(crate) const GZIP_MAGIC: [u8; 3] = [0x1F, 0x8B, 0x08];
pub(crate) const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
#[cfg_attr(not(feature = "xz"), allow(dead_code))]
pub(crate) const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
#[cfg_attr(not(feature = "zstd"), allow(dead_code))]
pub(crate) const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

// Same defaults the reference command-line tools use.
const GZIP_LEVEL: u32 = 6;
const BZIP2_LEVEL: u32 = 9;
#[cfg(feature = "xz")]
const XZ_LEVEL: u32 = 6;
#[cfg(feature = "zstd")]
const ZSTD_LEVEL: u32 = 3;

/// Everything the registry knows about one compression format.
#[derive(Clone, Copy)]
pub struct Format {
    /// The kind this record describes.
    pub kind: Compression,
    /// Magic bytes every stream of this kind starts with.
    pub signature: &'static [u8],
    /// Decoder constructor, if streams of this kind can be read.
    pub decoder: Option<DecoderFn>,
    /// Encoder constructor, if streams of this kind can be written.
    pub encoder: Option<EncoderFn>,
    /// Level handed to the encoder.
    pub level: u32,
}

impl Format {
    /// A detect-only record: streams are recognised but can't be decoded or
    /// encoded until constructors are attached.
    pub const fn new(kind: Compression, signature: &'static [u8]) -> Self {
        Self { kind, signature, decoder: None, encoder: None, level: 0 }
    }

    #[must_use]
    pub const fn with_decoder(mut self, decoder: DecoderFn) -> Self {
        self.decoder = Some(decoder);
        self
    }

    #[must_use]
    pub const fn with_encoder(mut self, encoder: EncoderFn) -> Self {
        self.encoder = Some(encoder);
        self
    }

    #[must_use]
    pub const fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    /// Canonical extension of this format.
    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }

    /// The record for `kind` with this crate's codecs attached, or `None`
    /// when the kind is uncompressed or its cargo feature is disabled.
    pub fn builtin(kind: Compression) -> Option<Self> {
        match kind {
            Compression::None => None,
            Compression::Gzip => Some(
                Format::new(kind, &GZIP_MAGIC)
                    .with_decoder(gzip_decoder)
                    .with_encoder(gzip_encoder)
                    .with_level(GZIP_LEVEL),
            ),
            Compression::Bzip2 => Some(
                Format::new(kind, &BZIP2_MAGIC)
                    .with_decoder(bzip2_decoder)
                    .with_encoder(bzip2_encoder)
                    .with_level(BZIP2_LEVEL),
            ),
            #[cfg(feature = "xz")]
            Compression::Xz => Some(
                Format::new(kind, &XZ_MAGIC).with_decoder(xz_decoder).with_encoder(xz_encoder).with_level(XZ_LEVEL),
            ),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Some(
                Format::new(kind, &ZSTD_MAGIC)
                    .with_decoder(zstd_decoder)
                    .with_encoder(zstd_encoder)
                    .with_level(ZSTD_LEVEL),
            ),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// True if `bytes` starts with this format's signature.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        bytes.len() >= self.signature.len() && bytes[..self.signature.len()] == *self.signature
    }
}

impl Debug for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Format")
            .field("kind", &self.kind)
            .field("signature", &self.signature)
            .field("decoder", &self.decoder.is_some())
            .field("encoder", &self.encoder.is_some())
            .field("level", &self.level)
            .finish()
    }
}

/// The set of formats a detector and its adapters understand.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    formats: Vec<Format>,
}

impl Registry {
    /// A registry that recognises nothing: every stream reads as uncompressed.
    pub const fn empty() -> Self {
        Self { formats: Vec::new() }
    }

    /// Gzip only. This is what container layers use.
    pub fn builtin() -> Self {
        Self::from_kinds([Compression::Gzip])
    }

    /// Gzip and bzip2, plus xz and zstd when their features are enabled.
    pub fn extended() -> Self {
        Self::from_kinds(Compression::ALL)
    }

    // The builtin signatures are known to be unambiguous, so this skips the
    // checks `register` does.
    fn from_kinds(kinds: impl IntoIterator<Item = Compression>) -> Self {
        Self { formats: kinds.into_iter().filter_map(Format::builtin).collect() }
    }

    /// Add `format`, replacing any existing record for the same kind.
    ///
    /// Fails when the signature is empty, doesn't fit in the peek window, or
    /// is a prefix of (or prefixed by) another registered signature, since
    /// detection would then depend on iteration order.
    pub fn register(&mut self, format: Format) -> Result<()> {
        if format.kind == Compression::None {
            exn::bail!(ErrorKind::UnsupportedFormat(format.extension().to_string()));
        }
        if format.signature.is_empty() || format.signature.len() > PEEK_LEN {
            exn::bail!(ErrorKind::AmbiguousSignature(format.extension().to_string()));
        }
        let collides = self
            .formats
            .iter()
            .filter(|existing| existing.kind != format.kind)
            .any(|existing| existing.matches(format.signature) || format.matches(existing.signature));
        if collides {
            exn::bail!(ErrorKind::AmbiguousSignature(format.extension().to_string()));
        }
        tracing::debug!(format = %format.kind, "registering compression format");
        match self.formats.iter_mut().find(|existing| existing.kind == format.kind) {
            Some(existing) => *existing = format,
            None => self.formats.push(format),
        }
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, format: Format) -> Result<Self> {
        self.register(format)?;
        Ok(self)
    }

    /// The record registered for `kind`, if any.
    pub fn get(&self, kind: Compression) -> Option<&Format> {
        self.formats.iter().find(|format| format.kind == kind)
    }

    /// Registered kinds, in registration order.
    pub fn kinds(&self) -> impl Iterator<Item = Compression> + '_ {
        self.formats.iter().map(|format| format.kind)
    }

    /// Change the encoder level used for `kind`.
    pub fn set_level(&mut self, kind: Compression, level: u32) -> Result<()> {
        match self.formats.iter_mut().find(|format| format.kind == kind) {
            Some(format) => {
                format.level = level;
                Ok(())
            },
            None => exn::bail!(ErrorKind::UnsupportedFormat(kind.extension().to_string())),
        }
    }

    /// Extension of `kind` if it is registered, otherwise the empty string.
    /// For display only; never fails.
    pub fn extension(&self, kind: Compression) -> &'static str {
        self.get(kind).map(Format::extension).unwrap_or_default()
    }

    /// Detect the compression of a stream from its leading bytes.
    ///
    /// `bytes` may be any length; signatures longer than it are skipped, and
    /// if nothing matches the stream is [`Compression::None`].
    ///
    /// ```
    /// use strata_compress::{Compression, Registry};
    ///
    /// let registry = Registry::extended();
    /// assert_eq!(registry.detect(&[0x1F, 0x8B, 0x08, 0x00, 0x00]), Compression::Gzip);
    /// assert_eq!(registry.detect(b"BZh91AY&SY"), Compression::Bzip2);
    /// assert_eq!(registry.detect(&[0x1F, 0x8B]), Compression::None);
    /// ```
    #[must_use]
    pub fn detect(&self, bytes: &[u8]) -> Compression {
        self.formats
            .iter()
            .find(|format| format.matches(bytes))
            .map_or(Compression::None, |format| format.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[])]
    #[case(&[0x1F])]
    #[case(&[0x1F, 0x8B])]
    #[case(&[0x42, 0x5A])]
    fn shorter_than_every_signature(#[case] bytes: &[u8]) {
        assert_eq!(Registry::builtin().detect(bytes), Compression::None);
        assert_eq!(Registry::extended().detect(bytes), Compression::None);
    }

    #[rstest]
    #[case(&[0x1F, 0x8B, 0x08])]
    #[case(&[0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF])]
    #[case(&[0x1F, 0x8B, 0x08, 0xDE, 0xAD, 0xBE, 0xEF])]
    fn gzip_signature_regardless_of_trailer(#[case] bytes: &[u8]) {
        assert_eq!(Registry::builtin().detect(bytes), Compression::Gzip);
    }

    #[rstest]
    // Deflate is the only method gzip defines; anything else isn't ours.
    #[case(&[0x1F, 0x8B, 0x07, 0x00])]
    #[case(b"layer.tar\0\0\0")]
    #[case(b"ustar")]
    fn not_gzip(#[case] bytes: &[u8]) {
        assert_eq!(Registry::builtin().detect(bytes), Compression::None);
    }

    #[rstest]
    #[case(&[0x42, 0x5A, 0x68, 0x39], Compression::Bzip2)]
    #[cfg_attr(feature = "xz", case(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00], Compression::Xz))]
    #[cfg_attr(feature = "zstd", case(&[0x28, 0xB5, 0x2F, 0xFD], Compression::Zstd))]
    fn extended_signatures(#[case] bytes: &[u8], #[case] expected: Compression) {
        assert_eq!(Registry::extended().detect(bytes), expected);
        assert_eq!(Registry::builtin().detect(bytes), Compression::None);
    }

    #[test]
    fn empty_registry_detects_nothing() {
        let registry = Registry::empty();
        assert_eq!(registry.detect(&GZIP_MAGIC), Compression::None);
        assert_eq!(registry.kinds().count(), 0);
    }

    #[test]
    fn extension_of_unregistered_kind_is_empty() {
        let registry = Registry::builtin();
        assert_eq!(registry.extension(Compression::Gzip), "gz");
        assert_eq!(registry.extension(Compression::Bzip2), "");
        assert_eq!(registry.extension(Compression::None), "");
    }

    #[test]
    fn register_detect_only_format() {
        let mut registry = Registry::builtin();
        registry.register(Format::new(Compression::Zstd, &ZSTD_MAGIC)).unwrap();
        assert_eq!(registry.detect(&[0x28, 0xB5, 0x2F, 0xFD, 0x00]), Compression::Zstd);
        assert!(registry.get(Compression::Zstd).unwrap().decoder.is_none());
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec![Compression::Gzip, Compression::Zstd]);
    }

    #[test]
    fn register_replaces_same_kind() {
        let mut registry = Registry::builtin();
        registry.register(Format::new(Compression::Gzip, &[0x1F, 0x8B])).unwrap();
        assert_eq!(registry.kinds().count(), 1);
        assert!(registry.get(Compression::Gzip).unwrap().decoder.is_none());
    }

    #[rstest]
    // Prefix of the gzip signature.
    #[case(Format::new(Compression::Bzip2, &[0x1F, 0x8B]))]
    // Prefixed by the gzip signature.
    #[case(Format::new(Compression::Bzip2, &[0x1F, 0x8B, 0x08, 0x00]))]
    #[case(Format::new(Compression::Bzip2, &[]))]
    #[case(Format::new(Compression::Bzip2, &[0x42; PEEK_LEN + 1]))]
    fn register_rejects_ambiguous(#[case] format: Format) {
        let mut registry = Registry::builtin();
        let err = registry.register(format).unwrap_err();
        assert_eq!(*err, ErrorKind::AmbiguousSignature("bz2".to_string()));
        assert_eq!(registry.kinds().count(), 1);
    }

    #[test]
    fn register_rejects_uncompressed() {
        let err = Registry::empty().with(Format::new(Compression::None, b"tar")).unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat(String::new()));
    }

    #[test]
    fn builtin_signatures_are_unambiguous() {
        let mut registry = Registry::empty();
        for kind in Compression::ALL {
            if let Some(format) = Format::builtin(kind) {
                registry.register(format).unwrap();
            }
        }
        assert_eq!(registry.kinds().count(), Registry::extended().kinds().count());
    }

    #[test]
    fn set_level() {
        let mut registry = Registry::builtin();
        registry.set_level(Compression::Gzip, 9).unwrap();
        assert_eq!(registry.get(Compression::Gzip).unwrap().level, 9);
        let err = registry.set_level(Compression::Bzip2, 9).unwrap_err();
        assert_eq!(*err, ErrorKind::UnsupportedFormat("bz2".to_string()));
    }
}
