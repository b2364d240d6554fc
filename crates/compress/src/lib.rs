//! Compression detection and transparent stream adapters for container image
//! layers.
//!
//! A layer may be stored as a raw tar stream or as a compressed one, and the
//! caller usually doesn't know which until it looks. This crate provides:
//!
//! - **Detection** from magic bytes ([`Registry::detect`],
//!   [`detect_compression`]) or file extensions ([`Compression::from_path`])
//! - **Reading** via [`Registry::decompress_stream`], which peeks at the
//!   first bytes of any reader and hands back a [`DecompressStream`] that
//!   transparently decodes whatever it found
//! - **Writing** via [`Registry::compress_stream`], which wraps any writer in
//!   the encoder for an explicitly chosen format
//! - **Buffer reuse** via [`BufferPool`]: every read adapter borrows a 32 KiB
//!   peek buffer from a pool and gives it back when the stream is closed
//!
//! The set of recognised formats lives in a [`Registry`] of [`Format`]
//! records. [`Registry::builtin`] knows gzip only, which is all a container
//! layer is ever compressed with in practice; [`Registry::extended`] adds
//! bzip2, plus xz and zstd behind the `xz` and `zstd` features.

mod codec;
mod construct;
pub mod error;
mod ops;
pub mod peek;
pub mod pool;
mod preference;
pub mod registry;
mod stream;
mod util;

use std::io::{Read, Write};
use std::sync::LazyLock;

pub use crate::codec::{BoxedEncoder, BoxedRead, BoxedWrite, EncodeWrite};
pub use crate::peek::{LayerReader, PeekReader};
pub use crate::pool::{BufferPool, PEEK_BUFFER_SIZE};
pub use crate::preference::{Flag, Preference};
pub use crate::registry::{Format, Registry};
pub use crate::stream::{CompressStream, DecompressStream, PEEK_LEN};

/// A compression format a layer can be stored in.
///
/// Every variant exists regardless of enabled features; whether a codec
/// backs it is decided by the [`Registry`] in use. Defaults to
/// [`None`](Self::None) (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Gzip compression (.gz)
    Gzip,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// XZ/LZMA compression (.xz)
    Xz,
    /// Zstd compression (.zst)
    Zstd,
}

static BUILTIN: LazyLock<Registry> = LazyLock::new(Registry::builtin);

/// Detect the compression of `bytes` against the builtin (gzip-only)
/// registry.
///
/// ```
/// use strata_compress::{Compression, detect_compression};
///
/// assert_eq!(detect_compression(&[0x1F, 0x8B, 0x08, 0x00]), Compression::Gzip);
/// assert_eq!(detect_compression(b"ustar"), Compression::None);
/// ```
#[must_use]
pub fn detect_compression(bytes: &[u8]) -> Compression {
    BUILTIN.detect(bytes)
}

/// Open a transparently decompressing stream using the builtin registry and
/// the process-wide [`BufferPool::global`].
///
/// See [`Registry::decompress_stream`] for the full contract.
pub fn decompress_stream<'a, R: Read + Send + 'a>(reader: R) -> error::Result<DecompressStream<'a>> {
    BUILTIN.decompress_stream(BufferPool::global(), reader)
}

/// Wrap `writer` so that data written to it is compressed as `compression`,
/// using the builtin registry.
///
/// See [`Registry::compress_stream`] for the full contract.
pub fn compress_stream<'a, W: Write + Send + 'a>(
    writer: W,
    compression: Compression,
) -> error::Result<CompressStream<'a>> {
    BUILTIN.compress_stream(writer, compression)
}

#[cfg(test)]
mod tests {
    use crate::{Compression, compress_stream, decompress_stream, detect_compression};
    use std::io::{Read, Write};

    #[test]
    fn compression_default() {
        assert_eq!(Compression::default(), Compression::None);
    }

    #[test]
    fn builtin_ignores_extended_signatures() {
        assert_eq!(detect_compression(&[0x42, 0x5A, 0x68, 0x39]), Compression::None);
        assert_eq!(detect_compression(&[0x28, 0xB5, 0x2F, 0xFD]), Compression::None);
    }

    #[test]
    fn convenience_roundtrip() {
        let original = b"layer.tar contents";
        let mut compressed = Vec::new();
        let mut writer = compress_stream(&mut compressed, Compression::Gzip).unwrap();
        writer.write_all(original).unwrap();
        writer.close().unwrap();

        let mut reader = decompress_stream(compressed.as_slice()).unwrap();
        assert_eq!(reader.compression(), Compression::Gzip);
        let mut output = Vec::new();
        reader.read_to_end(&mut output).unwrap();
        reader.close();
        assert_eq!(output, original);
    }
}
