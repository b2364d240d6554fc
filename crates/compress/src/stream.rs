//! Stream Adapters
//!
//! [`Registry::decompress_stream`] sniffs the format and hands back a reader
//! that undoes it; [`Registry::compress_stream`] is told the format and hands
//! back a writer that applies it.

use crate::codec::{BoxedEncoder, BoxedRead, BoxedWrite};
use crate::error::{ErrorKind, Result};
use crate::peek::{LayerReader, PeekReader};
use crate::pool::BufferPool;
use crate::{Compression, Registry};
use exn::ResultExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::{Read, Result as IoResult, Write};
use tracing::instrument;

/// How many leading bytes are peeked for detection. Covers every registered
/// signature with room to spare.
pub const PEEK_LEN: usize = 10;

/// A reader that transparently decompresses a layer, together with the
/// compression that was detected.
///
/// Holds a buffer checked out of a [`BufferPool`]; [`close`](Self::close)
/// (or dropping the stream) returns it.
pub struct DecompressStream<'a> {
    inner: BoxedRead<'a>,
    compression: Compression,
}

impl DecompressStream<'_> {
    /// The compression the layer was stored with.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Release the decoder, detach from the source stream and return the
    /// peek buffer to its pool.
    pub fn close(self) {
        tracing::trace!(format = %self.compression, "closing decompress stream");
        drop(self);
    }
}

impl Read for DecompressStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        self.inner.read(buf)
    }
}

impl Debug for DecompressStream<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DecompressStream").field("compression", &self.compression).finish_non_exhaustive()
    }
}

enum Sink<'a> {
    Passthrough(BoxedWrite<'a>),
    Encoder(BoxedEncoder<'a>),
}

/// A writer that compresses everything written to it.
///
/// Call [`close`](Self::close) when done: for compressed formats that is what
/// writes the trailer.
pub struct CompressStream<'a> {
    sink: Sink<'a>,
    compression: Compression,
}

impl CompressStream<'_> {
    /// The compression being applied.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Finalize the stream.
    ///
    /// Encoders flush and write their trailer, and any failure is reported.
    /// Uncompressed streams have nothing to finalize: the writer is flushed
    /// and any error from it is ignored.
    pub fn close(self) -> Result<()> {
        match self.sink {
            Sink::Passthrough(mut writer) => {
                let _ = writer.flush();
                Ok(())
            },
            Sink::Encoder(encoder) => encoder.finish().or_raise(|| ErrorKind::Io),
        }
    }
}

impl Write for CompressStream<'_> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        match &mut self.sink {
            Sink::Passthrough(writer) => writer.write(buf),
            Sink::Encoder(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match &mut self.sink {
            Sink::Passthrough(writer) => writer.flush(),
            Sink::Encoder(encoder) => encoder.flush(),
        }
    }
}

impl Debug for CompressStream<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CompressStream").field("compression", &self.compression).finish_non_exhaustive()
    }
}

impl Registry {
    /// Open `reader` as a layer of unknown compression.
    ///
    /// Peeks the first [`PEEK_LEN`] bytes through a buffer from `pool`,
    /// detects the format, and stacks the matching decoder on top. An empty
    /// `reader` is not an error: it reads as an empty uncompressed layer.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Io`] if reading the leading bytes fails.
    /// - [`ErrorKind::InvalidData`] if the decoder rejects the header.
    /// - [`ErrorKind::Io`] if the source fails while the header is parsed.
    /// - [`ErrorKind::UnsupportedFormat`] if the detected format has no
    ///   decoder in this registry.
    ///
    /// The peek buffer is back in `pool` before any error is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Read;
    /// use strata_compress::{BufferPool, Compression, Registry};
    ///
    /// let pool = BufferPool::new();
    /// let registry = Registry::builtin();
    /// let layer = registry.compress(Compression::Gzip, b"layer.tar").unwrap();
    ///
    /// let mut stream = registry.decompress_stream(&pool, layer.as_slice()).unwrap();
    /// assert_eq!(stream.compression(), Compression::Gzip);
    /// let mut contents = Vec::new();
    /// stream.read_to_end(&mut contents).unwrap();
    /// stream.close();
    /// assert_eq!(contents, b"layer.tar");
    /// assert_eq!(pool.idle(), 1);
    /// ```
    #[instrument(skip_all, fields(format))]
    pub fn decompress_stream<'a, R: Read + Send + 'a>(
        &self,
        pool: &'a BufferPool,
        reader: R,
    ) -> Result<DecompressStream<'a>> {
        let mut reader: LayerReader<'a> = PeekReader::new(pool, Box::new(reader));
        // End-of-stream inside the peek window just means a short (possibly
        // empty) layer; only a real read error fails here.
        let compression = self.detect(reader.peek(PEEK_LEN).or_raise(|| ErrorKind::Io)?);
        tracing::Span::current().record("format", compression.as_str());
        tracing::debug!(format = %compression, "detected layer compression");

        let inner: BoxedRead<'a> = match self.get(compression) {
            None if compression == Compression::None => Box::new(reader),
            Some(format) => match format.decoder {
                Some(decoder) => ErrorKind::raise_read(decoder(reader))?,
                None => exn::bail!(ErrorKind::UnsupportedFormat(compression.extension().to_string())),
            },
            None => exn::bail!(ErrorKind::UnsupportedFormat(compression.extension().to_string())),
        };
        Ok(DecompressStream { inner, compression })
    }

    /// Wrap `writer` so that everything written to it is compressed as
    /// `compression`. No detection happens; the caller picks the format.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::UnsupportedFormat`] if `compression` has no encoder in
    ///   this registry.
    /// - [`ErrorKind::Encoder`] if the encoder can't be initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::Write;
    /// use strata_compress::{Compression, Registry};
    ///
    /// let mut layer = Vec::new();
    /// let mut stream = Registry::builtin().compress_stream(&mut layer, Compression::Gzip).unwrap();
    /// stream.write_all(b"layer.tar").unwrap();
    /// stream.close().unwrap();
    /// assert_eq!(layer[..3], [0x1F, 0x8B, 0x08]);
    /// ```
    #[instrument(skip_all, fields(format = %compression))]
    pub fn compress_stream<'a, W: Write + Send + 'a>(
        &self,
        writer: W,
        compression: Compression,
    ) -> Result<CompressStream<'a>> {
        if compression == Compression::None {
            return Ok(CompressStream { sink: Sink::Passthrough(Box::new(writer)), compression });
        }
        let Some((encoder, level)) = self.get(compression).and_then(|format| Some((format.encoder?, format.level)))
        else {
            exn::bail!(ErrorKind::UnsupportedFormat(compression.extension().to_string()));
        };
        let level = compression.levels().map_or(level, |range| level.clamp(*range.start(), *range.end()));
        let encoder = encoder(Box::new(writer), level).or_raise(|| ErrorKind::Encoder)?;
        Ok(CompressStream { sink: Sink::Encoder(encoder), compression })
    }
}
