//! Compression Operations
//!
//! Whole-buffer and whole-stream conveniences layered on the stream adapters.

use crate::error::{ErrorKind, Result};
use crate::{BufferPool, Compression, Preference, Registry};
use exn::ResultExt;
use std::io::{Read, Result as IoResult, Write};
use tracing::instrument;

/// Remembers whether the wrapped writer has failed, so a copy error can be
/// pinned on the right side.
struct WriteSide<'w, W: ?Sized> {
    inner: &'w mut W,
    failed: bool,
}

impl<W: Write + ?Sized> Write for WriteSide<'_, W> {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        self.inner.write(buf).inspect_err(|_| self.failed = true)
    }

    fn flush(&mut self) -> IoResult<()> {
        self.inner.flush().inspect_err(|_| self.failed = true)
    }
}

/// Like [`std::io::copy`], but decode failures on the read side are reported
/// as [`ErrorKind::InvalidData`]. Anything the writer reports is
/// [`ErrorKind::Io`].
fn copy<R: Read + ?Sized, W: Write + ?Sized>(reader: &mut R, writer: &mut W) -> Result<u64> {
    let mut sink = WriteSide { inner: writer, failed: false };
    let result = std::io::copy(reader, &mut sink);
    if sink.failed {
        return result.or_raise(|| ErrorKind::Io);
    }
    ErrorKind::raise_read(result)
}

impl Registry {
    /// Compress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_compress::{Compression, Registry};
    ///
    /// let registry = Registry::builtin();
    /// let compressed = registry.compress(Compression::Gzip, b"Hello, world!").unwrap();
    /// assert_eq!(registry.detect(&compressed), Compression::Gzip);
    /// ```
    #[instrument(skip_all, fields(format = %compression, input_size = input.len(), output_size))]
    pub fn compress(&self, compression: Compression, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut stream = self.compress_stream(&mut output, compression)?;
        stream.write_all(input).or_raise(|| ErrorKind::Io)?;
        stream.close()?;
        tracing::Span::current().record("output_size", output.len());
        Ok(output)
    }

    /// Decompress a byte slice in memory, detecting its compression.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_compress::{BufferPool, Compression, Registry};
    ///
    /// let registry = Registry::builtin();
    /// let pool = BufferPool::new();
    /// let compressed = registry.compress(Compression::Gzip, b"Hello, world!").unwrap();
    /// let (format, data) = registry.decompress(&pool, &compressed).unwrap();
    /// assert_eq!(format, Compression::Gzip);
    /// assert_eq!(data, b"Hello, world!");
    ///
    /// let (format, data) = registry.decompress(&pool, b"plain").unwrap();
    /// assert_eq!(format, Compression::None);
    /// assert_eq!(data, b"plain");
    /// ```
    #[instrument(skip_all, fields(input_size = input.len(), output_size))]
    pub fn decompress(&self, pool: &BufferPool, input: &[u8]) -> Result<(Compression, Vec<u8>)> {
        let mut stream = self.decompress_stream(pool, input)?;
        let mut output = Vec::new();
        copy(&mut stream, &mut output)?;
        tracing::Span::current().record("output_size", output.len());
        Ok((stream.compression(), output))
    }

    /// Re-pack a layer: detect and strip its compression, then apply the
    /// compression `preference` resolves to (against `configured` and the
    /// detected format).
    ///
    /// Returns the detected compression and the number of uncompressed bytes
    /// copied.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_compress::{BufferPool, Compression, Preference, Registry};
    ///
    /// let registry = Registry::builtin();
    /// let pool = BufferPool::new();
    /// let layer = registry.compress(Compression::Gzip, b"layer.tar").unwrap();
    ///
    /// let mut repacked = Vec::new();
    /// let explicit = Preference::Explicit(Compression::None);
    /// let (source, bytes) = registry
    ///     .transcode(&pool, layer.as_slice(), &mut repacked, explicit, Compression::Gzip)
    ///     .unwrap();
    /// assert_eq!(source, Compression::Gzip);
    /// assert_eq!(bytes, 9);
    /// assert_eq!(repacked, b"layer.tar");
    /// ```
    #[instrument(skip_all, fields(source, target, bytes))]
    pub fn transcode<R: Read + Send, W: Write + Send>(
        &self,
        pool: &BufferPool,
        reader: R,
        writer: W,
        preference: Preference,
        configured: Compression,
    ) -> Result<(Compression, u64)> {
        let mut source = self.decompress_stream(pool, reader)?;
        let detected = source.compression();
        let target = self.resolve(preference, configured, Some(detected))?;
        let span = tracing::Span::current();
        span.record("source", detected.as_str());
        span.record("target", target.as_str());

        let mut sink = self.compress_stream(writer, target)?;
        let bytes = copy(&mut source, &mut sink)?;
        sink.close()?;
        source.close();
        span.record("bytes", bytes);
        Ok((detected, bytes))
    }
}
