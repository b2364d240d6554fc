//! Read-ahead over a pooled buffer.
//!
//! [`PeekReader`] is a [`BufRead`] whose storage is checked out of a
//! [`BufferPool`]. Peeked bytes stay in the buffer and are replayed by
//! subsequent reads, so a codec can be stacked on top after detection without
//! losing the magic bytes.

use crate::codec::BoxedRead;
use crate::pool::{BufferPool, PooledBuffer};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::io::{BufRead, ErrorKind as IoErrorKind, Read, Result as IoResult};

/// The reader handed to codec decoder constructors: a peek reader over a
/// type-erased source stream.
pub type LayerReader<'a> = PeekReader<'a, BoxedRead<'a>>;

/// A buffered reader over a pooled [`PeekBuffer`](crate::pool::PeekBuffer)
/// that can look ahead without consuming.
///
/// Dropping the reader detaches it from `R` and returns the buffer to its
/// pool.
pub struct PeekReader<'p, R> {
    buffer: PooledBuffer<'p>,
    inner: R,
}

impl<'p, R: Read> PeekReader<'p, R> {
    /// Attach a buffer from `pool` to `inner`.
    pub fn new(pool: &'p BufferPool, inner: R) -> Self {
        Self { buffer: pool.checkout(), inner }
    }

    /// Return up to `limit` upcoming bytes without consuming them.
    ///
    /// Keeps reading until `limit` bytes are buffered or `inner` signals
    /// end-of-stream with a zero-length read; a short read alone never ends
    /// the peek. The result is shorter than `limit` only at end-of-stream,
    /// or when `limit` exceeds the buffer capacity.
    pub fn peek(&mut self, limit: usize) -> IoResult<&[u8]> {
        let limit = limit.min(self.buffer.capacity());
        let buffer = &mut *self.buffer;
        if buffer.filled - buffer.pos < limit {
            buffer.buf.copy_within(buffer.pos..buffer.filled, 0);
            buffer.filled -= buffer.pos;
            buffer.pos = 0;
            while buffer.filled < limit {
                match self.inner.read(&mut buffer.buf[buffer.filled..]) {
                    Ok(0) => break,
                    Ok(read) => buffer.filled += read,
                    Err(err) if err.kind() == IoErrorKind::Interrupted => continue,
                    Err(err) => return Err(err),
                }
            }
        }
        let end = (buffer.pos + limit).min(buffer.filled);
        Ok(&buffer.buf[buffer.pos..end])
    }
}

impl<R> PeekReader<'_, R> {
    /// Bytes read ahead from the source but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer.buf[self.buffer.pos..self.buffer.filled]
    }

    /// The source stream this reader is attached to.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R: Read> Read for PeekReader<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        // Nothing buffered and a large destination: skip the extra copy.
        if self.buffer.pos == self.buffer.filled && out.len() >= self.buffer.capacity() {
            return self.inner.read(out);
        }
        let available = self.fill_buf()?;
        let read = available.len().min(out.len());
        out[..read].copy_from_slice(&available[..read]);
        self.consume(read);
        Ok(read)
    }
}

impl<R: Read> BufRead for PeekReader<'_, R> {
    fn fill_buf(&mut self) -> IoResult<&[u8]> {
        let buffer = &mut *self.buffer;
        if buffer.pos >= buffer.filled {
            buffer.filled = self.inner.read(&mut buffer.buf)?;
            buffer.pos = 0;
        }
        Ok(&buffer.buf[buffer.pos..buffer.filled])
    }

    fn consume(&mut self, amount: usize) {
        self.buffer.pos = (self.buffer.pos + amount).min(self.buffer.filled);
    }
}

impl<R> Debug for PeekReader<'_, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PeekReader")
            .field("buffered", &(self.buffer.filled - self.buffer.pos))
            .field("capacity", &self.buffer.capacity())
            .finish_non_exhaustive()
    }
}
