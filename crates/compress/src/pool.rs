//! Reusable peek buffers.
//!
//! Opening a layer needs a read-ahead buffer to sniff the format; allocating
//! 32 KiB per open adds up when an image has dozens of layers and each is
//! opened more than once. A [`BufferPool`] hands out buffers and takes them
//! back when the guard returned by [`BufferPool::checkout`] is dropped.
//!
//! The pool is an ordinary value: construct one per process, per test, or use
//! [`BufferPool::global`].

use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Capacity of every pooled peek buffer.
pub const PEEK_BUFFER_SIZE: usize = 32 * 1024;

static GLOBAL: BufferPool = BufferPool::new();

/// Fixed-capacity read-ahead storage plus its cursor.
///
/// `buf[pos..filled]` holds bytes read from the attached stream but not yet
/// handed to the consumer.
#[derive(Default)]
pub struct PeekBuffer {
    pub(crate) buf: Box<[u8]>,
    pub(crate) pos: usize,
    pub(crate) filled: usize,
}

impl PeekBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self { buf: vec![0; capacity].into_boxed_slice(), pos: 0, filled: 0 }
    }

    /// Forget any buffered bytes.
    fn reset(&mut self) {
        self.pos = 0;
        self.filled = 0;
    }

    /// Total size of the buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

/// A pool of [`PeekBuffer`]s shared between threads.
///
/// The lock only covers pushing to and popping from the idle list; stream I/O
/// never happens while it is held. There is no upper bound on how many
/// buffers the pool keeps.
pub struct BufferPool {
    idle: Mutex<Vec<PeekBuffer>>,
    allocated: AtomicUsize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    /// Create an empty pool. Buffers are allocated lazily on checkout.
    pub const fn new() -> Self {
        Self { idle: Mutex::new(Vec::new()), allocated: AtomicUsize::new(0) }
    }

    /// The process-wide pool used by the crate-level convenience functions.
    pub fn global() -> &'static BufferPool {
        &GLOBAL
    }

    /// Take a buffer out of the pool, allocating a fresh one when none is
    /// idle. The buffer goes back into the pool when the guard is dropped.
    pub fn checkout(&self) -> PooledBuffer<'_> {
        let recycled = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let buffer = recycled.unwrap_or_else(|| {
            let total = self.allocated.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!(total, "allocating peek buffer");
            PeekBuffer::with_capacity(PEEK_BUFFER_SIZE)
        });
        PooledBuffer { pool: self, buffer }
    }

    fn release(&self, mut buffer: PeekBuffer) {
        buffer.reset();
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).push(buffer);
    }

    /// Number of buffers this pool has ever allocated.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Number of buffers currently sitting in the pool, ready for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Exclusive, scoped ownership of a pooled [`PeekBuffer`].
///
/// Dropping the guard resets the buffer and returns it to the pool it came
/// from, on every exit path.
pub struct PooledBuffer<'p> {
    pool: &'p BufferPool,
    buffer: PeekBuffer,
}

impl Deref for PooledBuffer<'_> {
    type Target = PeekBuffer;
    fn deref(&self) -> &PeekBuffer {
        &self.buffer
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut PeekBuffer {
        &mut self.buffer
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(mem::take(&mut self.buffer));
    }
}
