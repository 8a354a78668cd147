//! Lock-free pool of NV21 frame buffers

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crossbeam::queue::SegQueue;
use crossbeam::utils::CachePadded;
use tracing::trace;

use crate::capture::frame::nv21_len;

/// Recycles fixed-size byte buffers so the analysis path never allocates
/// per frame.
///
/// The pool is advisory: asking for a size it does not hold allocates a new
/// buffer, which joins the pool once released.
#[derive(Clone, Default)]
pub struct FrameBufferPool {
    inner: Arc<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    free: SegQueue<Vec<u8>>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    allocated: AtomicUsize,
    checked_out: AtomicUsize,
    reused: AtomicUsize,
}

/// Snapshot of pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub allocated: usize,
    pub free: usize,
    pub checked_out: usize,
    pub reused: usize,
}

impl FrameBufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check out a buffer sized for a `width`x`height` NV21 frame.
    pub fn acquire(&self, width: u32, height: u32) -> PooledBuffer {
        let len = nv21_len(width, height);
        let inner = &self.inner;

        // Only look at what is queued right now; mismatched buffers go back.
        let mut found = None;
        for _ in 0..inner.free.len() {
            match inner.free.pop() {
                Some(buf) if buf.len() == len => {
                    found = Some(buf);
                    break;
                }
                Some(buf) => inner.free.push(buf),
                None => break,
            }
        }

        let data = match found {
            Some(buf) => {
                inner.stats.reused.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                inner.stats.allocated.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("codescan_pool_allocations").increment(1);
                trace!(width, height, len, "allocating frame buffer");
                vec![0u8; len]
            }
        };

        inner.stats.checked_out.fetch_add(1, Ordering::AcqRel);
        PooledBuffer {
            data: Some(data),
            width,
            height,
            pool: Arc::downgrade(&self.inner),
        }
    }

    /// Return a buffer explicitly. Dropping it has the same effect.
    pub fn release(&self, buffer: PooledBuffer) {
        drop(buffer);
    }

    pub fn free_count(&self) -> usize {
        self.inner.free.len()
    }

    pub fn stats(&self) -> PoolStats {
        let stats = &self.inner.stats;
        PoolStats {
            allocated: stats.allocated.load(Ordering::Relaxed),
            free: self.inner.free.len(),
            checked_out: stats.checked_out.load(Ordering::Acquire),
            reused: stats.reused.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for FrameBufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBufferPool").field("stats", &self.stats()).finish()
    }
}

/// A buffer checked out of a [`FrameBufferPool`].
///
/// Goes back to the pool on drop. If the pool is already gone the bytes are
/// simply freed.
pub struct PooledBuffer {
    data: Option<Vec<u8>>,
    width: u32,
    height: u32,
    pool: Weak<PoolInner>,
}

impl PooledBuffer {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or_default()
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.len())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let Some(data) = self.data.take() else {
            return;
        };
        if let Some(pool) = self.pool.upgrade() {
            pool.stats.checked_out.fetch_sub(1, Ordering::AcqRel);
            pool.free.push(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_buffer_is_reused() {
        let pool = FrameBufferPool::new();
        let buf = pool.acquire(4, 4);
        assert_eq!(buf.len(), 24);
        assert_eq!(pool.stats().checked_out, 1);
        pool.release(buf);

        assert_eq!(pool.free_count(), 1);
        let _again = pool.acquire(4, 4);
        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.free, 0);
    }

    #[test]
    fn test_wrong_size_grows_pool() {
        let pool = FrameBufferPool::new();
        drop(pool.acquire(4, 4));
        let other = pool.acquire(8, 8);
        assert_eq!(other.len(), 96);
        assert_eq!(pool.stats().allocated, 2);
        // The 4x4 buffer stayed queued
        assert_eq!(pool.free_count(), 1);
        drop(other);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_buffer_outliving_pool_is_freed() {
        let pool = FrameBufferPool::new();
        let buf = pool.acquire(2, 2);
        drop(pool);
        drop(buf);
    }
}
