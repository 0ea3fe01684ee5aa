//! Bounded pools of reusable buffers.
//!
//! Byte buffers of one size class and output-message lists are borrowed by
//! the chunk generator, filled or consumed elsewhere, and return to their
//! pool when the last holder drops the lease. The pools are the only state
//! shared between worker threads and the consumer.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::message::LogMessage;
use crate::postprocess::PostprocessResult;

/// One parsed result in a chunk's output buffer.
pub type OutputItem = (LogMessage, Option<PostprocessResult>);

struct PoolCore<T> {
    free: Mutex<Vec<T>>,
    max_free: usize,
    outstanding: AtomicUsize,
}

impl<T> PoolCore<T> {
    fn new(max_free: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            max_free,
            outstanding: AtomicUsize::new(0),
        })
    }

    fn lock_free(&self) -> MutexGuard<'_, Vec<T>> {
        match self.free.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take(&self) -> Option<T> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.lock_free().pop()
    }

    fn put(&self, item: T) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        let mut free = self.lock_free();
        if free.len() < self.max_free {
            free.push(item);
        }
    }
}

/// Bounded pool of equally-sized byte buffers shared between the chunk
/// generator and worker threads.
#[derive(Clone)]
pub struct BufferPool {
    core: Arc<PoolCore<Vec<u8>>>,
    buf_size: usize,
}

impl BufferPool {
    pub fn new(buf_size: usize, max_free: usize) -> Self {
        Self {
            core: PoolCore::new(max_free),
            buf_size,
        }
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Borrow a zero-initialized buffer of the pool's size class.
    pub fn borrow(&self) -> PooledBuf {
        let data = self
            .core
            .take()
            .unwrap_or_else(|| vec![0u8; self.buf_size]);
        PooledBuf {
            data,
            core: Arc::clone(&self.core),
        }
    }

    /// Buffers currently lent out and not yet returned.
    pub fn outstanding(&self) -> usize {
        self.core.outstanding.load(Ordering::SeqCst)
    }

    /// Buffers retained for reuse.
    pub fn pooled(&self) -> usize {
        self.core.lock_free().len()
    }

    /// Drop all retained buffers. Outstanding leases still return normally.
    pub fn clear(&self) {
        self.core.lock_free().clear();
    }
}

/// A byte buffer on loan from a [`BufferPool`]; returns on drop.
pub struct PooledBuf {
    data: Vec<u8>,
    core: Arc<PoolCore<Vec<u8>>>,
}

impl Deref for PooledBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.core.put(std::mem::take(&mut self.data));
    }
}

/// Bounded pool of output-message lists, one borrowed per chunk.
#[derive(Clone)]
pub struct OutputPool {
    core: Arc<PoolCore<Vec<OutputItem>>>,
}

impl OutputPool {
    pub fn new(max_free: usize) -> Self {
        Self {
            core: PoolCore::new(max_free),
        }
    }

    pub fn borrow(&self) -> PooledOutput {
        let items = self.core.take().unwrap_or_default();
        PooledOutput {
            items,
            core: Arc::clone(&self.core),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.core.outstanding.load(Ordering::SeqCst)
    }

    pub fn pooled(&self) -> usize {
        self.core.lock_free().len()
    }

    pub fn clear(&self) {
        self.core.lock_free().clear();
    }
}

/// An output list on loan from an [`OutputPool`]; cleared and returned on
/// drop.
pub struct PooledOutput {
    items: Vec<OutputItem>,
    core: Arc<PoolCore<Vec<OutputItem>>>,
}

impl Deref for PooledOutput {
    type Target = Vec<OutputItem>;

    fn deref(&self) -> &Vec<OutputItem> {
        &self.items
    }
}

impl DerefMut for PooledOutput {
    fn deref_mut(&mut self) -> &mut Vec<OutputItem> {
        &mut self.items
    }
}

impl Drop for PooledOutput {
    fn drop(&mut self) {
        let mut items = std::mem::take(&mut self.items);
        items.clear();
        self.core.put(items);
    }
}
