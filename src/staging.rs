// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright © 2023 Adrian <adrian.eddy at gmail>

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
};
use parking_lot::Mutex;

/// The inner shared state of the pool.
struct PoolInner {
    capacity: usize,
    // Returned buffers, emptied but keeping their allocation.
    idle: Mutex<Vec<Vec<u8>>>,
}

/// CPU-side staging buffers used to materialize frames that don't expose one
/// contiguous byte buffer. Buffers keep their allocation between frames.
#[derive(Clone)]
pub struct StagingPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for StagingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingPool")
            .field("capacity", &self.inner.capacity)
            .field("idle", &self.idle_count())
            .finish()
    }
}

impl StagingPool {
    /// `capacity` is the maximum number of **idle** buffers retained.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                idle: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get an empty buffer, reusing a previously returned allocation when there is one.
    pub fn get(&self) -> StagingBuffer {
        let buf = self.inner.idle.lock().pop().unwrap_or_default();
        StagingBuffer {
            pool: self.inner.clone(),
            buf: Some(buf),
        }
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Total bytes held by idle buffers.
    pub fn idle_bytes(&self) -> usize {
        self.inner.idle.lock().iter().map(Vec::capacity).sum()
    }
}

impl PoolInner {
    fn give_back(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(buf);
        }
    }
}

/// A staging buffer that goes back to its pool on drop.
pub struct StagingBuffer {
    pool: Arc<PoolInner>,
    buf: Option<Vec<u8>>,
}

impl fmt::Debug for StagingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingBuffer")
            .field("len", &self.buf.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

impl Deref for StagingBuffer {
    type Target = Vec<u8>;
    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().expect("buffer already taken")
    }
}

impl DerefMut for StagingBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer already taken")
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.give_back(buf);
        }
    }
}
