//! Reuse pool for pixel buffer storage.
//!
//! Released buffers give their storage back to the pool; later
//! acquisitions reuse the best-fitting allocation instead of allocating.
//! The pool is bounded by [`PoolConfig::max_bytes`] and evicts the
//! least recently pooled storage when it grows past that bound.
//!
//! All bookkeeping sits behind a single mutex, so one pool can be shared
//! by every worker that finishes requests concurrently.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::buffer::{self, BufferId, PixelBuffer};
use crate::error::{ConfigError, PoolError, PoolMisuseError};
use crate::types::{BufferInfo, PixelFormat, RgbaImage};

/// Pool sizing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// When `false`, released storage is always dropped.
    pub enabled: bool,
    /// Upper bound on the bytes held by pooled (idle) storage.
    pub max_bytes: usize,
    /// Largest ratio between a pooled allocation and a request it may
    /// serve. Keeps a tiny thumbnail from pinning a huge allocation.
    pub max_size_multiple: usize,
    /// Largest single allocation the pool hands out, in bytes.
    pub max_buffer_bytes: usize,
}

impl PoolConfig {
    /// Default for [`enabled`](Self::enabled).
    pub const DEFAULT_ENABLED: bool = true;
    /// Default for [`max_bytes`](Self::max_bytes): 64 MiB.
    pub const DEFAULT_MAX_BYTES: usize = 64 * 1024 * 1024;
    /// Default for [`max_size_multiple`](Self::max_size_multiple).
    pub const DEFAULT_MAX_SIZE_MULTIPLE: usize = 8;
    /// Default for [`max_buffer_bytes`](Self::max_buffer_bytes): 256 MiB,
    /// an 8192x8192 RGBA image.
    pub const DEFAULT_MAX_BUFFER_BYTES: usize = 256 * 1024 * 1024;

    /// Check that the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `max_size_multiple` or
    /// `max_buffer_bytes` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size_multiple == 0 {
            return Err(ConfigError::Invalid(
                "pool max_size_multiple must be at least 1".to_string(),
            ));
        }
        if self.max_buffer_bytes == 0 {
            return Err(ConfigError::Invalid(
                "pool max_buffer_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            enabled: Self::DEFAULT_ENABLED,
            max_bytes: Self::DEFAULT_MAX_BYTES,
            max_size_multiple: Self::DEFAULT_MAX_SIZE_MULTIPLE,
            max_buffer_bytes: Self::DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Counters describing pool traffic since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Acquisitions served from pooled storage.
    pub hits: u64,
    /// Acquisitions that had to allocate.
    pub misses: u64,
    /// Releases whose storage was kept for reuse.
    pub pooled: u64,
    /// Releases whose storage was dropped immediately.
    pub dropped: u64,
    /// Pooled allocations evicted to stay under `max_bytes`.
    pub evicted: u64,
}

/// What [`BufferPool::release`] did with the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseOutcome {
    /// The storage is pooled for reuse.
    Pooled,
    /// The storage was freed.
    Dropped,
}

#[derive(Default)]
struct PoolState {
    /// Idle storage keyed by capacity. Each bucket is a stack; the most
    /// recently pooled allocation is reused first.
    free: BTreeMap<usize, Vec<Vec<u8>>>,
    /// Capacities in the order they were pooled, oldest first.
    order: VecDeque<usize>,
    pooled_bytes: usize,
    stats: PoolStats,
}

impl PoolState {
    fn take_best_fit(&mut self, len: usize, max_multiple: usize) -> Option<Vec<u8>> {
        let ceiling = len.saturating_mul(max_multiple);
        let capacity = *self.free.range(len..=ceiling).next()?.0;
        let storage = self.pop_bucket(capacity)?;
        if let Some(pos) = self.order.iter().rposition(|&c| c == capacity) {
            self.order.remove(pos);
        }
        Some(storage)
    }

    fn pop_bucket(&mut self, capacity: usize) -> Option<Vec<u8>> {
        let bucket = self.free.get_mut(&capacity)?;
        let storage = bucket.pop();
        if bucket.is_empty() {
            self.free.remove(&capacity);
        }
        if storage.is_some() {
            self.pooled_bytes -= capacity;
        }
        storage
    }

    fn put(&mut self, storage: Vec<u8>) {
        let capacity = storage.capacity();
        self.pooled_bytes += capacity;
        self.order.push_back(capacity);
        self.free.entry(capacity).or_default().push(storage);
    }

    /// Evict least recently pooled storage until under `max_bytes`.
    fn trim_to(&mut self, max_bytes: usize) {
        while self.pooled_bytes > max_bytes {
            let Some(capacity) = self.order.pop_front() else {
                break;
            };
            let Some(bucket) = self.free.get_mut(&capacity) else {
                continue;
            };
            // Oldest entry of the bucket sits at the bottom of the stack.
            if !bucket.is_empty() {
                bucket.remove(0);
                self.pooled_bytes -= capacity;
                self.stats.evicted += 1;
            }
            if bucket.is_empty() {
                self.free.remove(&capacity);
            }
        }
    }
}

/// Thread-safe pool of reusable pixel storage.
pub struct BufferPool {
    config: PoolConfig,
    next_id: AtomicU64,
    state: Mutex<PoolState>,
}

impl BufferPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
            state: Mutex::new(PoolState::default()),
        }
    }

    /// The pool's sizing policy.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Hand out a zero-filled buffer shaped like `info`.
    ///
    /// Reuses the smallest pooled allocation that can hold the pixels
    /// and is at most `max_size_multiple` times larger than needed;
    /// otherwise allocates.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Oversized`] if the buffer would exceed
    /// [`PoolConfig::max_buffer_bytes`].
    pub fn acquire(&self, info: BufferInfo) -> Result<PixelBuffer, PoolError> {
        let len = self.checked_len(info)?;

        let reused = {
            let mut state = self.lock();
            let reused = if len == 0 {
                None
            } else {
                state.take_best_fit(len, self.config.max_size_multiple)
            };
            if reused.is_some() {
                state.stats.hits += 1;
            } else {
                state.stats.misses += 1;
            }
            reused
        };

        let pixels = match reused {
            Some(mut storage) => {
                log::debug!(
                    "reusing pooled storage of {} bytes for {info}",
                    storage.capacity()
                );
                storage.clear();
                storage.resize(len, 0);
                storage
            }
            None => vec![0; len],
        };

        let id = BufferId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Ok(PixelBuffer::from_storage(id, info, pixels))
    }

    /// Byte length of a buffer shaped like `info`, if the pool would
    /// hand one out.
    ///
    /// Transforms call this before building large intermediates.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Oversized`] if the length overflows or
    /// exceeds [`PoolConfig::max_buffer_bytes`].
    pub fn checked_len(&self, info: BufferInfo) -> Result<usize, PoolError> {
        info.byte_len()
            .filter(|&len| len <= self.config.max_buffer_bytes)
            .ok_or(PoolError::Oversized {
                width: info.width,
                height: info.height,
                format: info.format,
            })
    }

    /// Acquire a buffer in `format` and fill it from an RGBA image.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Oversized`] if the buffer would exceed
    /// [`PoolConfig::max_buffer_bytes`].
    pub fn acquire_rgba(
        &self,
        image: &RgbaImage,
        format: PixelFormat,
    ) -> Result<PixelBuffer, PoolError> {
        let buffer = self.acquire(BufferInfo::new(image.width(), image.height(), format))?;
        // The buffer is fresh and unshared, so it cannot be released yet.
        if let Err(e) = buffer.write(|pixels| buffer::encode_rgba(image, format, pixels)) {
            log::error!("freshly acquired buffer unusable: {e}");
        }
        Ok(buffer)
    }

    /// Take a buffer's storage back.
    ///
    /// The handle and all of its clones are released afterwards. The
    /// storage is pooled unless the pool is disabled, the storage is
    /// empty, or it alone exceeds `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolMisuseError::DoubleRelease`] if the buffer was
    /// already released.
    pub fn release(&self, buffer: &PixelBuffer) -> Result<ReleaseOutcome, PoolMisuseError> {
        let storage = buffer.take_storage().inspect_err(|e| {
            log::error!("pool misuse: {e}");
        })?;
        let capacity = storage.capacity();

        let mut state = self.lock();
        if !self.config.enabled || capacity == 0 || capacity > self.config.max_bytes {
            state.stats.dropped += 1;
            log::debug!(
                "dropping storage of {capacity} bytes from buffer {}",
                buffer.id()
            );
            return Ok(ReleaseOutcome::Dropped);
        }

        state.put(storage);
        state.stats.pooled += 1;
        state.trim_to(self.config.max_bytes);
        Ok(ReleaseOutcome::Pooled)
    }

    /// Traffic counters since creation.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.lock().stats
    }

    /// Bytes currently held by idle storage.
    #[must_use]
    pub fn pooled_bytes(&self) -> usize {
        self.lock().pooled_bytes
    }

    /// Number of idle allocations.
    #[must_use]
    pub fn pooled_count(&self) -> usize {
        self.lock().free.values().map(Vec::len).sum()
    }

    /// Drop every idle allocation.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.free.clear();
        state.order.clear();
        state.pooled_bytes = 0;
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BufferPool")
            .field("config", &self.config)
            .field("pooled_bytes", &state.pooled_bytes)
            .field("stats", &state.stats)
            .finish_non_exhaustive()
    }
}
