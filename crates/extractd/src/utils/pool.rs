//! Fixed-size buffer pool for in-memory ingestion.
//!
//! Every buffer handed out by a [`BufferPool`] is exactly `elem_size` bytes long.
//! Buffers are backed by anonymous memory mappings where the platform allows it,
//! keeping large payloads off the allocator heap; if mapping fails the pool falls
//! back to an ordinary heap allocation of the same size and reports the failure
//! to the caller for logging.
//!
//! The pool never blocks. `get` either pops a ready buffer or allocates a new one,
//! and `put` either queues the buffer for reuse or releases it when the ready
//! queue is full. Callers are responsible for throttling.
//!
//! # Example
//!
//! ```rust
//! use extractd::utils::pool::BufferPool;
//!
//! let pool = BufferPool::new(2, 4096);
//! let (mut buffer, err) = pool.get();
//! assert!(err.is_none() || !buffer.is_mapped());
//! buffer[0] = 1;
//! assert_eq!(buffer.len(), 4096);
//! pool.put(buffer);
//! assert_eq!(pool.ready(), 1);
//! ```

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Allocation failure reported alongside a heap-backed fallback buffer.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("anonymous mapping of {size} bytes failed: {source}")]
    MapFailed {
        size: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Bounded pool of fixed-size buffers.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    ready: Mutex<Vec<Region>>,
    capacity: usize,
    elem_size: usize,
    outstanding: AtomicUsize,
}

impl BufferPool {
    /// Create a pool holding at most `capacity` idle buffers of `elem_size` bytes.
    pub fn new(capacity: usize, elem_size: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                ready: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
                elem_size: elem_size.max(1),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Check out a buffer of exactly `elem_size` bytes.
    ///
    /// The error, when present, only describes a failed off-heap allocation; the
    /// returned buffer is still valid and heap-backed.
    pub fn get(&self) -> (PooledBuffer, Option<PoolError>) {
        let reused = self.inner.ready.lock().pop();
        let (region, error) = match reused {
            Some(region) => (region, None),
            None => Region::allocate(self.inner.elem_size),
        };

        let outstanding = self.inner.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        if outstanding > self.inner.capacity {
            tracing::warn!(
                outstanding,
                capacity = self.inner.capacity,
                "buffer pool outstanding count exceeds capacity, buffers may be leaking"
            );
        }

        (
            PooledBuffer {
                region: Some(region),
                pool: Arc::clone(&self.inner),
            },
            error,
        )
    }

    /// Return a buffer. It is queued for reuse if there is room, otherwise released.
    pub fn put(&self, buffer: PooledBuffer) {
        drop(buffer);
    }

    /// Release every idle buffer.
    pub fn free(&self) {
        let drained: Vec<Region> = std::mem::take(&mut *self.inner.ready.lock());
        tracing::debug!(released = drained.len(), "freed idle pool buffers");
    }

    pub fn elem_size(&self) -> usize {
        self.inner.elem_size
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Idle buffers waiting for reuse.
    pub fn ready(&self) -> usize {
        self.inner.ready.lock().len()
    }

    /// Buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.inner.capacity)
            .field("elem_size", &self.inner.elem_size)
            .field("ready", &self.ready())
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

impl PoolInner {
    fn recycle(&self, region: Region) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if region.len() != self.elem_size {
            return;
        }
        let mut ready = self.ready.lock();
        if ready.len() < self.capacity {
            ready.push(region);
        }
    }
}

/// A checked-out buffer. Dropping it returns it to the pool it came from.
pub struct PooledBuffer {
    region: Option<Region>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Whether the buffer lives in an anonymous mapping rather than on the heap.
    pub fn is_mapped(&self) -> bool {
        matches!(self.region, Some(Region::Mapped(_)))
    }
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.region {
            Some(region) => region.as_slice(),
            None => &[],
        }
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.region {
            Some(region) => region.as_mut_slice(),
            None => &mut [],
        }
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            self.pool.recycle(region);
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

enum Region {
    Mapped(mapping::Mapping),
    Heap(Box<[u8]>),
}

impl Region {
    fn allocate(size: usize) -> (Self, Option<PoolError>) {
        match mapping::Mapping::new(size) {
            Ok(mapping) => (Region::Mapped(mapping), None),
            Err(source) => (
                Region::Heap(vec![0u8; size].into_boxed_slice()),
                Some(PoolError::MapFailed { size, source }),
            ),
        }
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            Region::Mapped(mapping) => mapping.as_slice(),
            Region::Heap(bytes) => bytes,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Region::Mapped(mapping) => mapping.as_mut_slice(),
            Region::Heap(bytes) => bytes,
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
mod mapping {
    use std::ptr::NonNull;

    /// Private anonymous read/write mapping, unmapped on drop.
    pub(super) struct Mapping {
        ptr: NonNull<u8>,
        len: usize,
    }

    // The mapping is exclusively owned; access goes through &self / &mut self.
    unsafe impl Send for Mapping {}
    unsafe impl Sync for Mapping {}

    impl Mapping {
        pub(super) fn new(len: usize) -> std::io::Result<Self> {
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(std::io::Error::last_os_error());
            }
            NonNull::new(ptr.cast::<u8>())
                .map(|ptr| Self { ptr, len })
                .ok_or_else(|| std::io::Error::other("mmap returned a null pointer"))
        }

        pub(super) fn as_slice(&self) -> &[u8] {
            unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
        }

        pub(super) fn as_mut_slice(&mut self) -> &mut [u8] {
            unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
        }
    }

    impl Drop for Mapping {
        fn drop(&mut self) {
            let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
            if rc != 0 {
                tracing::warn!(
                    len = self.len,
                    error = %std::io::Error::last_os_error(),
                    "munmap failed"
                );
            }
        }
    }
}

#[cfg(not(unix))]
mod mapping {
    pub(super) struct Mapping(Box<[u8]>);

    impl Mapping {
        pub(super) fn new(_len: usize) -> std::io::Result<Self> {
            Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "anonymous mappings are not available on this platform",
            ))
        }

        pub(super) fn as_slice(&self) -> &[u8] {
            &self.0
        }

        pub(super) fn as_mut_slice(&mut self) -> &mut [u8] {
            &mut self.0
        }
    }
}
