//! Lock-free single-producer single-consumer byte ring buffer.
//!
//! This is the hand-off point between a driver callback and a bridge worker.
//! Cursors are monotonic and wrap through a power-of-two capacity mask; the
//! producer publishes bytes with a Release store of the write cursor and the
//! consumer acknowledges with a Release store of the read cursor, so each
//! side only ever observes fully committed data.
//!
//! Regions are claimed before copying and cursors advanced after, which lets
//! a driver copy a whole hardware period (possibly across the wrap point via
//! [`RingWriter::write_regions`]) and publish it with a single advance.

// unsafe_code is denied crate-wide in Cargo.toml; this module overrides it
// for region construction only.
#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::AudioIoError;

struct RingShared {
    data: Box<[UnsafeCell<u8>]>,
    capacity: usize,
    mask: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

// SAFETY: the cells are only ever mutated through the single RingWriter and
// read through the single RingReader, and the cursor protocol keeps their
// byte ranges disjoint. Cursor atomics are Sync by themselves.
unsafe impl Send for RingShared {}
unsafe impl Sync for RingShared {}

impl RingShared {
    fn fill(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    fn free(&self) -> usize {
        self.capacity - self.fill()
    }

    /// Pointer to the byte at `index & mask`, valid for `len` contiguous
    /// bytes. Caller guarantees `len` stays inside the allocation and the
    /// range is exclusively theirs under the SPSC contract.
    fn span_ptr(&self, index: usize) -> *mut u8 {
        self.data[index & self.mask].get()
    }
}

/// A fixed-capacity SPSC byte buffer, created once per stream direction.
///
/// Split into a [`RingWriter`] and [`RingReader`] before use; the halves are
/// the producer's and consumer's exclusive handles. Requested capacity is
/// rounded up to the next power of two.
pub struct RingBuffer {
    shared: Arc<RingShared>,
}

impl RingBuffer {
    /// Allocates a ring holding at least `capacity_bytes`.
    ///
    /// Fails with [`AudioIoError::OutOfMemory`] instead of aborting when the
    /// allocation cannot be satisfied.
    pub fn with_capacity(capacity_bytes: usize) -> Result<Self, AudioIoError> {
        let capacity = capacity_bytes.max(1).next_power_of_two();
        let mut data: Vec<UnsafeCell<u8>> = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| AudioIoError::OutOfMemory {
                requested: capacity,
            })?;
        data.resize_with(capacity, || UnsafeCell::new(0));
        Ok(Self {
            shared: Arc::new(RingShared {
                data: data.into_boxed_slice(),
                capacity,
                mask: capacity - 1,
                write_pos: AtomicUsize::new(0),
                read_pos: AtomicUsize::new(0),
            }),
        })
    }

    /// Actual capacity in bytes after rounding.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Splits into the producer and consumer halves.
    #[must_use]
    pub fn split(self) -> (RingWriter, RingReader) {
        (
            RingWriter {
                shared: self.shared.clone(),
            },
            RingReader {
                shared: self.shared,
            },
        )
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.shared.capacity)
            .field("fill", &self.shared.fill())
            .finish()
    }
}

/// The producer half of a [`RingBuffer`].
pub struct RingWriter {
    shared: Arc<RingShared>,
}

impl RingWriter {
    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn fill_count(&self) -> usize {
        self.shared.fill()
    }

    /// Bytes of free space.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.shared.free()
    }

    /// The contiguous free span starting at the write cursor.
    ///
    /// May be shorter than [`free_count`](Self::free_count) when the free
    /// space wraps; [`write_regions`](Self::write_regions) exposes both
    /// spans. Bytes become visible to the reader only after
    /// [`advance_write`](Self::advance_write).
    pub fn write_region(&mut self) -> &mut [u8] {
        self.write_regions().0
    }

    /// Both free spans: the run up to the buffer edge, then the wrapped run.
    ///
    /// The second slice is empty when the free space does not wrap. Together
    /// they cover exactly [`free_count`](Self::free_count) bytes.
    pub fn write_regions(&mut self) -> (&mut [u8], &mut [u8]) {
        let shared = &*self.shared;
        let write = shared.write_pos.load(Ordering::Acquire);
        let read = shared.read_pos.load(Ordering::Acquire);
        let free = shared.capacity - write.wrapping_sub(read);
        let index = write & shared.mask;
        let first_len = free.min(shared.capacity - index);
        let second_len = free - first_len;
        // SAFETY: both spans lie inside the one live allocation, cover only
        // free bytes (exclusively the producer's under the SPSC contract),
        // don't overlap each other, and `&mut self` prevents a second live
        // claim from this half.
        unsafe {
            (
                std::slice::from_raw_parts_mut(shared.span_ptr(index), first_len),
                std::slice::from_raw_parts_mut(shared.span_ptr(0), second_len),
            )
        }
    }

    /// Publishes `n` bytes previously copied into claimed regions.
    ///
    /// `n` must not exceed the free count observed by the matching region
    /// call.
    pub fn advance_write(&mut self, n: usize) {
        debug_assert!(n <= self.shared.free(), "advance_write past claimed region");
        let write = self.shared.write_pos.load(Ordering::Acquire);
        self.shared
            .write_pos
            .store(write.wrapping_add(n), Ordering::Release);
    }
}

impl fmt::Debug for RingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingWriter")
            .field("capacity", &self.shared.capacity)
            .field("free", &self.shared.free())
            .finish()
    }
}

/// The consumer half of a [`RingBuffer`].
pub struct RingReader {
    shared: Arc<RingShared>,
}

impl RingReader {
    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Bytes currently buffered.
    #[must_use]
    pub fn fill_count(&self) -> usize {
        self.shared.fill()
    }

    /// Bytes of free space.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.shared.free()
    }

    /// The contiguous buffered span starting at the read cursor.
    ///
    /// May be shorter than [`fill_count`](Self::fill_count) when the
    /// buffered data wraps; [`read_regions`](Self::read_regions) exposes
    /// both spans.
    pub fn read_region(&mut self) -> &[u8] {
        self.read_regions().0
    }

    /// Both buffered spans: the run up to the buffer edge, then the wrapped
    /// run. The second slice is empty when the data does not wrap.
    pub fn read_regions(&mut self) -> (&[u8], &[u8]) {
        let shared = &*self.shared;
        let write = shared.write_pos.load(Ordering::Acquire);
        let read = shared.read_pos.load(Ordering::Acquire);
        let fill = write.wrapping_sub(read);
        let index = read & shared.mask;
        let first_len = fill.min(shared.capacity - index);
        let second_len = fill - first_len;
        // SAFETY: both spans cover only committed bytes (exclusively the
        // consumer's until advance_read), lie inside the allocation, and the
        // Acquire load of write_pos ordered them after the producer's copy.
        unsafe {
            (
                std::slice::from_raw_parts(shared.span_ptr(index), first_len),
                std::slice::from_raw_parts(shared.span_ptr(0), second_len),
            )
        }
    }

    /// Releases `n` consumed bytes back to the producer.
    ///
    /// `n` must not exceed the fill count observed by the matching region
    /// call.
    pub fn advance_read(&mut self, n: usize) {
        debug_assert!(n <= self.shared.fill(), "advance_read past claimed region");
        let read = self.shared.read_pos.load(Ordering::Acquire);
        self.shared
            .read_pos
            .store(read.wrapping_add(n), Ordering::Release);
    }

    /// Discards everything currently buffered.
    ///
    /// Consumer-side only: it jumps the read cursor to the observed write
    /// cursor, never touching bytes the producer may be claiming.
    pub fn clear(&mut self) {
        let write = self.shared.write_pos.load(Ordering::Acquire);
        self.shared.read_pos.store(write, Ordering::Release);
    }
}

impl fmt::Debug for RingReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingReader")
            .field("capacity", &self.shared.capacity)
            .field("fill", &self.shared.fill())
            .finish()
    }
}
