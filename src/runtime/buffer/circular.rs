use slab::Slab;
use std::fmt;
use std::ptr;
use std::slice;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::runtime::AllocationCounters;
use crate::runtime::BlockId;
use crate::runtime::Error;
use crate::runtime::allocations::Allocation;
use crate::runtime::allocations::Resource;
use crate::runtime::scheduler::Notify;

const CHUNK: usize = 64;

#[derive(Clone, Copy)]
#[repr(C, align(64))]
struct Chunk([u8; CHUNK]);

struct Cursor {
    read: u64,
    attached: bool,
    target: (BlockId, usize),
    notify: Option<Notify>,
}

struct State {
    written: u64,
    done: bool,
    readers: Slab<Cursor>,
    writer_notify: Option<Notify>,
}

impl State {
    fn min_read(&self) -> Option<u64> {
        self.readers
            .iter()
            .filter(|(_, c)| c.attached)
            .map(|(_, c)| c.read)
            .min()
    }

    fn notify_readers(&self) -> Vec<Notify> {
        self.readers
            .iter()
            .filter_map(|(_, c)| c.notify.clone())
            .collect()
    }
}

struct Shared {
    data: *mut u8,
    storage: *mut [Chunk],
    item_size: usize,
    capacity: usize,
    state: Mutex<State>,
    _allocation: Allocation,
}

// SAFETY: `data` is only written by the single `BufferWriter`, and only in the region that is
// not readable by any attached reader. Cursor updates that publish or release a region are
// serialized through `state`.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn space(&self, state: &State) -> usize {
        match state.min_read() {
            Some(r) => self.capacity - (state.written - r) as usize,
            None => self.capacity,
        }
    }

    /// Copy freshly written items to the other half, so both halves stay identical.
    fn mirror(&self, offset: usize, n: usize) {
        let len = self.capacity * self.item_size;
        let start = offset * self.item_size;
        let end = (offset + n) * self.item_size;
        // SAFETY: `start..end` lies inside the `2 * len` bytes of storage, and the mirrored
        // region addresses the same items modulo the capacity, which are free for the writer.
        unsafe {
            if start < len {
                let e = end.min(len);
                ptr::copy_nonoverlapping(
                    self.data.add(start),
                    self.data.add(start + len),
                    e - start,
                );
            }
            if end > len {
                let s = start.max(len);
                ptr::copy_nonoverlapping(self.data.add(s), self.data.add(s - len), end - s);
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // SAFETY: `storage` was created by `Box::into_raw` in `BufferWriter::new` and is only
        // released here.
        unsafe { drop(Box::from_raw(self.storage)) };
    }
}

/// Writing end of a circular stream buffer.
///
/// The storage holds the ring twice in a row, so that the free region of the writer and the
/// readable region of every reader are always one contiguous slice. Each reader keeps its own
/// cursor; the writer can only overwrite items that every attached reader has consumed.
pub struct BufferWriter {
    shared: Arc<Shared>,
}

impl BufferWriter {
    pub(crate) fn new(
        item_size: usize,
        capacity: usize,
        port: &str,
        counters: &AllocationCounters,
    ) -> Result<BufferWriter, Error> {
        let item_size = item_size.max(1);
        let capacity = capacity.max(1);
        let alloc_error = |bytes| Error::BufferAllocation {
            port: port.to_string(),
            bytes,
        };

        let bytes = item_size
            .checked_mul(capacity)
            .and_then(|b| b.checked_mul(2))
            .ok_or_else(|| alloc_error(usize::MAX))?;
        let n_chunks = bytes.div_ceil(CHUNK);

        let mut chunks: Vec<Chunk> = Vec::new();
        chunks
            .try_reserve_exact(n_chunks)
            .map_err(|_| alloc_error(bytes))?;
        chunks.resize(n_chunks, Chunk([0; CHUNK]));
        let storage = Box::into_raw(chunks.into_boxed_slice());

        debug!(
            "allocated buffer for {} ({} items of {} bytes)",
            port, capacity, item_size
        );

        Ok(BufferWriter {
            shared: Arc::new(Shared {
                data: storage.cast::<u8>(),
                storage,
                item_size,
                capacity,
                state: Mutex::new(State {
                    written: 0,
                    done: false,
                    readers: Slab::new(),
                    writer_notify: None,
                }),
                _allocation: counters.track(Resource::Buffer),
            }),
        })
    }

    /// Add a reader that starts at the current write position.
    pub(crate) fn add_reader(
        &self,
        target: (BlockId, usize),
        counters: &AllocationCounters,
    ) -> BufferReader {
        let mut state = self.shared.lock();
        let read = state.written;
        let key = state.readers.insert(Cursor {
            read,
            attached: true,
            target,
            notify: None,
        });
        BufferReader {
            shared: self.shared.clone(),
            key,
            _allocation: counters.track(Resource::BufferReader),
        }
    }

    /// Capacity in items.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Item size in bytes.
    pub fn item_size(&self) -> usize {
        self.shared.item_size
    }

    /// Items that can be written without overwriting unread data.
    pub fn available_space(&self) -> usize {
        let state = self.shared.lock();
        self.shared.space(&state)
    }

    /// The free region as bytes.
    pub fn slice_bytes(&mut self) -> &mut [u8] {
        let (offset, space) = {
            let state = self.shared.lock();
            (
                (state.written % self.shared.capacity as u64) as usize,
                self.shared.space(&state),
            )
        };
        // SAFETY: the region is not readable by any attached reader and `&mut self` makes
        // this the only writable view.
        unsafe {
            slice::from_raw_parts_mut(
                self.shared.data.add(offset * self.shared.item_size),
                space * self.shared.item_size,
            )
        }
    }

    /// Commit `n` items. Returns `0` without writing if there is not enough space.
    pub fn write(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let notify = {
            let mut state = self.shared.lock();
            if self.shared.space(&state) < n {
                return 0;
            }
            let offset = (state.written % self.shared.capacity as u64) as usize;
            self.shared.mirror(offset, n);
            state.written += n as u64;
            state.notify_readers()
        };
        for n in notify {
            n.notify();
        }
        n
    }

    /// Signal end of stream to all readers.
    pub fn finish(&self) {
        let notify = {
            let mut state = self.shared.lock();
            state.done = true;
            state.notify_readers()
        };
        for n in notify {
            n.notify();
        }
    }

    /// Whether [`finish`](Self::finish) was called.
    pub fn finished(&self) -> bool {
        self.shared.lock().done
    }

    /// Clear the end-of-stream flag and re-attach detached readers at the write position.
    pub(crate) fn reset(&self) {
        let mut state = self.shared.lock();
        state.done = false;
        let written = state.written;
        for (_, c) in state.readers.iter_mut() {
            if !c.attached {
                c.attached = true;
                c.read = written;
            }
        }
    }

    /// Whether at least one reader still consumes data.
    pub fn has_attached_readers(&self) -> bool {
        self.shared.lock().readers.iter().any(|(_, c)| c.attached)
    }

    /// Number of readers.
    pub fn n_readers(&self) -> usize {
        self.shared.lock().readers.len()
    }

    /// Input ports served by this buffer.
    pub(crate) fn targets(&self) -> Vec<(BlockId, usize)> {
        self.shared
            .lock()
            .readers
            .iter()
            .map(|(_, c)| c.target)
            .collect()
    }

    /// Whether `reader` reads from this buffer.
    pub fn is_source_of(&self, reader: &BufferReader) -> bool {
        Arc::ptr_eq(&self.shared, &reader.shared)
    }

    pub(crate) fn set_notify(&self, notify: Notify) {
        self.shared.lock().writer_notify = Some(notify);
    }
}

impl fmt::Debug for BufferWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BufferWriter")
            .field("item_size", &self.shared.item_size)
            .field("capacity", &self.shared.capacity)
            .field("written", &state.written)
            .field("readers", &state.readers.len())
            .field("done", &state.done)
            .finish()
    }
}

/// Reading end of a circular stream buffer.
pub struct BufferReader {
    shared: Arc<Shared>,
    key: usize,
    _allocation: Allocation,
}

impl BufferReader {
    /// Items that can be read.
    pub fn available_data(&self) -> usize {
        let state = self.shared.lock();
        let c = &state.readers[self.key];
        if c.attached {
            (state.written - c.read) as usize
        } else {
            0
        }
    }

    /// The readable region as bytes. Empty once the reader is detached.
    pub fn slice_bytes(&self) -> &[u8] {
        let (offset, n) = {
            let state = self.shared.lock();
            let c = &state.readers[self.key];
            if !c.attached {
                return &[];
            }
            (
                (c.read % self.shared.capacity as u64) as usize,
                (state.written - c.read) as usize,
            )
        };
        // SAFETY: the writer does not touch `[read, written)` while this reader is attached.
        unsafe {
            slice::from_raw_parts(
                self.shared.data.add(offset * self.shared.item_size),
                n * self.shared.item_size,
            )
        }
    }

    /// Consume `n` items. Returns `0` without consuming if fewer are available.
    pub fn read(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        let notify = {
            let mut state = self.shared.lock();
            let written = state.written;
            let c = &mut state.readers[self.key];
            if !c.attached || written - c.read < n as u64 {
                return 0;
            }
            c.read += n as u64;
            state.writer_notify.clone()
        };
        if let Some(n) = notify {
            n.notify();
        }
        n
    }

    /// The writer finished and all data has been consumed.
    pub fn finished(&self) -> bool {
        let state = self.shared.lock();
        state.done && state.written == state.readers[self.key].read
    }

    /// The writer finished. There might still be data to consume.
    pub fn writer_done(&self) -> bool {
        self.shared.lock().done
    }

    /// Stop constraining the writer. Used when the reading block finished.
    pub(crate) fn detach(&self) {
        let notify = {
            let mut state = self.shared.lock();
            state.readers[self.key].attached = false;
            state.writer_notify.clone()
        };
        if let Some(n) = notify {
            n.notify();
        }
    }

    /// Re-attach a detached reader at the current write position.
    pub(crate) fn reattach(&self) {
        let mut state = self.shared.lock();
        let written = state.written;
        let c = &mut state.readers[self.key];
        if !c.attached {
            c.attached = true;
            c.read = written;
        }
    }

    /// Whether this reader still constrains the writer.
    pub fn is_attached(&self) -> bool {
        self.shared.lock().readers[self.key].attached
    }

    pub(crate) fn set_notify(&self, notify: Notify) {
        self.shared.lock().readers[self.key].notify = Some(notify);
    }

    /// Capacity of the underlying buffer in items.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl Drop for BufferReader {
    fn drop(&mut self) {
        let notify = {
            let mut state = self.shared.lock();
            state.readers.try_remove(self.key);
            state.writer_notify.clone()
        };
        if let Some(n) = notify {
            n.notify();
        }
    }
}

impl fmt::Debug for BufferReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        let c = &state.readers[self.key];
        f.debug_struct("BufferReader")
            .field("target", &c.target)
            .field("read", &c.read)
            .field("written", &state.written)
            .field("attached", &c.attached)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters() -> AllocationCounters {
        AllocationCounters::new()
    }

    fn write_u32(w: &mut BufferWriter, items: &[u32]) -> usize {
        let bytes = w.slice_bytes();
        for (i, v) in items.iter().enumerate() {
            bytes[i * 4..(i + 1) * 4].copy_from_slice(&v.to_ne_bytes());
        }
        w.write(items.len())
    }

    fn read_u32(r: &BufferReader) -> Vec<u32> {
        r.slice_bytes()
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn wraps_around_contiguously() {
        let c = counters();
        let mut w = BufferWriter::new(4, 8, "test.out", &c).unwrap();
        let mut r = w.add_reader((BlockId(1), 0), &c);

        assert_eq!(write_u32(&mut w, &[0, 1, 2, 3, 4, 5]), 6);
        assert_eq!(r.read(5), 5);
        assert_eq!(w.available_space(), 7);

        // crosses the end of the ring
        assert_eq!(write_u32(&mut w, &[6, 7, 8, 9, 10, 11]), 6);
        assert_eq!(read_u32(&r), vec![5, 6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn slowest_reader_limits_space() {
        let c = counters();
        let mut w = BufferWriter::new(4, 4, "test.out", &c).unwrap();
        let mut fast = w.add_reader((BlockId(1), 0), &c);
        let slow = w.add_reader((BlockId(2), 0), &c);

        assert_eq!(write_u32(&mut w, &[1, 2, 3, 4]), 4);
        assert_eq!(fast.read(4), 4);
        assert_eq!(w.available_space(), 0);
        assert_eq!(w.write(1), 0);

        slow.detach();
        assert_eq!(w.available_space(), 4);
        assert!(slow.slice_bytes().is_empty());
    }

    #[test]
    fn reader_at_write_position() {
        let c = counters();
        let mut w = BufferWriter::new(4, 4, "test.out", &c).unwrap();
        write_u32(&mut w, &[1, 2]);
        let mut r = w.add_reader((BlockId(1), 0), &c);
        assert_eq!(r.available_data(), 0);
        assert_eq!(r.read(1), 0);
        write_u32(&mut w, &[3]);
        assert_eq!(read_u32(&r), vec![3]);
    }

    #[test]
    fn finish_after_drain() {
        let c = counters();
        let mut w = BufferWriter::new(4, 4, "test.out", &c).unwrap();
        let mut r = w.add_reader((BlockId(1), 0), &c);
        write_u32(&mut w, &[7]);
        w.finish();
        assert!(r.writer_done());
        assert!(!r.finished());
        assert_eq!(r.read(2), 0);
        assert_eq!(r.read(1), 1);
        assert!(r.finished());
    }

    #[test]
    fn accounting() {
        let c = counters();
        let w = BufferWriter::new(8, 16, "test.out", &c).unwrap();
        let r1 = w.add_reader((BlockId(1), 0), &c);
        let r2 = w.add_reader((BlockId(2), 0), &c);
        assert_eq!(c.snapshot().as_tuple(), (0, 0, 1, 2));
        assert_eq!(w.n_readers(), 2);

        drop(r1);
        assert_eq!(w.n_readers(), 1);
        drop(w);
        // the reader keeps the storage alive
        assert_eq!(c.snapshot().as_tuple(), (0, 0, 1, 1));
        drop(r2);
        assert_eq!(c.snapshot().as_tuple(), (0, 0, 0, 0));
    }

    #[test]
    fn oversized_request_fails() {
        let c = counters();
        let e = BufferWriter::new(16, usize::MAX / 8, "big.out", &c).unwrap_err();
        assert!(matches!(e, Error::BufferAllocation { .. }));
        assert_eq!(c.buffer_ncurrently_allocated(), 0);
    }
}
