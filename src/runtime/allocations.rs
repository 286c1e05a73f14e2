use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

#[derive(Debug, Default)]
struct Counters {
    blocks: AtomicUsize,
    block_details: AtomicUsize,
    buffers: AtomicUsize,
    buffer_readers: AtomicUsize,
}

impl Counters {
    fn counter(&self, resource: Resource) -> &AtomicUsize {
        match resource {
            Resource::Block => &self.blocks,
            Resource::BlockDetail => &self.block_details,
            Resource::Buffer => &self.buffers,
            Resource::BufferReader => &self.buffer_readers,
        }
    }
}

/// Kinds of runtime resources that are accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resource {
    Block,
    BlockDetail,
    Buffer,
    BufferReader,
}

/// Live allocation counters of a [`Flowgraph`](crate::runtime::Flowgraph).
///
/// Every block owned by the flowgraph, every per-block scheduling detail, every stream buffer,
/// and every buffer reader holds a token that increments its counter on creation and decrements
/// it on drop. The handle is cheap to clone and outlives the flowgraph, so it can be used to
/// check that a complete construct/run/teardown cycle returns to the baseline.
#[derive(Clone, Default)]
pub struct AllocationCounters {
    inner: Arc<Counters>,
}

impl AllocationCounters {
    /// Create a fresh set of counters, all zero.
    pub fn new() -> AllocationCounters {
        AllocationCounters::default()
    }

    /// Blocks currently owned by the flowgraph.
    pub fn block_ncurrently_allocated(&self) -> usize {
        self.inner.blocks.load(Ordering::SeqCst)
    }

    /// Blocks that currently carry scheduling state (committed blocks).
    pub fn block_detail_ncurrently_allocated(&self) -> usize {
        self.inner.block_details.load(Ordering::SeqCst)
    }

    /// Stream buffers currently allocated.
    pub fn buffer_ncurrently_allocated(&self) -> usize {
        self.inner.buffers.load(Ordering::SeqCst)
    }

    /// Buffer read cursors currently allocated.
    pub fn buffer_reader_ncurrently_allocated(&self) -> usize {
        self.inner.buffer_readers.load(Ordering::SeqCst)
    }

    /// All four counters at once.
    pub fn snapshot(&self) -> Allocations {
        Allocations {
            blocks: self.block_ncurrently_allocated(),
            block_details: self.block_detail_ncurrently_allocated(),
            buffers: self.buffer_ncurrently_allocated(),
            buffer_readers: self.buffer_reader_ncurrently_allocated(),
        }
    }

    pub(crate) fn track(&self, resource: Resource) -> Allocation {
        self.inner.counter(resource).fetch_add(1, Ordering::SeqCst);
        Allocation {
            counters: self.inner.clone(),
            resource,
        }
    }
}

impl fmt::Debug for AllocationCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AllocationCounters")
            .field(&self.snapshot())
            .finish()
    }
}

/// Snapshot of [`AllocationCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Allocations {
    /// Blocks owned by the flowgraph
    pub blocks: usize,
    /// Blocks with scheduling state
    pub block_details: usize,
    /// Stream buffers
    pub buffers: usize,
    /// Buffer read cursors
    pub buffer_readers: usize,
}

impl Allocations {
    /// `(blocks, block_details, buffers, buffer_readers)`
    pub fn as_tuple(&self) -> (usize, usize, usize, usize) {
        (
            self.blocks,
            self.block_details,
            self.buffers,
            self.buffer_readers,
        )
    }
}

/// Accounting token, decrements its counter when dropped.
pub(crate) struct Allocation {
    counters: Arc<Counters>,
    resource: Resource,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.counters
            .counter(self.resource)
            .fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("resource", &self.resource)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_count_up_and_down() {
        let c = AllocationCounters::new();
        let a = c.track(Resource::Block);
        let b = c.track(Resource::Block);
        let r = c.track(Resource::BufferReader);
        assert_eq!(c.snapshot().as_tuple(), (2, 0, 0, 1));

        drop(a);
        drop(r);
        assert_eq!(c.snapshot().as_tuple(), (1, 0, 0, 0));

        let clone = c.clone();
        drop(b);
        assert_eq!(clone.block_ncurrently_allocated(), 0);
    }
}
