//! Stream Buffers
//!
//! Every connected stream output owns one [`BufferWriter`]. Each stream input connected to it
//! holds a [`BufferReader`] with an independent read cursor.
mod circular;

pub use circular::BufferReader;
pub use circular::BufferWriter;

/// Requested size of the buffer behind a stream output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferSize {
    /// Use the configured default, grown to what the connected ports need per call
    #[default]
    Default,
    /// Capacity in bytes
    Bytes(usize),
    /// Capacity in items
    Items(usize),
}

impl BufferSize {
    /// Capacity in items for the given item size.
    ///
    /// `Default` resolves to `default_bytes`, but never less than `required` items. Explicit
    /// sizes are taken as they are, so they can be rejected as too small.
    pub fn items(&self, item_size: usize, default_bytes: usize, required: usize) -> usize {
        let item_size = item_size.max(1);
        match self {
            BufferSize::Default => (default_bytes / item_size).max(required).max(1),
            BufferSize::Bytes(b) => b / item_size,
            BufferSize::Items(n) => *n,
        }
    }
}
