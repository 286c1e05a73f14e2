use std::cmp;

use crate::anyhow::Result;
use crate::runtime::Block;
use crate::runtime::BlockMeta;
use crate::runtime::BlockMetaBuilder;
use crate::runtime::Kernel;
use crate::runtime::MessageIo;
use crate::runtime::MessageIoBuilder;
use crate::runtime::StreamIo;
use crate::runtime::StreamIoBuilder;
use crate::runtime::WorkIo;

/// Stream samples from vector.
///
/// Once all items are sent, the block stays finished, also when the flowgraph is started again.
///
/// # Outputs
///
/// `out`: Items of the vector
pub struct VectorSource<T: Copy + Send + 'static> {
    items: Vec<T>,
    n_copied: usize,
}

impl<T: Copy + Send + 'static> VectorSource<T> {
    /// Create VectorSource block
    pub fn new(items: Vec<T>) -> Block {
        Block::new(
            BlockMetaBuilder::new("VectorSource").build(),
            StreamIoBuilder::new()
                .add_output("out", std::mem::size_of::<T>())
                .build(),
            MessageIoBuilder::new().build(),
            VectorSource { items, n_copied: 0 },
        )
    }

    /// Number of items sent so far.
    pub fn n_copied(&self) -> usize {
        self.n_copied
    }
}

#[doc(hidden)]
impl<T: Copy + Send + 'static> Kernel for VectorSource<T> {
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let out = sio.output(0).slice::<T>();
        let n = cmp::min(out.len(), self.items.len() - self.n_copied);

        if n > 0 {
            out[..n].copy_from_slice(&self.items[self.n_copied..self.n_copied + n]);
            self.n_copied += n;
            sio.output(0).produce(n);
        }

        if self.n_copied == self.items.len() {
            io.finished = true;
        }

        Ok(())
    }
}
