use std::cmp;
use std::marker::PhantomData;

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

/// Copies only a given number of samples and stops.
///
/// Terminating also detaches the block from its upstream, so an infinite source feeding a
/// [`Head`] finishes as well.
///
/// # Inputs
///
/// `in`: Input
///
/// # Outputs
///
/// `out`: Output
///
/// # Usage
/// ```
/// use sdrflow::blocks::Head;
/// use sdrflow::runtime::Flowgraph;
///
/// let mut fg = Flowgraph::new();
///
/// let head = fg.add_block(Head::<f32>::new(1_000_000));
/// ```
pub struct Head<T: Copy + Send + 'static> {
    n_items: u64,
    _type: PhantomData<T>,
}

impl<T: Copy + Send + 'static> Head<T> {
    /// Create Head block
    pub fn new(n_items: u64) -> Block {
        Block::new(
            BlockMetaBuilder::new("Head").build(),
            StreamIoBuilder::new()
                .add_input("in", std::mem::size_of::<T>())
                .add_output("out", std::mem::size_of::<T>())
                .build(),
            MessageIoBuilder::new().build(),
            Head::<T> {
                n_items,
                _type: PhantomData,
            },
        )
    }
}

#[doc(hidden)]
impl<T: Copy + Send + 'static> Kernel for Head<T> {
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        if self.n_items == 0 {
            io.finished = true;
            return Ok(());
        }

        let (inputs, outputs) = sio.split();
        let i = inputs[0].slice::<T>();
        let o = outputs[0].slice::<T>();

        let m = cmp::min(self.n_items as usize, cmp::min(i.len(), o.len()));
        if m > 0 {
            o[..m].copy_from_slice(&i[..m]);
            self.n_items -= m as u64;
            inputs[0].consume(m);
            outputs[0].produce(m);
        }

        if self.n_items == 0 || inputs[0].finished() {
            io.finished = true;
        }

        Ok(())
    }
}
