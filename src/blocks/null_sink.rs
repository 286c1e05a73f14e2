use std::marker::PhantomData;
use std::mem;

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

/// Drop samples.
///
/// # Inputs
///
/// `in`: Stream to drop
///
/// # Outputs
///
/// No outputs
///
/// # Usage
/// ```
/// use sdrflow::blocks::NullSink;
/// use sdrflow::runtime::Flowgraph;
///
/// let mut fg = Flowgraph::new();
///
/// let sink = fg.add_block(NullSink::<f32>::new());
/// ```
pub struct NullSink<T: Send + 'static> {
    n_received: usize,
    _type: PhantomData<T>,
}

impl<T: Send + 'static> NullSink<T> {
    /// Create Null Sink block
    pub fn new() -> Block {
        Block::new(
            BlockMetaBuilder::new("NullSink").build(),
            StreamIoBuilder::new()
                .add_input("in", mem::size_of::<T>())
                .build(),
            MessageIoBuilder::new().build(),
            NullSink::<T> {
                n_received: 0,
                _type: PhantomData,
            },
        )
    }

    /// Number of items dropped so far.
    pub fn n_received(&self) -> usize {
        self.n_received
    }
}

#[doc(hidden)]
impl<T: Send + 'static> Kernel for NullSink<T> {
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let input = sio.input(0);
        let n = input.available();
        if n > 0 {
            self.n_received += n;
            input.consume(n);
        }

        if input.finished() {
            io.finished = true;
        }

        Ok(())
    }
}
