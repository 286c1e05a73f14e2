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

/// Generate a stream of zeroes.
///
/// # Inputs
///
/// No inputs
///
/// # Outputs
///
/// `out`: Output
///
/// # Usage
/// ```
/// use sdrflow::blocks::NullSource;
/// use sdrflow::runtime::Flowgraph;
///
/// let mut fg = Flowgraph::new();
///
/// let source = fg.add_block(NullSource::<f32>::new());
/// ```
pub struct NullSource<T: Send + 'static> {
    _type: PhantomData<T>,
}

impl<T: Send + 'static> NullSource<T> {
    /// Create Null Source block
    pub fn new() -> Block {
        Block::new(
            BlockMetaBuilder::new("NullSource").build(),
            StreamIoBuilder::new()
                .add_output("out", mem::size_of::<T>())
                .build(),
            MessageIoBuilder::new().build(),
            NullSource::<T> { _type: PhantomData },
        )
    }
}

#[doc(hidden)]
impl<T: Send + 'static> Kernel for NullSource<T> {
    fn work(
        &mut self,
        _io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let item_size = mem::size_of::<T>().max(1);
        let o = sio.output(0).bytes();
        let n = o.len() / item_size;
        o[..n * item_size].fill(0);
        sio.output(0).produce(n);

        Ok(())
    }
}
