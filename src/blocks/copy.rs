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

/// Copy input samples to the output.
pub struct Copy<T: core::marker::Copy + Send + 'static> {
    _type: PhantomData<T>,
}

impl<T: core::marker::Copy + Send + 'static> Copy<T> {
    /// Create [`struct@Copy`] block
    pub fn new() -> Block {
        Block::new(
            BlockMetaBuilder::new("Copy").build(),
            StreamIoBuilder::new()
                .add_input("in", std::mem::size_of::<T>())
                .add_output("out", std::mem::size_of::<T>())
                .build(),
            MessageIoBuilder::new().build(),
            Copy::<T> { _type: PhantomData },
        )
    }
}

#[doc(hidden)]
impl<T: core::marker::Copy + Send + 'static> Kernel for Copy<T> {
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let (inputs, outputs) = sio.split();
        let i = inputs[0].slice::<T>();
        let o = outputs[0].slice::<T>();
        let i_len = i.len();

        let m = cmp::min(i_len, o.len());
        if m > 0 {
            o[..m].copy_from_slice(&i[..m]);
            inputs[0].consume(m);
            outputs[0].produce(m);
        }

        if inputs[0].finished() && m == i_len {
            io.finished = true;
        }

        Ok(())
    }
}
