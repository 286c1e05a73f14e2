use std::cmp;
use std::ops::Add;

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

/// Add a constant to each sample.
///
/// # Inputs
///
/// `in`: Input
///
/// # Outputs
///
/// `out`: Input plus the constant
pub struct AddConst<D> {
    constant: D,
}

impl<D> AddConst<D>
where
    D: Copy + Send + 'static + Add<Output = D>,
{
    /// Create AddConst block
    pub fn new(constant: D) -> Block {
        let item_size = std::mem::size_of::<D>();
        Block::new(
            BlockMetaBuilder::new("AddConst").build(),
            StreamIoBuilder::new()
                .add_input("in", item_size)
                .add_output("out", item_size)
                .build(),
            MessageIoBuilder::new().build(),
            AddConst { constant },
        )
    }
}

#[doc(hidden)]
impl<D> Kernel for AddConst<D>
where
    D: Copy + Send + 'static + Add<Output = D>,
{
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let (inputs, outputs) = sio.split();
        let i = inputs[0].slice::<D>();
        let o = outputs[0].slice::<D>();
        let i_len = i.len();

        let m = cmp::min(i_len, o.len());
        if m > 0 {
            for (v, t) in i[..m].iter().zip(o.iter_mut()) {
                *t = *v + self.constant;
            }
            inputs[0].consume(m);
            outputs[0].produce(m);
        }

        if inputs[0].finished() && m == i_len {
            io.finished = true;
        }

        Ok(())
    }
}
