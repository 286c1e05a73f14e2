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

/// Apply a function to each sample.
///
/// # Stream Inputs
///
/// `in`: Input
///
/// # Stream Outputs
///
/// `out`: Output, corresponding to input with function applied
///
/// # Usage
/// ```
/// use sdrflow::blocks::Apply;
/// use sdrflow::runtime::Flowgraph;
///
/// let mut fg = Flowgraph::new();
///
/// // Double each sample
/// let doubler = fg.add_block(Apply::new(|i: &f32| i * 2.0));
///
/// // Note that the closure can also hold state
/// let mut last_value = 0.0;
/// let moving_average = fg.add_block(Apply::new(move |i: &f32| {
///     let new_value = (last_value + i) / 2.0;
///     last_value = *i;
///     new_value
/// }));
///
/// // Additionally, the closure can change the type of the sample
/// let to_int = fg.add_block(Apply::new(|i: &f32| *i as u32));
/// ```
pub struct Apply<A, B>
where
    A: Copy + Send + 'static,
    B: Copy + Send + 'static,
{
    f: Box<dyn FnMut(&A) -> B + Send + 'static>,
}

impl<A, B> Apply<A, B>
where
    A: Copy + Send + 'static,
    B: Copy + Send + 'static,
{
    /// Create [`Apply`] block
    ///
    /// ## Parameter
    /// - `f`: Function to apply on each sample
    pub fn new(f: impl FnMut(&A) -> B + Send + 'static) -> Block {
        Block::new(
            BlockMetaBuilder::new("Apply").build(),
            StreamIoBuilder::new()
                .add_input("in", std::mem::size_of::<A>())
                .add_output("out", std::mem::size_of::<B>())
                .build(),
            MessageIoBuilder::new().build(),
            Apply { f: Box::new(f) },
        )
    }
}

#[doc(hidden)]
impl<A, B> Kernel for Apply<A, B>
where
    A: Copy + Send + 'static,
    B: Copy + Send + 'static,
{
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        let (inputs, outputs) = sio.split();
        let i = inputs[0].slice::<A>();
        let o = outputs[0].slice::<B>();
        let i_len = i.len();

        let m = cmp::min(i_len, o.len());
        if m > 0 {
            for (v, r) in i.iter().zip(o.iter_mut()) {
                *r = (self.f)(v);
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
