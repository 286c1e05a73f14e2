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

/// Consume everything, produce nothing.
///
/// All ports are optional, so a [`Nop`] can stand in for any block when testing graph
/// structure. It finishes once all connected inputs are finished, immediately if there are none.
///
/// # Inputs
///
/// `in0`, `in1`, ...: Inputs
///
/// # Outputs
///
/// `out0`, `out1`, ...: Outputs, never written
///
/// # Usage
/// ```
/// use sdrflow::blocks::Nop;
/// use sdrflow::runtime::Flowgraph;
///
/// let mut fg = Flowgraph::new();
/// let src = fg.add_block(Nop::new(4, 0, 1));
/// let snk = fg.add_block(Nop::new(4, 1, 0));
/// fg.connect(src, snk).unwrap();
/// ```
pub struct Nop {
    n_consumed: usize,
}

impl Nop {
    /// Create Nop block with `n_inputs` inputs and `n_outputs` outputs of `item_size` bytes
    pub fn new(item_size: usize, n_inputs: usize, n_outputs: usize) -> Block {
        let mut sio = StreamIoBuilder::new();
        for i in 0..n_inputs {
            sio = sio.add_optional_input(&format!("in{i}"), item_size);
        }
        for i in 0..n_outputs {
            sio = sio.add_optional_output(&format!("out{i}"), item_size);
        }
        Block::new(
            BlockMetaBuilder::new("Nop").build(),
            sio.build(),
            MessageIoBuilder::new().build(),
            Nop { n_consumed: 0 },
        )
    }

    /// Items consumed over all inputs.
    pub fn n_consumed(&self) -> usize {
        self.n_consumed
    }
}

#[doc(hidden)]
impl Kernel for Nop {
    fn work(
        &mut self,
        io: &mut WorkIo,
        sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> Result<()> {
        for input in sio.inputs_mut() {
            let n = input.available();
            input.consume(n);
            self.n_consumed += n;
        }

        if sio.inputs().iter().all(|i| i.finished()) {
            io.finished = true;
        }

        Ok(())
    }
}
