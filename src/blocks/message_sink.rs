use crate::anyhow::Result;
use crate::runtime::Block;
use crate::runtime::BlockMeta;
use crate::runtime::BlockMetaBuilder;
use crate::runtime::Kernel;
use crate::runtime::MessageIo;
use crate::runtime::MessageIoBuilder;
use crate::runtime::Pmt;
use crate::runtime::StreamIoBuilder;
use crate::runtime::WorkIo;

/// Store all messages that arrive on the `in` message input.
pub struct MessageSink {
    received: Vec<Pmt>,
}

impl MessageSink {
    /// Create MessageSink block
    pub fn new() -> Block {
        Block::new(
            BlockMetaBuilder::new("MessageSink").build(),
            StreamIoBuilder::new().build(),
            MessageIoBuilder::new().add_input("in").build(),
            MessageSink {
                received: Vec::new(),
            },
        )
    }

    /// Messages received so far
    pub fn received(&self) -> &[Pmt] {
        &self.received
    }
}

#[doc(hidden)]
impl Kernel for MessageSink {
    fn handle(
        &mut self,
        _io: &mut WorkIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
        _port: usize,
        p: Pmt,
    ) -> Result<()> {
        self.received.push(p);
        Ok(())
    }

    fn deinit(&mut self, _mio: &mut MessageIo, _meta: &mut BlockMeta) -> Result<()> {
        debug!("n_received: {}", self.received.len());
        Ok(())
    }
}
