use crate::runtime::BlockMeta;
use crate::runtime::MessageIo;
use crate::runtime::Pmt;
use crate::runtime::StreamIo;
use crate::runtime::WorkIo;

/// Kernel
///
/// Central trait to implement a block. The runtime calls `work` whenever the block has enough
/// input data and output space, and `handle` for every message that arrives on a message input.
/// All callbacks of one block run on the thread of its partition, one at a time.
pub trait Kernel: Send {
    /// Processes stream data
    fn work(
        &mut self,
        _io: &mut WorkIo,
        _sio: &mut StreamIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle a message that arrived on message input `port`
    fn handle(
        &mut self,
        _io: &mut WorkIo,
        _mio: &mut MessageIo,
        _meta: &mut BlockMeta,
        _port: usize,
        _p: Pmt,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Initialize kernel, called before the first `work` of every run
    fn init(&mut self, _mio: &mut MessageIo, _meta: &mut BlockMeta) -> anyhow::Result<()> {
        Ok(())
    }

    /// De-initialize kernel, called once the block finished or the flowgraph was stopped
    fn deinit(&mut self, _mio: &mut MessageIo, _meta: &mut BlockMeta) -> anyhow::Result<()> {
        Ok(())
    }
}
