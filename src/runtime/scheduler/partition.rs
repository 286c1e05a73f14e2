use std::any::Any;
use std::fmt;
use std::mem;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use crate::runtime::Block;
use crate::runtime::BlockId;
use crate::runtime::Error;
use crate::runtime::FlowgraphInbox;
use crate::runtime::FlowgraphMessage;
use crate::runtime::WorkIo;
use crate::runtime::flowgraph_handle::Control;
use crate::runtime::scheduler::Notify;

/// Why a partition runner returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionExit {
    /// All blocks finished
    Finished,
    /// The flowgraph was stopped
    Stopped,
    /// The flowgraph was locked for editing
    Paused,
}

/// Drives the blocks of one partition.
///
/// Blocks are visited in topological order. A block is called when it has enough input and
/// output space, or when it asked to be called again. If no block made progress, the runner
/// sleeps until a buffer or inbox of the partition signals a change.
///
/// A runner that is dropped without being run hands its blocks back to the flowgraph.
pub struct PartitionRunner {
    index: usize,
    blocks: Vec<(BlockId, Block)>,
    control: Arc<Control>,
    notify: Notify,
    inbox: FlowgraphInbox,
    idle_timeout: Duration,
    reported: bool,
}

impl PartitionRunner {
    pub(crate) fn new(
        index: usize,
        blocks: Vec<(BlockId, Block)>,
        control: Arc<Control>,
        notify: Notify,
        inbox: FlowgraphInbox,
        idle_timeout: Duration,
    ) -> PartitionRunner {
        PartitionRunner {
            index,
            blocks,
            control,
            notify,
            inbox,
            idle_timeout,
            reported: false,
        }
    }

    /// Index of the partition.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Ids of the blocks, in the order they are visited.
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.blocks.iter().map(|(id, _)| *id).collect()
    }

    /// Run until all blocks finished or the flowgraph is stopped or locked.
    ///
    /// Blocks are handed back to the flowgraph afterwards, also if a block failed or panicked.
    pub fn run(mut self) {
        let index = self.index;
        let mut blocks = mem::take(&mut self.blocks);

        debug!("partition {} started with {} blocks", index, blocks.len());
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            run_loop(&mut blocks, &self.control, &self.notify, self.idle_timeout)
        }))
        .unwrap_or_else(|e| {
            Err(Error::PartitionPanic {
                partition: index,
                message: panic_message(e.as_ref()),
            })
        });

        match &result {
            Ok(exit) => debug!("partition {} exited: {:?}", index, exit),
            Err(e) => {
                error!("partition {} failed: {}", index, e);
                for (_, b) in blocks.iter_mut() {
                    if let Err(e) = b.deinit() {
                        warn!("{}", e);
                    }
                }
            }
        }

        self.report(blocks, result);
    }

    fn report(&mut self, blocks: Vec<(BlockId, Block)>, result: Result<PartitionExit, Error>) {
        self.reported = true;
        if self
            .inbox
            .try_send(FlowgraphMessage::PartitionExit {
                partition: self.index,
                blocks,
                result,
            })
            .is_err()
        {
            warn!("partition {}: flowgraph is gone, dropping blocks", self.index);
        }
    }
}

impl Drop for PartitionRunner {
    fn drop(&mut self) {
        if !self.reported {
            debug!("partition {} was not started", self.index);
            let blocks = mem::take(&mut self.blocks);
            let result = Err(Error::RuntimeError(format!(
                "partition {} was not started",
                self.index
            )));
            self.report(blocks, result);
        }
    }
}

impl fmt::Debug for PartitionRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionRunner")
            .field("index", &self.index)
            .field("blocks", &self.block_ids())
            .finish()
    }
}

fn panic_message(e: &(dyn Any + Send)) -> String {
    if let Some(s) = e.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = e.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_loop(
    blocks: &mut [(BlockId, Block)],
    control: &Control,
    notify: &Notify,
    idle_timeout: Duration,
) -> Result<PartitionExit, Error> {
    for (_, b) in blocks.iter_mut() {
        b.bind_notify(notify);
    }
    for (_, b) in blocks.iter_mut() {
        if !b.is_finished() {
            b.init()?;
        }
    }

    let mut io = WorkIo::default();
    loop {
        if control.stopped() || control.paused() {
            for (_, b) in blocks.iter_mut() {
                b.deinit()?;
            }
            return Ok(if control.stopped() {
                PartitionExit::Stopped
            } else {
                PartitionExit::Paused
            });
        }

        let mut progress = false;
        for (_, b) in blocks.iter_mut() {
            progress |= step(b, &mut io)?;
        }

        if blocks.iter().all(|(_, b)| b.is_finished()) {
            return Ok(PartitionExit::Finished);
        }
        if !progress {
            notify.wait_timeout(idle_timeout);
        }
    }
}

/// Give one block the chance to run. Returns whether anything changed.
fn step(block: &mut Block, io: &mut WorkIo) -> Result<bool, Error> {
    if block.is_finished() {
        return Ok(false);
    }
    io.clear();

    let mut progress = block.handle_messages(io)?;
    let mut called = false;
    let mut worked = false;
    if !io.finished && block.ready() {
        worked = block.work(io)?;
        called = true;
    }
    progress |= worked;

    let inputs_exhausted = called
        && !io.call_again
        && block.inputs_done()
        && (block.inputs_drained() || !worked);
    if io.finished || inputs_exhausted || block.outputs_done() || block.messages_done() {
        block.finish()?;
        progress = true;
    }
    Ok(progress)
}
