use futures::channel::mpsc;
use std::any::Any;
use std::fmt;

use crate::runtime::AllocationCounters;
use crate::runtime::BlockDescription;
use crate::runtime::BlockMessage;
use crate::runtime::BlockMeta;
use crate::runtime::Error;
use crate::runtime::Kernel;
use crate::runtime::MessageIo;
use crate::runtime::Pmt;
use crate::runtime::StreamIo;
use crate::runtime::WorkIo;
use crate::runtime::allocations::Allocation;
use crate::runtime::allocations::Resource;
use crate::runtime::scheduler::Notify;
use crate::runtime::stream_io::IoSignature;

trait KernelObject: Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn as_kernel(&mut self) -> &mut dyn Kernel;
}

impl<K: Kernel + 'static> KernelObject for K {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_kernel(&mut self) -> &mut dyn Kernel {
        self
    }
}

/// Scheduling state of a committed block.
pub struct BlockDetail {
    _allocation: Allocation,
    inbox: mpsc::Receiver<BlockMessage>,
    inbox_tx: mpsc::Sender<BlockMessage>,
    finished: bool,
    initialized: bool,
    call_again: bool,
    work_calls: u64,
}

impl BlockDetail {
    pub(crate) fn new(queue_size: usize, counters: &AllocationCounters) -> BlockDetail {
        let (inbox_tx, inbox) = mpsc::channel(queue_size);
        BlockDetail {
            _allocation: counters.track(Resource::BlockDetail),
            inbox,
            inbox_tx,
            finished: false,
            initialized: false,
            call_again: false,
            work_calls: 0,
        }
    }

    /// Whether the block terminated in the current run.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of `work` calls since the block was committed.
    pub fn work_calls(&self) -> u64 {
        self.work_calls
    }
}

impl fmt::Debug for BlockDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDetail")
            .field("finished", &self.finished)
            .field("initialized", &self.initialized)
            .field("work_calls", &self.work_calls)
            .finish()
    }
}

/// A block: meta data, ports and the kernel that implements its behavior.
pub struct Block {
    meta: BlockMeta,
    sio: StreamIo,
    mio: MessageIo,
    kernel: Box<dyn KernelObject>,
    detail: Option<BlockDetail>,
    allocation: Option<Allocation>,
}

impl Block {
    /// Create a block from its parts.
    pub fn new<K: Kernel + 'static>(
        meta: BlockMeta,
        sio: StreamIo,
        mio: MessageIo,
        kernel: K,
    ) -> Block {
        Block {
            meta,
            sio,
            mio,
            kernel: Box::new(kernel),
            detail: None,
            allocation: None,
        }
    }

    /// Instance name, unique within the flowgraph once added.
    pub fn instance_name(&self) -> Option<&str> {
        self.meta.instance_name()
    }

    /// Set the instance name.
    pub fn set_instance_name(&mut self, name: &str) {
        self.meta.set_instance_name(name);
    }

    /// Type name, e.g. `Copy`.
    pub fn type_name(&self) -> &str {
        self.meta.type_name()
    }

    /// Whether the block takes part in the next commit.
    pub fn is_enabled(&self) -> bool {
        self.meta.is_enabled()
    }

    /// Disabled blocks are bypassed or elided on the next commit.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.meta.set_enabled(enabled);
    }

    /// Block metadata.
    pub fn meta(&self) -> &BlockMeta {
        &self.meta
    }

    /// Stream ports.
    pub fn sio(&self) -> &StreamIo {
        &self.sio
    }

    /// Message ports.
    pub fn mio(&self) -> &MessageIo {
        &self.mio
    }

    /// Input and output signature of the stream ports.
    pub fn io_signature(&self) -> (IoSignature, IoSignature) {
        (self.sio.input_signature(), self.sio.output_signature())
    }

    /// Downcast the kernel.
    pub fn kernel<T: Kernel + 'static>(&self) -> Option<&T> {
        self.kernel.as_any().downcast_ref::<T>()
    }

    /// Downcast the kernel mutably.
    pub fn kernel_mut<T: Kernel + 'static>(&mut self) -> Option<&mut T> {
        self.kernel.as_any_mut().downcast_mut::<T>()
    }

    /// Scheduling state, present while the block is committed.
    pub fn detail(&self) -> Option<&BlockDetail> {
        self.detail.as_ref()
    }

    /// Serializable view of the block.
    pub fn description(&self, id: usize) -> BlockDescription {
        BlockDescription {
            id,
            type_name: self.type_name().to_string(),
            instance_name: self.instance_name().unwrap_or_default().to_string(),
            stream_inputs: self.sio.inputs().iter().map(|x| x.name().to_string()).collect(),
            stream_outputs: self
                .sio
                .outputs()
                .iter()
                .map(|x| x.name().to_string())
                .collect(),
            message_inputs: self.mio.inputs().iter().map(|x| x.name().to_string()).collect(),
            message_outputs: self
                .mio
                .outputs()
                .iter()
                .map(|x| x.name().to_string())
                .collect(),
            enabled: self.is_enabled(),
            composite: false,
        }
    }

    pub(crate) fn sio_mut(&mut self) -> &mut StreamIo {
        &mut self.sio
    }

    pub(crate) fn mio_mut(&mut self) -> &mut MessageIo {
        &mut self.mio
    }

    pub(crate) fn set_allocation(&mut self, allocation: Allocation) {
        self.allocation = Some(allocation);
    }

    pub(crate) fn has_allocation(&self) -> bool {
        self.allocation.is_some()
    }

    pub(crate) fn set_detail(&mut self, detail: Option<BlockDetail>) {
        self.detail = detail;
    }

    pub(crate) fn inbox(&self) -> Option<mpsc::Sender<BlockMessage>> {
        self.detail.as_ref().map(|d| d.inbox_tx.clone())
    }

    fn name(&self) -> String {
        self.instance_name()
            .unwrap_or_else(|| self.type_name())
            .to_string()
    }

    fn error(&self, e: anyhow::Error) -> Error {
        Error::BlockError {
            block: self.name(),
            message: format!("{e:#}"),
        }
    }

    // ===================== RUNTIME ========================

    pub(crate) fn is_finished(&self) -> bool {
        self.detail.as_ref().is_some_and(|d| d.finished)
    }

    /// Route wakeups of all connected buffers to the runner of this block.
    pub(crate) fn bind_notify(&mut self, notify: &Notify) {
        for i in self.sio.inputs() {
            if let Some(r) = i.reader() {
                r.set_notify(notify.clone());
            }
        }
        for o in self.sio.outputs() {
            if let Some(w) = o.writer() {
                w.set_notify(notify.clone());
            }
        }
    }

    /// Clear end-of-stream state so the block can run again.
    pub(crate) fn prepare_run(&mut self) {
        if let Some(d) = self.detail.as_mut() {
            d.finished = false;
            d.call_again = false;
        }
        for o in self.sio.outputs() {
            if let Some(w) = o.writer() {
                w.reset();
            }
        }
        for i in self.sio.inputs() {
            if let Some(r) = i.reader() {
                r.reattach();
            }
        }
        self.mio.reset();
    }

    pub(crate) fn init(&mut self) -> Result<(), Error> {
        if self.detail.as_ref().is_none_or(|d| d.initialized) {
            return Ok(());
        }
        let Block {
            meta, mio, kernel, ..
        } = self;
        if let Err(e) = kernel.as_kernel().init(mio, meta) {
            error!("{}: error during initialization", self.name());
            return Err(self.error(e));
        }
        if let Some(d) = self.detail.as_mut() {
            d.initialized = true;
        }
        Ok(())
    }

    pub(crate) fn deinit(&mut self) -> Result<(), Error> {
        if !self.detail.as_ref().is_some_and(|d| d.initialized) {
            return Ok(());
        }
        if let Some(d) = self.detail.as_mut() {
            d.initialized = false;
        }
        let Block {
            meta, mio, kernel, ..
        } = self;
        kernel.as_kernel().deinit(mio, meta).map_err(|e| self.error(e))
    }

    /// Pass queued messages to the kernel. Returns whether there were any.
    pub(crate) fn handle_messages(&mut self, io: &mut WorkIo) -> Result<bool, Error> {
        let Block {
            meta,
            mio,
            kernel,
            detail,
            ..
        } = self;
        let Some(detail) = detail.as_mut() else {
            return Ok(false);
        };

        let mut handled = false;
        while let Ok(Some(BlockMessage::Call { port_id, data })) = detail.inbox.try_next() {
            handled = true;
            if port_id >= mio.inputs().len() {
                warn!("{:?}: message for unknown port {}", meta.instance_name(), port_id);
                continue;
            }
            if data == Pmt::Finished {
                mio.input_mut(port_id).upstream_finished();
                continue;
            }
            if let Err(e) = kernel.as_kernel().handle(io, mio, meta, port_id, data) {
                return Err(self.error(e));
            }
        }
        Ok(handled)
    }

    /// Enough input data and output space for a call to `work`.
    pub(crate) fn ready(&self) -> bool {
        if self.detail.as_ref().is_some_and(|d| d.call_again) {
            return true;
        }
        let inputs = self
            .sio
            .inputs()
            .iter()
            .filter(|i| i.is_connected())
            .all(|i| i.available() >= i.min_items() || i.upstream_done());
        let outputs = self
            .sio
            .outputs()
            .iter()
            .filter(|o| o.has_readers())
            .all(|o| o.space() >= o.min_items());
        inputs && outputs
    }

    /// Call `work` once. Returns whether the call made progress.
    pub(crate) fn work(&mut self, io: &mut WorkIo) -> Result<bool, Error> {
        let before = self.sio.transferred() + self.mio.posted();
        let Block {
            meta,
            sio,
            mio,
            kernel,
            ..
        } = self;
        if let Err(e) = kernel.as_kernel().work(io, sio, mio, meta) {
            return Err(self.error(e));
        }
        if let Some(violation) = self.sio.take_violation() {
            return Err(Error::BlockError {
                block: self.name(),
                message: violation,
            });
        }
        let call_again = io.call_again;
        if let Some(d) = self.detail.as_mut() {
            d.work_calls += 1;
            d.call_again = call_again;
        }
        Ok(self.sio.transferred() + self.mio.posted() != before || call_again)
    }

    /// The upstream blocks of all connected stream inputs finished.
    pub(crate) fn inputs_done(&self) -> bool {
        let mut connected = self.sio.inputs().iter().filter(|i| i.is_connected()).peekable();
        connected.peek().is_some() && connected.all(|i| i.upstream_done())
    }

    /// No connected stream input has items left.
    pub(crate) fn inputs_drained(&self) -> bool {
        self.sio
            .inputs()
            .iter()
            .filter(|i| i.is_connected())
            .all(|i| i.finished())
    }

    /// No downstream block consumes any of the connected stream outputs anymore.
    pub(crate) fn outputs_done(&self) -> bool {
        let mut connected = self.sio.outputs().iter().filter(|o| o.is_connected()).peekable();
        connected.peek().is_some() && connected.all(|o| !o.has_readers())
    }

    /// A pure message block whose message inputs are all finished.
    pub(crate) fn messages_done(&self) -> bool {
        !self.sio.inputs().iter().any(|i| i.is_connected()) && self.mio.inputs_finished()
    }

    /// Propagate termination in both directions and release kernel resources.
    pub(crate) fn finish(&mut self) -> Result<(), Error> {
        debug!("{} finished", self.name());
        for o in self.sio.outputs() {
            if let Some(w) = o.writer() {
                w.finish();
            }
        }
        for i in self.sio.inputs() {
            if let Some(r) = i.reader() {
                r.detach();
            }
        }
        self.mio.notify_finished();
        if let Some(d) = self.detail.as_mut() {
            d.finished = true;
            d.call_again = false;
        }
        self.deinit()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("type_name", &self.type_name())
            .field("instance_name", &self.instance_name())
            .field("enabled", &self.is_enabled())
            .field("detail", &self.detail)
            .finish()
    }
}
